use std::env;
use std::net::IpAddr;
use std::time::Duration;

use atproto_identity::{
    RequestOptions, ResolverConfig, DEFAULT_MAX_REDIRECTS, DEFAULT_PLC_DIRECTORY_URL,
    DEFAULT_TIMEOUT,
};
use clap::Args;

use crate::error::{CliError, Result};

/// Settings shared by all commands, from the environment and global flags
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub plc_directory_url: String,
    pub nameservers: Vec<IpAddr>,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub log_json: bool,
}

/// Global flags that take precedence over the environment
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// PLC directory base URL [env: PLC_DIRECTORY_URL]
    #[arg(long, global = true)]
    pub plc_directory: Option<String>,

    /// DNS server for handle lookups, may be repeated [env: DNS_NAMESERVERS]
    #[arg(long = "nameserver", global = true)]
    pub nameservers: Vec<IpAddr>,

    /// HTTP timeout in seconds [env: HTTP_TIMEOUT_SECS]
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Maximum redirects to follow per request [env: MAX_REDIRECTS]
    #[arg(long, global = true)]
    pub max_redirects: Option<usize>,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let plc_directory_url = var("PLC_DIRECTORY_URL")
            .unwrap_or_else(|| DEFAULT_PLC_DIRECTORY_URL.to_string());

        let nameservers = match var("DNS_NAMESERVERS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<IpAddr>().map_err(|_| {
                        CliError::Config(format!("Invalid address in DNS_NAMESERVERS: {}", s))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let timeout = var("HTTP_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        let max_redirects = var("MAX_REDIRECTS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_REDIRECTS);

        let log_json = var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

        Ok(Self {
            plc_directory_url,
            nameservers,
            timeout,
            max_redirects,
            log_json,
        })
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(url) = overrides.plc_directory {
            self.plc_directory_url = url;
        }
        if !overrides.nameservers.is_empty() {
            self.nameservers = overrides.nameservers;
        }
        if let Some(secs) = overrides.timeout {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(max) = overrides.max_redirects {
            self.max_redirects = max;
        }
        self
    }

    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            timeout: self.timeout,
            max_redirects: self.max_redirects,
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            plc_directory_url: self.plc_directory_url.clone(),
            nameservers: self.nameservers.clone(),
            request_options: self.request_options(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.plc_directory_url, "https://plc.directory");
        assert!(config.nameservers.is_empty());
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.max_redirects, 5);
        assert!(!config.log_json);
    }

    #[test]
    fn test_environment_values() {
        let config = config_from(&[
            ("PLC_DIRECTORY_URL", "https://plc.example.com"),
            ("DNS_NAMESERVERS", "1.1.1.1, 2606:4700:4700::1111"),
            ("HTTP_TIMEOUT_SECS", "3"),
            ("MAX_REDIRECTS", "0"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(config.plc_directory_url, "https://plc.example.com");
        assert_eq!(
            config.nameservers,
            vec![
                "1.1.1.1".parse::<IpAddr>().unwrap(),
                "2606:4700:4700::1111".parse::<IpAddr>().unwrap()
            ]
        );
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.max_redirects, 0);
        assert!(config.log_json);
    }

    #[test]
    fn test_unparsable_numbers_use_defaults() {
        let config = config_from(&[("HTTP_TIMEOUT_SECS", "soon"), ("MAX_REDIRECTS", "-1")]).unwrap();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.max_redirects, DEFAULT_MAX_REDIRECTS);
    }

    #[test]
    fn test_invalid_nameserver() {
        let err = config_from(&[("DNS_NAMESERVERS", "8.8.8.8,dns.google")]).unwrap_err();
        assert!(matches!(err, CliError::Config(ref msg) if msg.contains("dns.google")));
    }

    #[test]
    fn test_flags_override_environment() {
        let config = config_from(&[
            ("PLC_DIRECTORY_URL", "https://plc.example.com"),
            ("DNS_NAMESERVERS", "1.1.1.1"),
            ("HTTP_TIMEOUT_SECS", "3"),
        ])
        .unwrap()
        .with_overrides(Overrides {
            plc_directory: Some("http://localhost:2582".to_string()),
            nameservers: vec!["9.9.9.9".parse().unwrap()],
            timeout: None,
            max_redirects: Some(1),
        });

        assert_eq!(config.plc_directory_url, "http://localhost:2582");
        assert_eq!(config.nameservers, vec!["9.9.9.9".parse::<IpAddr>().unwrap()]);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.max_redirects, 1);

        let resolver_config = config.resolver_config();
        assert_eq!(resolver_config.plc_directory_url, "http://localhost:2582");
        assert_eq!(resolver_config.request_options.max_redirects, 1);
    }
}
