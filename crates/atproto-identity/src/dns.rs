//! DNS TXT lookups for handle resolution

use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::Resolver;

use tracing::warn;

use crate::error::Result;

const DNS_PORT: u16 = 53;

type TokioResolver = Resolver<TokioConnectionProvider>;

/// Looks up TXT records. Each record is returned as its list of character-strings.
#[async_trait]
pub trait TxtLookup: Send + Sync {
    async fn txt_records(&self, name: &str) -> Result<Vec<Vec<String>>>;
}

/// `TxtLookup` backed by hickory-resolver
pub struct HickoryTxtLookup {
    resolver: TokioResolver,
}

impl HickoryTxtLookup {
    /// Resolver using the system DNS configuration, falling back to the
    /// hickory defaults when it can't be read
    pub fn new() -> Self {
        let builder = Resolver::builder_tokio().unwrap_or_else(|e| {
            warn!("Failed to read system DNS configuration, using defaults: {}", e);
            Resolver::builder_with_config(
                ResolverConfig::default(),
                TokioConnectionProvider::default(),
            )
        });
        Self {
            resolver: builder.build(),
        }
    }

    /// Resolver querying only the given nameservers
    pub fn with_nameservers(nameservers: &[IpAddr]) -> Self {
        if nameservers.is_empty() {
            return Self::new();
        }

        let group = NameServerConfigGroup::from_ips_clear(nameservers, DNS_PORT, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let resolver =
            Resolver::builder_with_config(config, TokioConnectionProvider::default()).build();
        Self { resolver }
    }
}

impl Default for HickoryTxtLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TxtLookup for HickoryTxtLookup {
    async fn txt_records(&self, name: &str) -> Result<Vec<Vec<String>>> {
        let response = self.resolver.txt_lookup(name).await?;

        Ok(response
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|data| String::from_utf8_lossy(data).to_string())
                    .collect()
            })
            .collect())
    }
}
