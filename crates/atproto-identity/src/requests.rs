//! Request layer: single GETs behind a trait, redirects and JSON on top

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::redirect::Policy;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{ApiError, IdentityError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_REDIRECTS: usize = 5;
const DEFAULT_USER_AGENT: &str = "atproto-identity-rs/0.1";

/// Per-call request settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub timeout: Duration,
    pub max_redirects: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

/// A fully read HTTP response. Header names are stored lowercase.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn to_api_error(&self) -> ApiError {
        ApiError {
            url: self.url.clone(),
            status: self.status,
            content_type: self.content_type().map(str::to_string),
            body: self.body.clone(),
        }
    }
}

/// Performs one GET without following redirects
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse>;
}

/// `HttpClient` backed by reqwest, with automatic redirects turned off
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .timeout(options.timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            url: url.to_string(),
            status,
            headers,
            body,
        })
    }
}

/// GET with redirect following.
///
/// Stops and returns the current response once `max_redirects` is reached, when
/// a redirect has no `Location`, or when the target was already visited.
pub async fn get_response(
    client: &dyn HttpClient,
    url: &str,
    options: &RequestOptions,
) -> Result<HttpResponse> {
    let mut current = Url::parse(url)
        .map_err(|e| IdentityError::Transport(format!("Invalid URL {}: {}", url, e)))?;
    let mut visited = HashSet::new();
    let mut redirects = 0;

    loop {
        visited.insert(current.to_string());
        let response = client.get(current.as_str(), options).await?;

        if !response.is_redirect() || redirects >= options.max_redirects {
            return Ok(response);
        }

        let Some(location) = response.header("location") else {
            return Ok(response);
        };

        let next = current.join(location).map_err(|e| {
            IdentityError::Transport(format!("Invalid redirect location {:?}: {}", location, e))
        })?;

        if visited.contains(next.as_str()) {
            debug!("Redirect loop detected at {}", next);
            return Ok(response);
        }

        debug!("Following redirect {} -> {}", current, next);
        current = next;
        redirects += 1;
    }
}

/// GET a JSON body, optionally requiring a content type matching `content_type`
pub async fn get_json(
    client: &dyn HttpClient,
    url: &str,
    options: &RequestOptions,
    content_type: Option<&Regex>,
) -> Result<Value> {
    let response = get_response(client, url, options).await?;

    if !response.is_success() {
        return Err(response.to_api_error().into());
    }

    if let Some(pattern) = content_type {
        let matches = response
            .content_type()
            .map(|ct| pattern.is_match(ct))
            .unwrap_or(false);
        if !matches {
            return Err(response.to_api_error().into());
        }
    }

    serde_json::from_str(&response.body)
        .map_err(|e| IdentityError::Format(format!("Invalid JSON from {}: {}", url, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn redirect_to(location: &str) -> ResponseTemplate {
        ResponseTemplate::new(302).insert_header("Location", location)
    }

    #[test]
    fn test_request_options_default() {
        let options = RequestOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(15));
        assert_eq!(options.max_redirects, 5);
    }

    #[test]
    fn test_response_header_lookup_is_case_insensitive() {
        let response = HttpResponse {
            url: "https://example.com".to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: String::new(),
        };
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert!(response.is_success());
        assert!(!response.is_redirect());
    }

    #[tokio::test]
    async fn test_get_response_follows_relative_and_absolute_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(redirect_to("/middle"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/middle"))
            .respond_with(redirect_to(&format!("{}/end", server.uri())))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/end"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .mount(&server)
            .await;

        let client = ReqwestClient::new();
        let url = format!("{}/start", server.uri());
        let response = get_response(&client, &url, &RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "done");
        assert!(response.url.ends_with("/end"));
    }

    #[tokio::test]
    async fn test_get_response_stops_on_redirect_loop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(redirect_to("/b"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(redirect_to("/a"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ReqwestClient::new();
        let url = format!("{}/a", server.uri());
        let response = get_response(&client, &url, &RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(response.status, 302);
        assert!(response.url.ends_with("/b"));
    }

    #[tokio::test]
    async fn test_get_response_honours_max_redirects() {
        let server = MockServer::start().await;
        for i in 0..5 {
            Mock::given(method("GET"))
                .and(path(format!("/r{}", i)))
                .respond_with(redirect_to(&format!("/r{}", i + 1)))
                .mount(&server)
                .await;
        }

        let client = ReqwestClient::new();
        let options = RequestOptions {
            max_redirects: 2,
            ..Default::default()
        };
        let url = format!("{}/r0", server.uri());
        let response = get_response(&client, &url, &options).await.unwrap();

        assert!(response.is_redirect());
        assert!(response.url.ends_with("/r2"));
    }

    #[tokio::test]
    async fn test_get_json_checks_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/plain")
                    .set_body_string(r#"{"id":"did:plc:abc"}"#),
            )
            .mount(&server)
            .await;

        let client = ReqwestClient::new();
        let url = format!("{}/doc", server.uri());
        let pattern = Regex::new(r"^application/json(;.+)?$").unwrap();

        let err = get_json(&client, &url, &RequestOptions::default(), Some(&pattern))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Api(ref api) if api.status == 200));

        let json = get_json(&client, &url, &RequestOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(json["id"], "did:plc:abc");
    }

    #[tokio::test]
    async fn test_get_json_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = ReqwestClient::new();
        let url = format!("{}/missing", server.uri());
        let err = get_json(&client, &url, &RequestOptions::default(), None)
            .await
            .unwrap_err();

        match err {
            IdentityError::Api(api) => {
                assert_eq!(api.status, 404);
                assert_eq!(api.body, "not found");
            }
            other => panic!("Expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_json_rejects_invalid_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = ReqwestClient::new();
        let url = format!("{}/garbage", server.uri());
        let err = get_json(&client, &url, &RequestOptions::default(), None)
            .await
            .unwrap_err();
        assert!(err.is_format());
    }
}
