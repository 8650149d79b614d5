//! Account status checks against the account's PDS

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::document::Document;
use crate::error::{IdentityError, Result};
use crate::requests::get_response;
use crate::resolver::IdentityResolver;
use crate::service::Services;

const MAX_STATUS_LENGTH: usize = 100;
const REPO_NOT_FOUND: &str = "RepoNotFound";

static JSON_CONTENT_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^application/json(;.*)?$").unwrap());

/// Hosting status of an account's repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "status")]
pub enum AccountStatus {
    Active,
    /// Inactive with the status reported by the PDS, e.g. "takendown" or "deactivated"
    Inactive(String),
}

impl AccountStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

#[derive(Debug, Deserialize)]
struct RepoStatusResponse {
    active: Option<bool>,
    status: Option<Value>,
}

impl IdentityResolver {
    /// Ask the document's PDS whether the account's repository is hosted and active.
    ///
    /// Returns `Ok(None)` when the document declares no PDS or the PDS does not
    /// know the repository.
    pub async fn account_status(&self, document: &Document) -> Result<Option<AccountStatus>> {
        let Some(endpoint) = document.pds_endpoint() else {
            return Ok(None);
        };

        let origin = Url::parse(endpoint)
            .map_err(|e| IdentityError::format(format!("Invalid PDS endpoint {}: {}", endpoint, e)))?
            .origin()
            .ascii_serialization();
        let url = format!(
            "{}/xrpc/com.atproto.sync.getRepoStatus?did={}",
            origin,
            urlencoding::encode(document.did().as_str())
        );

        let response = get_response(self.http(), &url, &self.config().request_options).await?;
        let is_json = response
            .content_type()
            .map(|ct| JSON_CONTENT_TYPE.is_match(ct))
            .unwrap_or(false);

        if response.status == 200 && is_json {
            let json: RepoStatusResponse = serde_json::from_str(&response.body)
                .map_err(|_| IdentityError::Api(response.to_api_error()))?;

            return match (json.active, json.status) {
                (Some(true), _) => Ok(Some(AccountStatus::Active)),
                (Some(false), Some(Value::String(status)))
                    if status.chars().count() <= MAX_STATUS_LENGTH =>
                {
                    Ok(Some(AccountStatus::Inactive(status)))
                }
                _ => Err(response.to_api_error().into()),
            };
        }

        if response.status == 400 && is_json {
            let error = serde_json::from_str::<Value>(&response.body)
                .ok()
                .and_then(|json| json.get("error").and_then(Value::as_str).map(str::to_string));
            if error.as_deref() == Some(REPO_NOT_FOUND) {
                debug!("Repo for {} not found on {}", document.did(), origin);
                return Ok(None);
            }
        }

        Err(response.to_api_error().into())
    }

    pub async fn account_active(&self, document: &Document) -> Result<bool> {
        Ok(self
            .account_status(document)
            .await?
            .map(|status| status.is_active())
            .unwrap_or(false))
    }

    pub async fn account_exists(&self, document: &Document) -> Result<bool> {
        Ok(self.account_status(document).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::did::Did;
    use crate::resolver::ResolverConfig;
    use crate::test_support::{FakeDns, FakeHttp};
    use serde_json::json;
    use std::sync::Arc;

    const PLC_DID: &str = "did:plc:vc7f4oafdgxsihk4cry2xpze";
    const STATUS_URL: &str =
        "https://pds.ruby.space/xrpc/com.atproto.sync.getRepoStatus?did=did%3Aplc%3Avc7f4oafdgxsihk4cry2xpze";
    const JSON: Option<&str> = Some("application/json; charset=utf-8");

    fn document(pds: Option<&str>) -> Document {
        let services = match pds {
            Some(endpoint) => json!([{
                "id": "#atproto_pds",
                "type": "AtprotoPersonalDataServer",
                "serviceEndpoint": endpoint
            }]),
            None => json!([]),
        };
        let did = Did::new(PLC_DID).unwrap();
        Document::parse(&did, json!({ "id": PLC_DID, "service": services })).unwrap()
    }

    fn resolver_with(status: u16, content_type: Option<&str>, body: Value) -> IdentityResolver {
        let http = Arc::new(FakeHttp::new());
        http.respond(STATUS_URL, status, content_type, &body.to_string());
        IdentityResolver::with_clients(http, Arc::new(FakeDns::new()), ResolverConfig::default())
    }

    #[tokio::test]
    async fn test_active_account() {
        let resolver = resolver_with(200, JSON, json!({ "active": true }));
        let doc = document(Some("https://pds.ruby.space"));

        assert_eq!(resolver.account_status(&doc).await.unwrap(), Some(AccountStatus::Active));
        assert!(resolver.account_active(&doc).await.unwrap());
        assert!(resolver.account_exists(&doc).await.unwrap());
    }

    #[tokio::test]
    async fn test_request_goes_to_pds_origin() {
        let resolver = resolver_with(200, JSON, json!({ "active": true }));
        let doc = document(Some("https://pds.ruby.space/some/path"));

        assert_eq!(resolver.account_status(&doc).await.unwrap(), Some(AccountStatus::Active));
    }

    #[tokio::test]
    async fn test_inactive_account() {
        let resolver = resolver_with(200, JSON, json!({ "active": false, "status": "takendown" }));
        let doc = document(Some("https://pds.ruby.space"));

        assert_eq!(
            resolver.account_status(&doc).await.unwrap(),
            Some(AccountStatus::Inactive("takendown".to_string()))
        );
        assert!(!resolver.account_active(&doc).await.unwrap());
        assert!(resolver.account_exists(&doc).await.unwrap());
    }

    #[tokio::test]
    async fn test_repo_not_found() {
        let resolver = resolver_with(400, JSON, json!({ "error": "RepoNotFound" }));
        let doc = document(Some("https://pds.ruby.space"));

        assert_eq!(resolver.account_status(&doc).await.unwrap(), None);
        assert!(!resolver.account_active(&doc).await.unwrap());
        assert!(!resolver.account_exists(&doc).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_pds_endpoint() {
        let resolver = resolver_with(200, JSON, json!({ "active": true }));
        let doc = document(None);

        assert_eq!(resolver.account_status(&doc).await.unwrap(), None);
        assert!(!resolver.account_exists(&doc).await.unwrap());
    }

    #[tokio::test]
    async fn test_unexpected_responses_are_api_errors() {
        let doc = document(Some("https://pds.ruby.space"));
        let cases = [
            (200, JSON, json!({ "active": null, "status": "unknown" })),
            (200, JSON, json!({ "active": false, "status": null })),
            (200, JSON, json!({ "active": false, "status": "x".repeat(101) })),
            (400, JSON, json!({ "error": "UserIsJerry" })),
            (400, Some("text/html"), json!("error")),
            (500, JSON, json!({ "error": "RepoNotFound" })),
        ];

        for (status, content_type, body) in cases {
            let resolver = resolver_with(status, content_type, body.clone());
            let err = resolver.account_status(&doc).await.unwrap_err();
            assert!(
                matches!(err, IdentityError::Api(ref api) if api.status == status),
                "{status} {body}"
            );
        }
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(AccountStatus::Inactive("takendown".to_string())).unwrap();
        assert_eq!(json, json!({ "state": "inactive", "status": "takendown" }));
        let json = serde_json::to_value(AccountStatus::Active).unwrap();
        assert_eq!(json, json!({ "state": "active" }));
    }
}
