use std::net::IpAddr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, instrument};

use crate::did::{Did, DidMethod, ResolvedBy};
use crate::dns::{HickoryTxtLookup, TxtLookup};
use crate::document::Document;
use crate::error::{IdentityError, Result};
use crate::requests::{get_json, get_response, HttpClient, ReqwestClient, RequestOptions};

pub const DEFAULT_PLC_DIRECTORY_URL: &str = "https://plc.directory";

/// TLDs that can never be valid handles; lookups for them are skipped
pub const RESERVED_TLDS: &[&str] = &[
    "alt", "arpa", "example", "internal", "invalid", "local", "localhost", "onion", "test",
];

static DNS_DID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^did=(did:\w+:.*)$").unwrap());

static DID_DOCUMENT_CONTENT_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^application/did\+ld\+json(;.+)?$").unwrap());

/// Resolver settings
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Base URL of the PLC directory, without a trailing slash
    pub plc_directory_url: String,
    /// Custom DNS nameservers; the system configuration (`/etc/resolv.conf`) is used when empty
    pub nameservers: Vec<IpAddr>,
    pub request_options: RequestOptions,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            plc_directory_url: DEFAULT_PLC_DIRECTORY_URL.to_string(),
            nameservers: Vec::new(),
            request_options: RequestOptions::default(),
        }
    }
}

/// Either a DID still to be resolved, or a document already fetched for it
#[derive(Debug, Clone, Copy)]
pub enum VerificationSubject<'a> {
    Did(&'a Did),
    Document(&'a Document),
}

impl<'a> From<&'a Did> for VerificationSubject<'a> {
    fn from(did: &'a Did) -> Self {
        VerificationSubject::Did(did)
    }
}

impl<'a> From<&'a Document> for VerificationSubject<'a> {
    fn from(doc: &'a Document) -> Self {
        VerificationSubject::Document(doc)
    }
}

/// Resolves handles to DIDs and DIDs to identity documents.
///
/// Every step is awaited in sequence; one instance is meant for one logical
/// caller at a time.
pub struct IdentityResolver {
    http: Arc<dyn HttpClient>,
    dns: Arc<dyn TxtLookup>,
    config: ResolverConfig,
}

impl IdentityResolver {
    /// Create a new resolver with default settings
    pub fn new() -> Self {
        Self::from_config(ResolverConfig::default())
    }

    pub fn from_config(config: ResolverConfig) -> Self {
        let dns = HickoryTxtLookup::with_nameservers(&config.nameservers);
        Self::with_clients(Arc::new(ReqwestClient::new()), Arc::new(dns), config)
    }

    pub fn with_clients(
        http: Arc<dyn HttpClient>,
        dns: Arc<dyn TxtLookup>,
        config: ResolverConfig,
    ) -> Self {
        Self { http, dns, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &dyn HttpClient {
        self.http.as_ref()
    }

    /// Resolve a handle into a DID using DNS TXT, then the HTTP well-known file.
    ///
    /// Input that is already a DID is returned as a fresh `Did` without a network
    /// call, so user input can be passed here without checking which one it is.
    /// Returns `Ok(None)` when the handle does not resolve; lookup failures are
    /// reported as not found.
    ///
    /// A DID with an unsupported method found via DNS is ignored and the
    /// well-known lookup is tried instead.
    pub async fn resolve_handle(&self, input: impl AsRef<str>) -> Result<Option<Did>> {
        let input = input.as_ref();

        if Did::is_did_like(input) {
            return Did::new(input).map(Some);
        }

        let domain = input.strip_prefix('@').unwrap_or(input);
        debug!("Resolving handle {}", domain);

        if is_reserved_domain(domain) {
            debug!("Skipping lookup for reserved TLD: {}", domain);
            return Ok(None);
        }

        if let Some(did) = self.resolve_handle_by_dns(domain).await {
            match Did::with_provenance(&did, ResolvedBy::Dns) {
                Ok(did) => return Ok(Some(did)),
                Err(e) => debug!("Ignoring DNS TXT value for {}: {}", domain, e),
            }
        }

        if let Some(did) = self.resolve_handle_by_well_known(domain).await {
            match Did::with_provenance(&did, ResolvedBy::Http) {
                Ok(did) => return Ok(Some(did)),
                Err(e) => debug!("Ignoring .well-known value for {}: {}", domain, e),
            }
        }

        Ok(None)
    }

    /// Look for a `did=<did>` value in the first TXT record at `_atproto.<domain>`
    pub async fn resolve_handle_by_dns(&self, domain: &str) -> Option<String> {
        let name = format!("_atproto.{}", domain);

        let records = match self.dns.txt_records(&name).await {
            Ok(records) => records,
            Err(e) => {
                debug!("DNS TXT lookup for {} failed: {}", name, e);
                return None;
            }
        };

        let value = records.first()?.first()?;
        parse_did_from_dns(value)
    }

    /// Fetch `https://<domain>/.well-known/atproto-did` and accept a single-line DID body
    pub async fn resolve_handle_by_well_known(&self, domain: &str) -> Option<String> {
        let url = format!("https://{}/.well-known/atproto-did", domain);

        match get_response(self.http(), &url, &self.config.request_options).await {
            Ok(response) if response.is_success() => parse_did_from_well_known(&response.body),
            Ok(response) => {
                debug!("{} returned status {}", url, response.status);
                None
            }
            Err(e) => {
                debug!("Failed to fetch {}: {}", url, e);
                None
            }
        }
    }

    /// Fetch and validate the identity document for a DID
    #[instrument(skip(self), fields(did = %did))]
    pub async fn resolve_did(&self, did: &Did) -> Result<Document> {
        let options = &self.config.request_options;

        let json = match did.method() {
            DidMethod::Plc => {
                let url = format!(
                    "{}/{}",
                    self.config.plc_directory_url.trim_end_matches('/'),
                    did
                );
                get_json(self.http(), &url, options, Some(&DID_DOCUMENT_CONTENT_TYPE)).await?
            }
            DidMethod::Web => {
                let domain = did
                    .web_domain()
                    .ok_or_else(|| IdentityError::Did(format!("Invalid did:web: {}", did)))?;
                let url = format!("https://{}/.well-known/did.json", domain);
                get_json(self.http(), &url, options, None).await?
            }
        };

        Document::parse(did, json)
    }

    pub async fn resolve_did_str(&self, did: &str) -> Result<Document> {
        self.resolve_did(&Did::new(did)?).await
    }

    /// Resolve a handle or DID all the way to its document
    pub async fn resolve_handle_to_document(
        &self,
        input: impl AsRef<str>,
    ) -> Result<Option<Document>> {
        match self.resolve_handle(input).await? {
            Some(did) => self.resolve_did(&did).await.map(Some),
            None => Ok(None),
        }
    }

    /// Return the first handle claimed by the subject's document that resolves
    /// back to the same DID, or `None` if no claimed handle does.
    pub async fn get_verified_handle<'a>(
        &self,
        subject: impl Into<VerificationSubject<'a>>,
    ) -> Result<Option<String>> {
        match subject.into() {
            VerificationSubject::Document(doc) => {
                Ok(self.first_verified_handle(doc.did(), doc.handles()).await)
            }
            VerificationSubject::Did(did) => {
                let doc = self.resolve_did(did).await?;
                Ok(self.first_verified_handle(doc.did(), doc.handles()).await)
            }
        }
    }

    /// First handle in `handles` whose forward resolution equals `did`
    pub async fn first_verified_handle(&self, did: &Did, handles: &[String]) -> Option<String> {
        for handle in handles {
            match self.resolve_handle(handle).await {
                Ok(Some(resolved)) if resolved == *did => return Some(handle.clone()),
                Ok(Some(resolved)) => {
                    debug!("Handle {} resolves to {}, not {}", handle, resolved, did)
                }
                Ok(None) => debug!("Handle {} does not resolve", handle),
                Err(e) => debug!("Handle {} failed to resolve: {}", handle, e),
            }
        }

        None
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn is_reserved_domain(domain: &str) -> bool {
    domain
        .rsplit('.')
        .find(|label| !label.is_empty())
        .map(|tld| RESERVED_TLDS.contains(&tld.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn parse_did_from_dns(txt: &str) -> Option<String> {
    DNS_DID_RE.captures(txt).map(|caps| caps[1].to_string())
}

fn parse_did_from_well_known(text: &str) -> Option<String> {
    let text = text.trim();
    if text.lines().count() == 1 && Did::is_did_like(text) {
        Some(text.to_string())
    } else {
        None
    }
}
