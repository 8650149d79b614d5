//! AT Protocol Identity Resolver
//!
//! Resolves AT Protocol identities in both directions: domain handles to DIDs
//! (DNS TXT, then HTTPS `.well-known`), and DIDs to validated identity documents
//! (`did:plc` from the PLC directory, `did:web` from the domain itself). A
//! handle claimed by a document only counts as verified when it resolves back
//! to the same DID.
//!
//! ```no_run
//! use atproto_identity::{IdentityResolver, Services};
//!
//! # async fn example() -> atproto_identity::Result<()> {
//! let resolver = IdentityResolver::new();
//!
//! if let Some(did) = resolver.resolve_handle("@bsky.app").await? {
//!     let doc = resolver.resolve_did(&did).await?;
//!     println!("PDS: {:?}", doc.pds_endpoint());
//!     println!("verified handle: {:?}", resolver.get_verified_handle(&doc).await?);
//! }
//! # Ok(())
//! # }
//! ```

mod account;
mod did;
mod dns;
mod document;
mod error;
mod handles;
mod requests;
mod resolver;
mod service;

#[cfg(test)]
mod test_support;

pub use account::AccountStatus;
pub use did::{Did, DidMethod, ResolvedBy};
pub use dns::{HickoryTxtLookup, TxtLookup};
pub use document::{Document, ServicePolicy};
pub use error::{ApiError, IdentityError, Result};
pub use handles::parse_also_known_as;
pub use requests::{
    get_json, get_response, HttpClient, HttpResponse, ReqwestClient, RequestOptions,
    DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT,
};
pub use resolver::{
    IdentityResolver, ResolverConfig, VerificationSubject, DEFAULT_PLC_DIRECTORY_URL,
    RESERVED_TLDS,
};
pub use service::{
    ServiceRecord, Services, LABELER_SERVICE_KEY, LABELER_SERVICE_TYPE, PDS_SERVICE_KEY,
    PDS_SERVICE_TYPE,
};
