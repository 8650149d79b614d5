//! DID value type
//!
//! Only the `plc` and `web` methods are accepted. Equality and hashing look at
//! the DID string alone, never at how the DID was discovered.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::{IdentityError, Result};

/// Generic `did:<method>:<identifier>` grammar, method-agnostic
pub(crate) static DID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^did:(\w+):(.+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DidMethod {
    Plc,
    Web,
}

impl DidMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DidMethod::Plc => "plc",
            DidMethod::Web => "web",
        }
    }
}

/// How a DID was discovered from a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedBy {
    Dns,
    Http,
}

#[derive(Debug, Clone)]
pub struct Did {
    did: String,
    method: DidMethod,
    resolved_by: Option<ResolvedBy>,
}

impl Did {
    pub fn new(did: &str) -> Result<Self> {
        let caps = DID_RE
            .captures(did)
            .ok_or_else(|| IdentityError::Did(format!("Invalid DID format: {:?}", did)))?;

        let method = match &caps[1] {
            "plc" => DidMethod::Plc,
            "web" => DidMethod::Web,
            other => {
                return Err(IdentityError::Did(format!(
                    "Unrecognized DID type: {}",
                    other
                )))
            }
        };

        Ok(Self {
            did: did.to_string(),
            method,
            resolved_by: None,
        })
    }

    pub(crate) fn with_provenance(did: &str, resolved_by: ResolvedBy) -> Result<Self> {
        let mut did = Self::new(did)?;
        did.resolved_by = Some(resolved_by);
        Ok(did)
    }

    /// Whether the string matches the generic DID grammar, regardless of method
    pub fn is_did_like(s: &str) -> bool {
        DID_RE.is_match(s)
    }

    pub fn as_str(&self) -> &str {
        &self.did
    }

    pub fn method(&self) -> DidMethod {
        self.method
    }

    pub fn resolved_by(&self) -> Option<ResolvedBy> {
        self.resolved_by
    }

    /// Domain part of a did:web, with an encoded port separator restored
    pub fn web_domain(&self) -> Option<String> {
        match self.method {
            DidMethod::Web => self
                .did
                .strip_prefix("did:web:")
                .map(|domain| domain.replace("%3A", ":")),
            DidMethod::Plc => None,
        }
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.did)
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.did
    }
}

impl FromStr for Did {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Did {
    type Error = IdentityError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Did {
    type Error = IdentityError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}

impl PartialEq for Did {
    fn eq(&self, other: &Self) -> bool {
        self.did == other.did
    }
}

impl Eq for Did {}

impl Hash for Did {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.did.hash(state);
    }
}

impl PartialEq<str> for Did {
    fn eq(&self, other: &str) -> bool {
        self.did == other
    }
}

impl PartialEq<&str> for Did {
    fn eq(&self, other: &&str) -> bool {
        self.did == *other
    }
}

impl PartialEq<String> for Did {
    fn eq(&self, other: &String) -> bool {
        &self.did == other
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.did)
    }
}
