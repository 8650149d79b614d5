//! Parsed DID documents from the PLC directory or a did:web domain

use serde_json::{Map, Value};
use tracing::debug;

use crate::did::Did;
use crate::error::{IdentityError, Result};
use crate::handles::parse_also_known_as;
use crate::service::{ServiceRecord, Services};

/// What to do with individually malformed `service` entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServicePolicy {
    /// Skip malformed entries and keep the valid ones
    #[default]
    Permissive,
    /// Reject the whole document
    Strict,
}

/// A validated identity document bound to the DID it was fetched for.
///
/// Handles listed here are only claimed by the document; use
/// [`IdentityResolver::get_verified_handle`](crate::IdentityResolver::get_verified_handle)
/// to find one that resolves back to the same DID.
#[derive(Debug, Clone)]
pub struct Document {
    did: Did,
    json: Value,
    handles: Vec<String>,
    services: Vec<ServiceRecord>,
}

impl Document {
    pub fn parse(did: &Did, json: Value) -> Result<Self> {
        Self::parse_with_policy(did, json, ServicePolicy::default())
    }

    pub fn parse_with_policy(did: &Did, json: Value, policy: ServicePolicy) -> Result<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| IdentityError::format("DID document is not a JSON object"))?;

        match obj.get("id") {
            None | Some(Value::Null) => return Err(IdentityError::format("Missing id field")),
            Some(Value::String(id)) if id == did.as_str() => {}
            Some(Value::String(id)) => {
                return Err(IdentityError::format(format!(
                    "id field {:?} doesn't match expected DID {}",
                    id, did
                )))
            }
            Some(_) => return Err(IdentityError::format("Invalid id field")),
        }

        let services = match obj.get("service") {
            None | Some(Value::Null) => Vec::new(),
            Some(data) => parse_services(data, policy)?,
        };

        let handles = match obj.get("alsoKnownAs") {
            None | Some(Value::Null) => Vec::new(),
            Some(aka) => parse_also_known_as(aka)?,
        };

        Ok(Self {
            did: did.clone(),
            json,
            handles,
            services,
        })
    }

    /// Parse a document from raw JSON text
    pub fn from_str(did: &Did, text: &str) -> Result<Self> {
        let json = serde_json::from_str(text)
            .map_err(|e| IdentityError::format(format!("Invalid DID document JSON: {}", e)))?;
        Self::parse(did, json)
    }

    pub fn did(&self) -> &Did {
        &self.did
    }

    pub fn json(&self) -> &Value {
        &self.json
    }

    /// Handles claimed in `alsoKnownAs`, unverified, in document order
    pub fn handles(&self) -> &[String] {
        &self.handles
    }
}

impl Services for Document {
    fn services(&self) -> &[ServiceRecord] {
        &self.services
    }
}

fn parse_services(data: &Value, policy: ServicePolicy) -> Result<Vec<ServiceRecord>> {
    let entries = data
        .as_array()
        .ok_or_else(|| IdentityError::format("Invalid service data"))?;

    let mut services = Vec::new();
    for entry in entries {
        let obj = entry
            .as_object()
            .ok_or_else(|| IdentityError::format("Invalid service data"))?;

        match parse_service_entry(obj) {
            Ok(record) => services.push(record),
            Err(e) if policy == ServicePolicy::Permissive => {
                debug!("Skipping service entry {}: {}", entry, e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(services)
}

fn parse_service_entry(obj: &Map<String, Value>) -> Result<ServiceRecord> {
    let key = obj
        .get("id")
        .and_then(Value::as_str)
        .and_then(|id| id.strip_prefix('#'))
        .filter(|key| !key.is_empty())
        .ok_or_else(|| IdentityError::format(format!("Invalid service id: {:?}", obj.get("id"))))?;

    let service_type = obj.get("type").and_then(Value::as_str).ok_or_else(|| {
        IdentityError::format(format!("Invalid service type: {:?}", obj.get("type")))
    })?;

    let endpoint = obj
        .get("serviceEndpoint")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            IdentityError::format(format!(
                "Invalid service endpoint: {:?}",
                obj.get("serviceEndpoint")
            ))
        })?;

    ServiceRecord::new(key, service_type, endpoint)
}
