//! A single operation from the PLC directory's history of a DID

use atproto_identity::{parse_also_known_as, IdentityError, Result, ServiceRecord, Services};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Operation type that carries handles and services
pub const PLC_OPERATION_TYPE: &str = "plc_operation";

/// One change to a DID's data in the PLC directory, such as a handle change
/// or a PDS migration.
///
/// `handles` and `services` are only parsed for `plc_operation` entries; for
/// any other type (e.g. `plc_tombstone`) both are `None`.
#[derive(Debug, Clone)]
pub struct PlcOperation {
    pub json: Value,
    pub did: String,
    /// Content identifier of the operation
    pub cid: String,
    /// Sequence number, only present in the newer export API
    pub seq: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub op_type: String,
    pub handles: Option<Vec<String>>,
    pub services: Option<Vec<ServiceRecord>>,
}

impl PlcOperation {
    pub fn from_json(json: Value) -> Result<Self> {
        let obj = json.as_object().ok_or_else(|| {
            IdentityError::format(format!("Expected operation to be an object, got {}", json))
        })?;

        let did = required_str(obj, "did")?;
        if !did.starts_with("did:") {
            return Err(IdentityError::format(format!("Invalid DID: {:?}", did)));
        }

        let cid = required_str(obj, "cid")?;

        let timestamp = required_str(obj, "createdAt")?;
        let created_at = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| IdentityError::format(format!("Invalid createdAt {:?}: {}", timestamp, e)))?
            .with_timezone(&Utc);

        let seq = obj.get("seq").and_then(Value::as_u64);

        let operation = match obj.get("operation") {
            None | Some(Value::Null) => {
                return Err(IdentityError::format("Missing operation key"))
            }
            Some(Value::Object(operation)) => operation,
            Some(other) => {
                return Err(IdentityError::format(format!(
                    "Invalid operation data: {}",
                    other
                )))
            }
        };

        let op_type = required_str(operation, "type")?.to_string();

        let (handles, services) = if op_type == PLC_OPERATION_TYPE {
            let services = parse_services(operation.get("services"))?;
            let handles = match operation.get("alsoKnownAs") {
                None | Some(Value::Null) => Vec::new(),
                Some(aka) => parse_also_known_as(aka)?,
            };
            (Some(handles), Some(services))
        } else {
            (None, None)
        };

        Ok(Self {
            did: did.to_string(),
            cid: cid.to_string(),
            seq,
            created_at,
            op_type,
            handles,
            services,
            json,
        })
    }

    pub fn is_plc_operation(&self) -> bool {
        self.op_type == PLC_OPERATION_TYPE
    }
}

impl Services for PlcOperation {
    fn services(&self) -> &[ServiceRecord] {
        self.services.as_deref().unwrap_or(&[])
    }
}

fn required_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(IdentityError::format(format!("Missing {}", key))),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(IdentityError::format(format!("Invalid {}: {}", key, other))),
    }
}

/// Services in operations are a map keyed by service id, unlike the list in DID documents.
/// Any malformed entry rejects the whole operation.
fn parse_services(data: Option<&Value>) -> Result<Vec<ServiceRecord>> {
    let services = match data {
        None | Some(Value::Null) => return Err(IdentityError::format("Missing services key")),
        Some(Value::Object(services)) => services,
        Some(other) => {
            return Err(IdentityError::format(format!(
                "Invalid services data: {}",
                other
            )))
        }
    };

    services
        .iter()
        .map(|(key, entry)| {
            let entry = entry.as_object().ok_or_else(|| {
                IdentityError::format(format!("Invalid service entry {}: {}", key, entry))
            })?;
            let service_type = required_str(entry, "type")
                .map_err(|e| IdentityError::format(format!("Service {}: {}", key, e)))?;
            let endpoint = required_str(entry, "endpoint")
                .map_err(|e| IdentityError::format(format!("Service {}: {}", key, e)))?;
            ServiceRecord::new(key, service_type, endpoint)
        })
        .collect()
}
