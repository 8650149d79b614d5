//! Service records and the lookups shared by documents and PLC operations

use serde::Serialize;
use url::Url;

use crate::error::{IdentityError, Result};

pub const PDS_SERVICE_KEY: &str = "atproto_pds";
pub const PDS_SERVICE_TYPE: &str = "AtprotoPersonalDataServer";
pub const LABELER_SERVICE_KEY: &str = "atproto_labeler";
pub const LABELER_SERVICE_TYPE: &str = "AtprotoLabeler";

/// One declared service, e.g. a PDS or a labeler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRecord {
    /// Service identifier without the leading `#`, like "atproto_pds"
    pub key: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub endpoint: String,
}

impl ServiceRecord {
    /// Fails with a format error when the endpoint is not a valid URI
    pub fn new(key: &str, service_type: &str, endpoint: &str) -> Result<Self> {
        Url::parse(endpoint).map_err(|_| {
            IdentityError::format(format!("Invalid service endpoint: {:?}", endpoint))
        })?;

        Ok(Self {
            key: key.to_string(),
            service_type: service_type.to_string(),
            endpoint: endpoint.to_string(),
        })
    }

    pub fn host(&self) -> Option<String> {
        Url::parse(&self.endpoint)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }
}

/// Lookups over a list of service records
pub trait Services {
    fn services(&self) -> &[ServiceRecord];

    fn get_service(&self, key: &str, service_type: &str) -> Option<&ServiceRecord> {
        self.services()
            .iter()
            .find(|s| s.key == key && s.service_type == service_type)
    }

    fn pds_endpoint(&self) -> Option<&str> {
        self.get_service(PDS_SERVICE_KEY, PDS_SERVICE_TYPE)
            .map(|s| s.endpoint.as_str())
    }

    fn pds_host(&self) -> Option<String> {
        self.get_service(PDS_SERVICE_KEY, PDS_SERVICE_TYPE)
            .and_then(ServiceRecord::host)
    }

    fn labeler_endpoint(&self) -> Option<&str> {
        self.get_service(LABELER_SERVICE_KEY, LABELER_SERVICE_TYPE)
            .map(|s| s.endpoint.as_str())
    }

    fn labeler_host(&self) -> Option<String> {
        self.get_service(LABELER_SERVICE_KEY, LABELER_SERVICE_TYPE)
            .and_then(ServiceRecord::host)
    }

    fn labeller_endpoint(&self) -> Option<&str> {
        self.labeler_endpoint()
    }

    fn labeller_host(&self) -> Option<String> {
        self.labeler_host()
    }
}

impl Services for [ServiceRecord] {
    fn services(&self) -> &[ServiceRecord] {
        self
    }
}
