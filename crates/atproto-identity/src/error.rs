//! Error types for AT Protocol identity resolution

use std::fmt;

/// An HTTP response with an unexpected status or content type
#[derive(Debug, Clone)]
pub struct ApiError {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected response from {}: status {}", self.url, self.status)?;
        if let Some(ref content_type) = self.content_type {
            write!(f, " ({})", content_type)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum IdentityError {
    /// A document, service record or change record has a missing or invalid field
    Format(String),
    /// A string is not a DID, or uses an unsupported method
    Did(String),
    Api(ApiError),
    Http(Box<reqwest::Error>),
    /// Transport failure not originating from reqwest (bad redirect target, custom clients)
    Transport(String),
    Dns(String),
}

impl IdentityError {
    pub fn format(msg: impl Into<String>) -> Self {
        IdentityError::Format(msg.into())
    }

    pub fn is_format(&self) -> bool {
        matches!(self, IdentityError::Format(_))
    }
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::Format(msg) => write!(f, "Format error: {}", msg),
            IdentityError::Did(msg) => write!(f, "DID error: {}", msg),
            IdentityError::Api(err) => write!(f, "API error: {}", err),
            IdentityError::Http(err) => write!(f, "HTTP error: {}", err),
            IdentityError::Transport(msg) => write!(f, "Transport error: {}", msg),
            IdentityError::Dns(msg) => write!(f, "DNS error: {}", msg),
        }
    }
}

impl std::error::Error for IdentityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IdentityError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        IdentityError::Http(Box::new(err))
    }
}

impl From<ApiError> for IdentityError {
    fn from(err: ApiError) -> Self {
        IdentityError::Api(err)
    }
}

impl From<hickory_resolver::ResolveError> for IdentityError {
    fn from(err: hickory_resolver::ResolveError) -> Self {
        IdentityError::Dns(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;
