//! Error types for cc-carddav

use thiserror::Error;

/// cc-carddav error type
#[derive(Error, Debug)]
pub enum CardDavError {
    /// A required field was missing on an input record. Raised before any I/O.
    #[error("{subject} must have {missing} before {operation}", missing = .fields.join(", "))]
    MissingFields {
        subject: &'static str,
        fields: Vec<&'static str>,
        operation: &'static str,
    },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid request: {0}")]
    Request(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("XML writing error: {0}")]
    XmlWrite(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CardDavError {
    /// Returns true for validation failures raised before any request was sent
    pub fn is_validation(&self) -> bool {
        matches!(self, CardDavError::MissingFields { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CardDavError>;
