use thiserror::Error;

/// Errors raised while talking to a carrier.
///
/// "Carrier says not found" is never an error: it comes back as a normal
/// canonical response with `not_found` status.
#[derive(Debug, Error)]
pub enum CarrierError {
    /// The requested carrier id has no registered adapter.
    #[error("carrier '{requested}' is not supported (supported: {})", .supported.join(", "))]
    NotSupported {
        requested: String,
        supported: Vec<String>,
    },

    /// The request cannot be sent (e.g. no tracking id supplied).
    #[error("invalid tracking request: {0}")]
    InvalidRequest(String),

    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Credentials were rejected or a token could not be obtained.
    #[error("carrier authentication failed: {0}")]
    Auth(String),

    /// The carrier answered with a SOAP fault.
    #[error("SOAP fault {code}: {message}")]
    Fault { code: String, message: String },

    /// The response body could not be decoded at all.
    #[error("could not decode {context}: {reason}")]
    Decode { context: String, reason: String },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl CarrierError {
    /// `true` when the caller sent something the carrier layer refuses outright.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CarrierError::NotSupported { .. } | CarrierError::InvalidRequest(_)
        )
    }
}
