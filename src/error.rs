//! Error types for mesh-dns-sync.

use thiserror::Error;

/// Errors that can occur during a sync cycle or while loading configuration.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP transport error (connection, TLS, timeout, body decoding).
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// A provider answered, but with an error status or `success: false`.
    #[error("{service} API error (status {status}): {message}")]
    Api {
        /// Which upstream produced the error (e.g. "cloudflare").
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// First error message reported by the provider.
        message: String,
    },

    /// A field the engine depends on was absent from a provider response.
    #[error("{service} response is missing field `{field}`")]
    MissingField {
        /// Which upstream produced the response.
        service: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },

    /// The configured domain has no zone at the DNS provider.
    #[error("no DNS zone found for domain {0}")]
    ZoneNotFound(String),

    /// A provider reported an address that is not an IP address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Response body was not valid JSON for the expected shape.
    #[error("malformed {service} response: {source}")]
    Decode {
        /// Which upstream produced the response.
        service: &'static str,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration source could not be read or deserialized.
    #[error("configuration error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// Invalid URL in configuration
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// IO error (secret files, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`SyncError`], used for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An upstream call could not complete.
    Transport,
    /// A provider response lacked an expected field.
    MissingField,
    /// Input was rejected by validation.
    Validation,
    /// Anything else.
    Unexpected,
}

impl ErrorKind {
    /// Label used for the `result` metric dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::MissingField => "missing_field",
            ErrorKind::Validation => "validation",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl SyncError {
    /// Shorthand for [`SyncError::MissingField`].
    pub fn missing_field(service: &'static str, field: &'static str) -> Self {
        SyncError::MissingField { service, field }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Http(_) | SyncError::Api { .. } | SyncError::Io(_) => ErrorKind::Transport,
            SyncError::MissingField { .. } | SyncError::Decode { .. } => ErrorKind::MissingField,
            SyncError::Config(_) | SyncError::ConfigSource(_) | SyncError::Url(_) => {
                ErrorKind::Validation
            }
            SyncError::ZoneNotFound(_) | SyncError::InvalidAddress(_) => ErrorKind::Unexpected,
        }
    }
}
