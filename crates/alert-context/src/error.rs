//! Error types for remote sources and configuration.

use thiserror::Error;

/// Errors raised by the remote adapters (GitHub, Elasticsearch).
///
/// These never cross a component boundary: the searcher, resolver and
/// reconstructor turn them into tagged results.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed (connect, timeout, TLS, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote answered with a non-success status
    #[error("{service} returned status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Response body could not be decoded
    #[error("Failed to decode {service} response: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },

    /// CA bundle could not be loaded
    #[error("Failed to load CA certificates from {path}: {reason}")]
    Certificate { path: String, reason: String },

    /// Capability is not configured
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl SourceError {
    /// Whether this is a 404 from the remote.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Repository value is not `owner/repo`
    #[error("{var} must be in owner/repo form, got '{value}'")]
    InvalidRepository { var: &'static str, value: String },

    /// Numeric setting must be positive
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    /// Value could not be parsed
    #[error("{var} has an invalid value '{value}'")]
    InvalidValue { var: &'static str, value: String },
}
