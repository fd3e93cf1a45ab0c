//! Error types for the slot monitor
//!
//! Every failure in the core degrades to "skip and retry next tick"; none of
//! these variants is fatal to the host process.

use thiserror::Error;

/// Result type alias for slot monitor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the slot monitor
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure, timeout, or non-2xx response
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Persistent store read/write failure
    #[error("Persistence fault: {0}")]
    Persistence(String),

    /// Invalid configuration (e.g. a non-positive interval)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Notification sink failure
    #[error("Notification error: {0}")]
    Notification(String),

    /// Control channel closed or full
    #[error("Control channel error: {0}")]
    Channel(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Create a control channel error
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    /// Whether this failure leaves a location's state "unknown, not resolved"
    ///
    /// Query failures of either kind must not create or clear a notification.
    pub fn is_query_failure(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Parse(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_failure_classification() {
        assert!(Error::network("connection refused").is_query_failure());
        assert!(Error::parse("missing items").is_query_failure());
        assert!(!Error::config("interval must be >= 1").is_query_failure());
        assert!(!Error::persistence("disk full").is_query_failure());
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::network("HTTP 503");
        assert_eq!(err.to_string(), "Network error: HTTP 503");
    }
}
