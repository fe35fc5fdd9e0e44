//! Error types for load test runs

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for load test operations
pub type Result<T> = std::result::Result<T, LoadTestError>;

/// Errors that can occur while configuring or running a load test
#[derive(Error, Debug)]
pub enum LoadTestError {
    // === Startup ===
    /// Missing or invalid settings; aborts the run before any flow launches
    #[error("Configuration error: {0}")]
    Configuration(String),

    // === Flow setup ===
    /// Session bundle could not be read or parsed
    #[error("Failed to load session bundle {path}: {reason}")]
    Session { path: PathBuf, reason: String },

    /// HTTP client could not be built for a flow
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    // === Per call ===
    /// Network failure or timeout on a single call
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Status code outside the expected set for an endpoint
    #[error("Unexpected status {status} from {endpoint}")]
    Protocol { endpoint: String, status: u16 },

    // === Per flow ===
    /// Fault raised inside a flow and caught by the controller
    #[error("Flow failed: {0}")]
    Flow(String),
}

impl LoadTestError {
    /// Shorthand for configuration errors
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error must stop the run before it starts
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Transport-level failure of a single API call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The call did not complete within its timeout
    #[error("Request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// Connection could not be established or was dropped
    #[error("Connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },
}

impl TransportError {
    /// Classify a reqwest failure
    pub fn from_reqwest(endpoint: &str, timeout_ms: u64, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms,
            }
        } else {
            Self::Connection {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(LoadTestError::config("missing base url").is_fatal());
        assert!(!LoadTestError::Flow("boom".into()).is_fatal());
        assert!(!LoadTestError::Protocol {
            endpoint: "/api/v1/users".into(),
            status: 500,
        }
        .is_fatal());
    }

    #[test]
    fn test_transport_error_display() {
        let err = LoadTestError::from(TransportError::Timeout {
            endpoint: "/api/v1/scoreboard".into(),
            timeout_ms: 30_000,
        });
        assert_eq!(
            err.to_string(),
            "Request to /api/v1/scoreboard timed out after 30000ms"
        );
    }
}
