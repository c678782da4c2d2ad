//! # Error Handling Module
//!
//! Classified errors for every upstream operation performed by the gateway.
//!
//! The taxonomy matters more than the messages: the retry executor decides whether to
//! re-run an operation purely from the error kind, and callers pick user-facing
//! messages from it. The rules are:
//!
//! - **Client** (upstream 4xx): a caller/data problem. Never retried.
//! - **Server** (upstream 5xx): transient upstream fault. Retried, then surfaced.
//! - **Network**: the connection could not be made or broke. Retried.
//! - **Timeout**: the per-attempt deadline elapsed. Retried, then surfaced as its own
//!   kind so callers can tell "slow" apart from "unreachable".
//!
//! A disabled cache policy is not an error; it just routes to a live fetch.
//!
//! `GatewayError` is `Clone` because a single-flight outcome is delivered to every
//! joiner waiting on the same key.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Classified gateway errors
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Upstream rejected the request with a 1xx-4xx status
    #[error("Upstream client error {status}: {detail}")]
    Client { status: u16, detail: Value },

    /// Upstream failed with a 5xx status
    #[error("Upstream server error {status}: {detail}")]
    Server { status: u16, detail: Value },

    /// Connection-level failure talking to the upstream
    #[error("Network error: {message}")]
    Network { message: String },

    /// The upstream did not answer within the configured deadline
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The upstream answered 2xx with a body that is not valid JSON
    #[error("Failed to decode upstream response: {message}")]
    Decode { message: String },

    /// The caller asked for something the gateway cannot express upstream
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal errors for unexpected failures
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Build the right variant for a non-success upstream status
    pub fn from_status(status: u16, detail: Value) -> Self {
        if status >= 500 {
            Self::Server { status, detail }
        } else {
            Self::Client { status, detail }
        }
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn invalid_request<S: Into<String>>(reason: S) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Upstream HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this error should be retried
    ///
    /// A status in `[100, 500)` is terminal. Anything without a status (network
    /// faults, timeouts, undecodable bodies) and any 5xx is transient. Errors raised by
    /// the gateway itself before reaching the upstream are terminal.
    pub fn is_retryable(&self) -> bool {
        match self.status() {
            Some(status) => !(100..500).contains(&status),
            None => !matches!(
                self,
                Self::InvalidRequest { .. } | Self::Configuration { .. }
            ),
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Client { .. } => "client_error",
            Self::Server { .. } => "server_error",
            Self::Network { .. } => "network_error",
            Self::Timeout { .. } => "timeout",
            Self::Decode { .. } => "decode_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// HTTP status to report when this error crosses the admin surface
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Client { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            Self::Server { .. } | Self::Network { .. } | Self::Decode { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Configuration { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Implement conversion from serde_json::Error
impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from serde_yaml::Error
impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from reqwest::Error
///
/// The client-level timeout is a backstop for the dispatcher's own deadline, so both
/// paths end up as `Timeout`.
impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_ms: 0 }
        } else if err.is_decode() {
            Self::Decode {
                message: err.to_string(),
            }
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
                "retryable": self.is_retryable(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            GatewayError::from_status(404, Value::Null),
            GatewayError::Client { status: 404, .. }
        ));
        assert!(matches!(
            GatewayError::from_status(503, Value::Null),
            GatewayError::Server { status: 503, .. }
        ));
        assert!(matches!(
            GatewayError::from_status(500, Value::Null),
            GatewayError::Server { .. }
        ));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GatewayError::from_status(503, Value::Null).is_retryable());
        assert!(GatewayError::from_status(500, Value::Null).is_retryable());
        assert!(GatewayError::network("connection refused").is_retryable());
        assert!(GatewayError::Timeout { timeout_ms: 5000 }.is_retryable());
        assert!(GatewayError::Decode { message: "eof".into() }.is_retryable());

        assert!(!GatewayError::from_status(404, Value::Null).is_retryable());
        assert!(!GatewayError::from_status(400, Value::Null).is_retryable());
        assert!(!GatewayError::from_status(100, Value::Null).is_retryable());
        assert!(!GatewayError::invalid_request("empty path").is_retryable());
        assert!(!GatewayError::config("bad").is_retryable());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GatewayError::from_status(404, json!({"message": "missing"})).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Timeout { timeout_ms: 10 }.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::network("reset").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_timeout_is_distinct_from_network() {
        let timeout = GatewayError::timeout(std::time::Duration::from_secs(2));
        assert_eq!(timeout.error_type(), "timeout");
        assert_eq!(timeout.to_string(), "Request timeout after 2000ms");
        assert_ne!(
            timeout.error_type(),
            GatewayError::network("down").error_type()
        );
    }
}
