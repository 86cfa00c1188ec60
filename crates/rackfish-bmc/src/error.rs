//! Error types for Redfish operations

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

use crate::response::ExtendedInfo;

/// Classification of a single failed attempt inside the request executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 401/403 from the service; the session is stale or credentials were rejected
    AuthExpired,
    /// Connection refused, TLS handshake failure or timeout
    Connection,
    /// Any other transport failure (body read, decode, protocol framing)
    Transient,
    /// Not retryable at all
    Fatal,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::AuthExpired => write!(f, "auth-expired"),
            FailureClass::Connection => write!(f, "connection"),
            FailureClass::Transient => write!(f, "transient"),
            FailureClass::Fatal => write!(f, "fatal"),
        }
    }
}

/// Error type for Redfish operations
#[derive(Debug, Error)]
pub enum RedfishError {
    /// No login strategy produced a session
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The service refused a new session because its quota is used up
    #[error("session limit exceeded: {0}")]
    SessionLimitExceeded(String),

    /// Connection-level failure (refused, TLS, timeout)
    #[error("connection failed: {0}")]
    TransientConnection(String),

    /// The service answered with a shape we cannot interpret. Never retried.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A job or task reached a failed terminal state. `details` keeps the
    /// vendor entries whole (resolution, severity, message id).
    #[error("operation {id} failed: {}", .messages.join("; "))]
    OperationFailed {
        id: String,
        messages: Vec<String>,
        details: Vec<ExtendedInfo>,
    },

    /// A job or task did not terminate within its poll budget
    #[error("operation {id} did not complete after {polls} polls")]
    OperationTimeout { id: String, polls: u32 },

    /// The shared per-call retry budget was spent
    #[error("request {method} {path} failed after {attempts} attempts (last failure: {last})")]
    RetriesExhausted {
        method: String,
        path: String,
        attempts: u32,
        last: FailureClass,
    },

    /// Transport failure that is not worth retrying in the current auth mode
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status with the vendor extended info messages
    #[error("HTTP {status}: {}", .messages.join("; "))]
    Http {
        status: StatusCode,
        messages: Vec<String>,
        details: Vec<ExtendedInfo>,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RedfishError {
    /// Whether a caller may reasonably reissue the whole higher-level action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RedfishError::TransientConnection(_)
                | RedfishError::SessionLimitExceeded(_)
                | RedfishError::OperationTimeout { .. }
                | RedfishError::RetriesExhausted { .. }
        )
    }
}

/// Result type for Redfish operations
pub type Result<T> = std::result::Result<T, RedfishError>;
