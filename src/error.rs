//! Error taxonomy shared by the SDK and the relay.
//!
//! # Design Decisions
//! - One enum for every client-side failure so callers match on a single type
//! - `Cancelled` is a cooperative stop, not a failure; use `is_cancellation()`
//! - Relay failures map to fixed HTTP statuses via `ProtocolError::status_code()`

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by caller-supplied handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// One field-level complaint from a schema-rejecting endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path of the offending input field (e.g. `body.prompt`).
    pub field: String,
    /// Human readable message.
    pub message: String,
    /// Machine readable kind (e.g. `missing`, `type_error.integer`).
    pub kind: String,
}

/// Errors that can occur while talking to remote endpoints.
#[derive(Debug, Error)]
pub enum Error {
    /// Endpoint identifier does not follow `[namespace/]owner/alias[/path]`.
    #[error("invalid endpoint id '{0}': expected [namespace/]owner/alias[/path]")]
    InvalidEndpoint(String),

    /// Input rejected by the endpoint schema.
    #[error("validation failed ({status}): {}", summarize(.issues))]
    Validation {
        status: u16,
        issues: Vec<ValidationIssue>,
        body: String,
    },

    /// Any other non-2xx response, or a job that finished in FAILED.
    #[error("API error {status}: {body}")]
    Api {
        status: u16,
        body: String,
        request_id: Option<String>,
    },

    /// Connection failure, timeout or DNS error before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// Relay protocol violation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Operation invoked in a job state that does not allow it.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Caller asked to stop.
    #[error("operation cancelled")]
    Cancelled,

    /// Caller-imposed deadline elapsed; the job was asked to cancel.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Response body could not be decoded into the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Persistent connection failure (realtime or streaming).
    #[error("connection error: {0}")]
    Connection(String),

    /// A caller-supplied message handler failed.
    #[error("handler error: {0}")]
    Handler(String),
}

impl Error {
    /// True when this value signals a cooperative stop rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Validation { status, .. } | Error::Api { status, .. } => Some(*status),
            Error::Protocol(e) => Some(e.status_code()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

fn summarize(issues: &[ValidationIssue]) -> String {
    if issues.is_empty() {
        return "no detail".to_string();
    }
    issues
        .iter()
        .map(|i| format!("{}: {}", i.field, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures of the credential-forwarding relay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Target URL header absent or empty.
    #[error("missing the {0} header")]
    MissingTargetUrl(&'static str),

    /// Target URL unparsable or outside the allowed domain family.
    #[error("invalid target url: {0}")]
    DisallowedTarget(String),

    /// Neither an override nor the environment yields credentials.
    #[error("missing server credentials")]
    MissingCredentials,

    /// Inbound body could not be read.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Upstream call failed before producing a response.
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl ProtocolError {
    /// Fixed HTTP status for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            ProtocolError::MissingTargetUrl(_) | ProtocolError::InvalidBody(_) => 400,
            ProtocolError::DisallowedTarget(_) => 412,
            ProtocolError::MissingCredentials => 401,
            ProtocolError::Upstream(_) => 502,
        }
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ProtocolError::MissingTargetUrl(_) => "missing_target",
            ProtocolError::DisallowedTarget(_) => "disallowed_target",
            ProtocolError::MissingCredentials => "missing_credentials",
            ProtocolError::InvalidBody(_) => "invalid_body",
            ProtocolError::Upstream(_) => "upstream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_status_codes() {
        assert_eq!(ProtocolError::MissingTargetUrl("x-target").status_code(), 400);
        assert_eq!(ProtocolError::DisallowedTarget("evil.com".into()).status_code(), 412);
        assert_eq!(ProtocolError::MissingCredentials.status_code(), 401);
        assert_eq!(ProtocolError::Upstream("reset".into()).status_code(), 502);
    }

    #[test]
    fn test_cancellation_is_distinguishable() {
        assert!(Error::Cancelled.is_cancellation());
        let failed = Error::Api {
            status: 500,
            body: "boom".into(),
            request_id: None,
        };
        assert!(!failed.is_cancellation());
        assert_eq!(failed.status(), Some(500));
    }

    #[test]
    fn test_validation_display() {
        let err = Error::Validation {
            status: 422,
            issues: vec![ValidationIssue {
                field: "body.prompt".into(),
                message: "field required".into(),
                kind: "missing".into(),
            }],
            body: String::new(),
        };
        assert!(err.to_string().contains("body.prompt: field required"));
    }
}
