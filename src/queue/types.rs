//! Queue data model and wire shapes.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::endpoint::EndpointId;

/// Lifecycle of one job.
///
/// ```text
/// Submitted → InQueue → InProgress → {Completed | Failed}
///     └──────────┴──────────┴──────→ Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Position in the progress order. Terminal states share the top rank.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Submitted => 0,
            JobStatus::InQueue => 1,
            JobStatus::InProgress => 2,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        if self.is_terminal() || self == next {
            return false;
        }
        next == JobStatus::Cancelled || next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::InQueue => "IN_QUEUE",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log line emitted by the remote job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Point-in-time snapshot returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub status: JobStatus,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub queue_position: Option<u64>,
    #[serde(default)]
    pub response_url: Option<String>,
    /// Failure detail, present on FAILED.
    #[serde(default)]
    pub error: Option<Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<LogEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<LogEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body returned by submission.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SubmitResponse {
    pub request_id: String,
    #[serde(default)]
    pub status_url: Option<String>,
    #[serde(default)]
    pub response_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
    #[serde(default)]
    pub queue_position: Option<u64>,
}

/// Caller-owned reference to a submitted job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    pub request_id: String,
    pub endpoint: EndpointId,
    pub status: JobStatus,
    pub queue_position: Option<u64>,
    pub status_url: Option<String>,
    pub response_url: Option<String>,
    pub cancel_url: Option<String>,
}

/// Queue priority hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePriority {
    Normal,
    Low,
}

impl QueuePriority {
    pub fn as_str(self) -> &'static str {
        match self {
            QueuePriority::Normal => "normal",
            QueuePriority::Low => "low",
        }
    }
}

/// Options for [`crate::queue::Queue::submit`].
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Called by the service when the job finishes.
    pub webhook_url: Option<String>,
    pub priority: Option<QueuePriority>,
    /// Runner routing hint.
    pub hint: Option<String>,
    /// Give up if the job has not started within this window.
    pub start_timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use JobStatus::*;
        assert!(Submitted.can_advance_to(InQueue));
        assert!(InQueue.can_advance_to(InProgress));
        assert!(InQueue.can_advance_to(Completed));
        assert!(InProgress.can_advance_to(Failed));
        assert!(InProgress.can_advance_to(Cancelled));
    }

    #[test]
    fn test_no_regression_or_exit_from_terminal() {
        use JobStatus::*;
        assert!(!InProgress.can_advance_to(InQueue));
        assert!(!InQueue.can_advance_to(InQueue));
        assert!(!Completed.can_advance_to(Failed));
        assert!(!Cancelled.can_advance_to(InProgress));
        assert!(!Failed.can_advance_to(Cancelled));
    }

    #[test]
    fn test_status_wire_format() {
        let parsed: QueueStatus = serde_json::from_str(
            r#"{"status":"IN_QUEUE","queue_position":3,"logs":[{"message":"warming up","level":"INFO"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.status, JobStatus::InQueue);
        assert_eq!(parsed.queue_position, Some(3));
        assert_eq!(parsed.logs[0].level.as_deref(), Some("INFO"));

        let bare: QueueStatus = serde_json::from_str(r#"{"status":"COMPLETED"}"#).unwrap();
        assert!(bare.logs.is_empty());

        let null_logs: QueueStatus =
            serde_json::from_str(r#"{"status":"IN_PROGRESS","logs":null}"#).unwrap();
        assert!(null_logs.logs.is_empty());
    }
}
