//! Progress events and subscription tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::queue::{JobStatus, LogEntry, SubmitOptions};
use crate::resilience::RetryPolicy;
use crate::transport::Payload;

/// Polls are never spaced closer than this.
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// What a subscriber observes, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// Submission accepted; always the first event.
    Enqueued { request_id: String },
    /// A non-terminal status or a new queue position.
    StatusChanged {
        request_id: String,
        status: JobStatus,
        queue_position: Option<u64>,
    },
    /// Log lines not delivered before, in arrival order.
    LogAppended {
        request_id: String,
        entries: Vec<LogEntry>,
    },
    Completed { request_id: String },
    Failed {
        request_id: String,
        detail: Option<Value>,
    },
}

impl SubscriptionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionEvent::Completed { .. } | SubscriptionEvent::Failed { .. }
        )
    }
}

/// Spacing of status polls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,

    /// Multiplier applied after every poll; 1.0 keeps the interval fixed.
    pub backoff_factor: f64,

    pub max_interval_ms: u64,
}

impl PollingConfig {
    /// Wait before poll number `poll` (0-based).
    pub fn delay(&self, poll: u32) -> Duration {
        let base = self.interval_ms.max(MIN_POLL_INTERVAL_MS);
        let cap = self.max_interval_ms.max(base);
        let factor = if self.backoff_factor.is_finite() {
            self.backoff_factor.max(1.0)
        } else {
            1.0
        };
        let scaled = base as f64 * factor.powi(poll.min(64) as i32);
        Duration::from_millis(scaled.min(cap as f64) as u64)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            backoff_factor: 1.0,
            max_interval_ms: 10_000,
        }
    }
}

/// How status updates reach the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeMode {
    #[default]
    Polling,
    /// Server-pushed status feed.
    Streaming,
}

#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub submit: SubmitOptions,
    /// Request logs with every status.
    pub logs: bool,
    pub mode: SubscribeMode,
    pub polling: PollingConfig,
    /// Reconnect budget of the status feed in [`SubscribeMode::Streaming`].
    pub retry: RetryPolicy,
    /// Give up (and cancel the job) after this long.
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            submit: SubmitOptions::default(),
            logs: true,
            mode: SubscribeMode::Polling,
            polling: PollingConfig::default(),
            retry: RetryPolicy::default(),
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl SubscribeOptions {
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    pub fn with_mode(mut self, mode: SubscribeMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Outcome of a completed subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionResult {
    pub request_id: String,
    pub status: JobStatus,
    pub data: Payload,
}
