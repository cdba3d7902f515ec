//! Realtime channel tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::RetryPolicy;

/// Default coalescing window for outbound sends.
pub const DEFAULT_THROTTLE_MS: u64 = 128;

/// What to do with a send when the outbound buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest buffered message.
    #[default]
    DropOldest,
    /// Suspend the sender until space frees up.
    Block,
}

/// Rate limiting of outbound sends while the connection is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThrottlePolicy {
    /// Every send goes out as soon as possible.
    None,
    /// At most one send per window; only the most recent pending send is kept.
    LatestWins { interval_ms: u64 },
}

impl ThrottlePolicy {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            ThrottlePolicy::None => None,
            ThrottlePolicy::LatestWins { interval_ms } => Some(Duration::from_millis(*interval_ms)),
        }
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        ThrottlePolicy::LatestWins {
            interval_ms: DEFAULT_THROTTLE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub throttle: ThrottlePolicy,

    /// Messages held while not yet connected.
    pub buffer_capacity: usize,

    pub overflow: OverflowPolicy,

    /// Reconnect budget after an unexpected closure.
    pub reconnect: RetryPolicy,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            throttle: ThrottlePolicy::default(),
            buffer_capacity: 64,
            overflow: OverflowPolicy::DropOldest,
            reconnect: RetryPolicy::default(),
        }
    }
}
