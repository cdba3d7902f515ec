//! Subscription orchestrator: one suspending call from submission to result.
//!
//! # Data Flow
//! ```text
//! subscribe
//!     → Queue::submit                       → Enqueued
//!     → poll loop | pushed status feed      → StatusChanged / LogAppended
//!     → terminal status                     → Completed | Failed
//!     → Queue::result                       → SubscriptionResult
//! ```
//!
//! # Design Decisions
//! - Events are delivered inline; a slow handler slows polling down
//! - Cancellation and timeout both cancel the remote job before returning

pub mod events;
pub mod orchestrator;

pub use events::{
    PollingConfig, SubscribeMode, SubscribeOptions, SubscriptionEvent, SubscriptionResult,
    MIN_POLL_INTERVAL_MS,
};
pub use orchestrator::subscribe;
