//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dropped stream or socket:
//!     → backoff.rs (check retry budget, wait jittered exponential delay)
//!     → reconnect with the same correlation id
//! ```
//!
//! # Design Decisions
//! - Every reconnect loop is bounded by an attempt budget
//! - Jittered backoff prevents thundering herd on shared outages
//! - Submissions are never retried (at-most-once delivery to the server)

pub mod backoff;

pub use backoff::{calculate_backoff, RetryPolicy};
