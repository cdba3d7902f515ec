//! Queue engine: asynchronous job lifecycle.
//!
//! # Data Flow
//! ```text
//! submit  → POST {queue}/{endpoint}                       → JobHandle
//! status  → GET  {queue}/{app}/requests/{id}/status?logs=1 → QueueStatus
//! cancel  → PUT  {queue}/{app}/requests/{id}/cancel
//! result  → GET  {queue}/{app}/requests/{id}              → Payload
//! ```
//!
//! # Design Decisions
//! - Status and result address `[namespace/]owner/alias`; the sub-path only
//!   matters at submission
//! - The engine keeps no per-job state; `JobTracker` holds the handle and
//!   last observed status and nothing more
//! - Errors are never suppressed

pub mod engine;
pub mod types;

pub use engine::{JobTracker, LogCursor, Queue};
pub use types::{JobHandle, JobStatus, LogEntry, QueuePriority, QueueStatus, SubmitOptions};
