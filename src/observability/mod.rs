//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! SDK and relay code
//!     → tracing events (logging.rs installs the subscriber in the binary)
//!     → metrics counters/histograms (metrics.rs, Prometheus exporter)
//! ```
//!
//! # Design Decisions
//! - The library only emits; installing subscribers and recorders is the binary's job
//! - Metric calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, DEFAULT_FILTER};
