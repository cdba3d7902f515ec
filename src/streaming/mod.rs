//! Server-push streaming of progressive results.
//!
//! # Data Flow
//! ```text
//! StreamChannel::open
//!     → Transport::prepare (middleware, credentials)
//!     → feed.rs (EventSource, bounded reconnect, Last-Event-ID resume)
//!     → channel.rs (SSE message → StreamEvent)
//! ```
//!
//! # Design Decisions
//! - `event: done` and `event: error` are the only terminal messages; a
//!   connection that closes before either is treated as a drop and retried
//! - Client errors (4xx) are never retried

pub mod channel;
pub mod feed;

pub use channel::{StreamChannel, StreamEvent, StreamOptions, CORRELATION_ID_HEADER};
pub use feed::{FeedItem, SseMessage};
