//! Realtime channel: persistent bidirectional connection to one endpoint.
//!
//! # Data Flow
//! ```text
//! send ──→ outbox (buffer while connecting, latest-wins slot while open)
//!              └──→ driver task ──→ Connection sink ──→ wire
//! wire ──→ Connection stream ──→ driver task ──→ on_message | on_error
//! ```
//!
//! # Design Decisions
//! - One driver task owns the connection; callers only touch the outbox
//! - The URL (and its token) is resolved again before every connect
//! - Handler failures are reported, never fatal to the connection

pub mod channel;
pub mod config;
pub mod connection;
pub mod url;

pub use channel::{ConnectionState, RealtimeChannel, RealtimeHandlers, ERROR_MESSAGE_TYPE};
pub use config::{OverflowPolicy, RealtimeConfig, ThrottlePolicy};
pub use connection::{Connection, ConnectionSink, ConnectionStream, Connector, Frame, WebSocketConnector};
pub use url::{StaticUrl, TokenUrl, UrlSource};
