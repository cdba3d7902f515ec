//! HTTP host for the relay.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (assign/propagate request ID)
//!     → proxy::AxumExchange → proxy::ProxyHandler
//!     → response relayed to client
//! ```

pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{upstream_client_builder, HttpServer};
