//! Client SDK for queued model endpoints, plus the relay that lets browser
//! code call them without holding credentials.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ transport (credentials, middleware, proxy rewrite) ──▶ HttpSend
//!     │
//!     ├── run          one request, one response
//!     ├── queue        submit / status / result / cancel
//!     ├── subscribe    submit + poll (or status feed) until terminal
//!     ├── stream       SSE partial results
//!     └── realtime     WebSocket channel with buffering and throttling
//!
//!   modelrunner-proxy (binary)
//!     http server ──▶ proxy::ProxyHandler ──▶ allow-listed API (+ Authorization)
//! ```

// SDK
pub mod client;
pub mod endpoint;
pub mod error;
pub mod queue;
pub mod realtime;
pub mod streaming;
pub mod subscription;
pub mod transport;

// Relay
pub mod proxy;

// Cross-cutting concerns
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use client::{Client, ClientConfig, Credentials};
pub use endpoint::EndpointId;
pub use error::{Error, ProtocolError, Result};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
