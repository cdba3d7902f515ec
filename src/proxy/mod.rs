//! Credential-forwarding relay.
//!
//! # Data Flow
//! ```text
//! browser request (x-modelrunner-target-url)
//!     → exchange.rs (framework capability set)
//!     → handler.rs (target check, credentials, header filter)
//!     → HttpSend → remote API
//!     → response relayed back minus length/encoding headers
//! ```
//!
//! # Design Decisions
//! - The relay only ever talks to the allow-listed domain family
//! - Only `x-modelrunner-*` headers cross the boundary
//! - Credentials are added here and nowhere on the browser side

pub mod allowlist;
pub mod axum_adapter;
pub mod exchange;
pub mod handler;

/// Header carrying the absolute URL the relay should call.
pub const TARGET_URL_HEADER: &str = "x-modelrunner-target-url";
/// Prefix of headers forwarded upstream.
pub const HEADER_PREFIX: &str = "x-modelrunner-";
/// Default mount point of the relay route.
pub const DEFAULT_PROXY_ROUTE: &str = "/api/modelrunner/proxy";

pub use allowlist::Allowlist;
pub use axum_adapter::AxumExchange;
pub use exchange::ProxyExchange;
pub use handler::{ProxyHandler, ProxySettings};
