//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! caller
//!     → request.rs (RequestSpec: url, method, headers, body)
//!     → middleware.rs (ordered transformers, proxy rewrite last)
//!     → core.rs (credential injection, send, classify)
//!     → http.rs (pluggable HttpSend; reqwest in production)
//!     → response.rs (Payload or classified Error)
//! ```
//!
//! # Design Decisions
//! - The send primitive never interprets status codes
//! - Credentials are added after middleware and only when not proxied
//! - Request-level failures always surface to the caller

pub mod core;
pub mod http;
pub mod middleware;
pub mod request;
pub mod response;
#[cfg(test)]
pub(crate) mod testing;

pub use self::core::Transport;
pub use http::{HttpResponse, HttpSend, ReqwestSend};
pub use middleware::{middleware_fn, Middleware, MiddlewareChain, ProxyMiddleware};
pub use request::RequestSpec;
pub use response::{DefaultResponseHandler, Payload, ResponseHandler};
