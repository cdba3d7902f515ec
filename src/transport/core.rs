//! Transport core: one logical request end to end.
//!
//! # Data Flow
//! ```text
//! RequestSpec
//!     → middleware chain (user stages, then proxy rewrite)
//!     → credential injection (skipped when proxied)
//!     → HttpSend
//!     → ResponseHandler (Payload | Validation | Api)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, USER_AGENT};

use crate::client::config::ClientConfig;
use crate::error::Result;
use crate::transport::middleware::Middleware;
use crate::transport::request::RequestSpec;
use crate::transport::response::Payload;

/// User agent sent with every SDK request.
pub const SDK_USER_AGENT: &str = concat!("modelrunner-client-rust/", env!("CARGO_PKG_VERSION"));

/// Executes requests for one client instance.
pub struct Transport {
    config: Arc<ClientConfig>,
    warned: AtomicBool,
}

impl Transport {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            config,
            warned: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Apply middleware and credentials without sending.
    pub async fn prepare(&self, request: RequestSpec) -> Result<RequestSpec> {
        let mut request = self.config.middleware.apply(request).await?;

        if request.header(USER_AGENT.as_str()).is_none() {
            request.set_header(USER_AGENT.as_str(), SDK_USER_AGENT)?;
        }

        if let Some(credentials) = self.config.resolve_credentials() {
            self.warn_once_if_exposed();
            if !request.headers.contains_key(AUTHORIZATION) {
                request.set_header(AUTHORIZATION.as_str(), &credentials.authorization())?;
            }
        }

        Ok(request)
    }

    /// Prepare, send and classify one request.
    pub async fn execute(&self, request: RequestSpec) -> Result<Payload> {
        let request = self.prepare(request).await?;
        let method = request.method.clone();
        let url = request.url.clone();

        tracing::debug!(method = %method, url = %url, "Sending request");
        let response = match self.config.http.send(request).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(method = %method, url = %url, error = %e, "Request failed before a response");
                return Err(e);
            }
        };

        tracing::debug!(method = %method, url = %url, status = response.status, "Response received");
        self.config.response_handler.handle(response)
    }

    fn warn_once_if_exposed(&self) {
        if !self.config.warns_on_credentials() {
            return;
        }
        if !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "Credentials are in use in a browser-like environment. \
                 Route requests through a server-side proxy to keep them private."
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn has_warned(&self) -> bool {
        self.warned.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").field("config", &self.config).finish()
    }
}
