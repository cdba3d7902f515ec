//! Request middleware pipeline.
//!
//! # Data Flow
//! ```text
//! RequestSpec → stage 0 → stage 1 → ... → stage n → HttpSend
//! ```
//!
//! # Design Decisions
//! - Stages are async so a transformer may fetch something before rewriting
//! - A chain is itself a `Middleware`; nesting chains equals flattening them
//! - The proxy stage is idempotent: a request already carrying the target
//!   header passes through untouched

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::proxy::TARGET_URL_HEADER;
use crate::transport::request::RequestSpec;

/// Transforms a request on its way to the wire.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn apply(&self, request: RequestSpec) -> Result<RequestSpec>;
}

/// Adapter turning a synchronous closure into a middleware stage.
pub struct FnMiddleware<F>(F);

/// Build a middleware stage from a closure.
pub fn middleware_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(RequestSpec) -> Result<RequestSpec> + Send + Sync,
{
    FnMiddleware(f)
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(RequestSpec) -> Result<RequestSpec> + Send + Sync,
{
    async fn apply(&self, request: RequestSpec) -> Result<RequestSpec> {
        (self.0)(request)
    }
}

/// Ordered sequence of middleware stages.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stages: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Empty chain (identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn push(mut self, stage: impl Middleware + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append a shared stage.
    pub fn push_shared(mut self, stage: Arc<dyn Middleware>) -> Self {
        self.stages.push(stage);
        self
    }

    /// `self` first, then `next`.
    pub fn then(mut self, next: MiddlewareChain) -> Self {
        self.stages.extend(next.stages);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}

#[async_trait]
impl Middleware for MiddlewareChain {
    async fn apply(&self, mut request: RequestSpec) -> Result<RequestSpec> {
        for stage in &self.stages {
            request = stage.apply(request).await?;
        }
        Ok(request)
    }
}

/// Redirects every request to a relay, moving the real target into a header.
#[derive(Debug, Clone)]
pub struct ProxyMiddleware {
    proxy_url: String,
}

impl ProxyMiddleware {
    pub fn new(proxy_url: impl Into<String>) -> Self {
        Self {
            proxy_url: proxy_url.into(),
        }
    }
}

#[async_trait]
impl Middleware for ProxyMiddleware {
    async fn apply(&self, mut request: RequestSpec) -> Result<RequestSpec> {
        if request.headers.contains_key(TARGET_URL_HEADER) {
            return Ok(request);
        }
        let target = std::mem::replace(&mut request.url, self.proxy_url.clone());
        request.set_header(TARGET_URL_HEADER, &target)?;
        Ok(request)
    }
}
