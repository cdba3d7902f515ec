//! Immutable per-client configuration.
//!
//! Built once through [`ClientConfigBuilder`] and shared read-only (behind an
//! `Arc`) by every operation the client spawns. Reconfiguring means building
//! a new value; nothing here is mutated in place.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::credentials::{self, Credentials, CredentialsResolver};
use crate::transport::http::{HttpSend, ReqwestSend};
use crate::transport::middleware::{Middleware, MiddlewareChain, ProxyMiddleware};
use crate::transport::response::{DefaultResponseHandler, ResponseHandler};

/// Where the client code runs. Browser-like hosts should not hold credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Server,
    Browser,
}

/// Base URLs of the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceUrls {
    /// Queue API (submit/status/cancel/result).
    pub queue: String,
    /// Synchronous run and streaming API.
    pub run: String,
    /// REST API (short-lived tokens).
    pub rest: String,
    /// WebSocket host for realtime connections.
    pub realtime: String,
}

impl Default for ServiceUrls {
    fn default() -> Self {
        Self {
            queue: "https://queue.modelrunner.run".to_string(),
            run: "https://modelrunner.run".to_string(),
            rest: "https://rest.modelrunner.ai".to_string(),
            realtime: "wss://modelrunner.run".to_string(),
        }
    }
}

/// Client configuration bundle.
#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) credentials: CredentialsResolver,
    pub(crate) proxy_url: Option<String>,
    pub(crate) middleware: MiddlewareChain,
    pub(crate) response_handler: Arc<dyn ResponseHandler>,
    pub(crate) http: Arc<dyn HttpSend>,
    pub(crate) stream_client: reqwest::Client,
    pub(crate) environment: Environment,
    pub(crate) suppress_local_credentials_warning: bool,
    pub(crate) urls: ServiceUrls,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Resolve credentials now. Returns `None` when routed through a proxy.
    pub fn resolve_credentials(&self) -> Option<Credentials> {
        if self.proxy_url.is_some() {
            return None;
        }
        (self.credentials)()
    }

    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy_url.as_deref()
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn urls(&self) -> &ServiceUrls {
        &self.urls
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    pub fn http(&self) -> Arc<dyn HttpSend> {
        self.http.clone()
    }

    /// Client used for server-push feeds, which need a streaming body.
    pub fn stream_client(&self) -> &reqwest::Client {
        &self.stream_client
    }

    pub fn response_handler(&self) -> &dyn ResponseHandler {
        self.response_handler.as_ref()
    }

    pub(crate) fn warns_on_credentials(&self) -> bool {
        self.environment == Environment::Browser && !self.suppress_local_credentials_warning
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfigBuilder::default().build()
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("proxy_url", &self.proxy_url)
            .field("middleware", &self.middleware)
            .field("environment", &self.environment)
            .field("urls", &self.urls)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ClientConfig`].
pub struct ClientConfigBuilder {
    credentials: CredentialsResolver,
    proxy_url: Option<String>,
    middleware: MiddlewareChain,
    response_handler: Arc<dyn ResponseHandler>,
    http: Option<Arc<dyn HttpSend>>,
    stream_client: Option<reqwest::Client>,
    environment: Environment,
    suppress_local_credentials_warning: bool,
    urls: ServiceUrls,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            credentials: credentials::env_resolver(),
            proxy_url: None,
            middleware: MiddlewareChain::new(),
            response_handler: Arc::new(DefaultResponseHandler),
            http: None,
            stream_client: None,
            environment: Environment::Server,
            suppress_local_credentials_warning: false,
            urls: ServiceUrls::default(),
        }
    }
}

impl ClientConfigBuilder {
    /// Use a fixed key.
    pub fn credentials(mut self, key: impl Into<String>) -> Self {
        self.credentials = credentials::static_resolver(key);
        self
    }

    /// Use a custom resolver, invoked once per request.
    pub fn credentials_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn() -> Option<Credentials> + Send + Sync + 'static,
    {
        self.credentials = Arc::new(resolver);
        self
    }

    /// Route every request through a relay at `url`.
    pub fn proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    /// Append a middleware stage. Stages run in insertion order, before the proxy rewrite.
    pub fn middleware(mut self, stage: impl Middleware + 'static) -> Self {
        self.middleware = self.middleware.push(stage);
        self
    }

    pub fn response_handler(mut self, handler: impl ResponseHandler + 'static) -> Self {
        self.response_handler = Arc::new(handler);
        self
    }

    /// Replace the HTTP send primitive.
    pub fn http(mut self, http: Arc<dyn HttpSend>) -> Self {
        self.http = Some(http);
        self
    }

    /// Replace the client used for server-push feeds.
    pub fn stream_client(mut self, client: reqwest::Client) -> Self {
        self.stream_client = Some(client);
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn suppress_local_credentials_warning(mut self, suppress: bool) -> Self {
        self.suppress_local_credentials_warning = suppress;
        self
    }

    pub fn urls(mut self, urls: ServiceUrls) -> Self {
        self.urls = urls;
        self
    }

    pub fn build(self) -> ClientConfig {
        let middleware = match &self.proxy_url {
            Some(url) => self.middleware.push(ProxyMiddleware::new(url.clone())),
            None => self.middleware,
        };
        let stream_client = self.stream_client.unwrap_or_default();
        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestSend::with_client(stream_client.clone())));
        ClientConfig {
            credentials: self.credentials,
            proxy_url: self.proxy_url,
            middleware,
            response_handler: self.response_handler,
            http,
            stream_client,
            environment: self.environment,
            suppress_local_credentials_warning: self.suppress_local_credentials_warning,
            urls: self.urls,
        }
    }
}
