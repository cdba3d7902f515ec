//! Relay protocol: validate, forward, relay back.

use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING, USER_AGENT};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::client::credentials::{self, CredentialsResolver};
use crate::error::ProtocolError;
use crate::observability::metrics;
use crate::proxy::allowlist::Allowlist;
use crate::proxy::exchange::ProxyExchange;
use crate::proxy::{DEFAULT_PROXY_ROUTE, HEADER_PREFIX, TARGET_URL_HEADER};
use crate::transport::{HttpSend, RequestSpec};

/// Request id header propagated upstream.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Relay settings; part of the server configuration and hot-reloadable.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Route the relay is mounted on.
    pub route: String,

    /// Domains (and their subdomains) the relay may call.
    pub allowed_domains: Vec<String>,

    /// Explicit key; takes precedence over the environment.
    #[serde(skip_serializing)]
    pub credentials: Option<String>,

    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            route: DEFAULT_PROXY_ROUTE.to_string(),
            allowed_domains: vec!["modelrunner.ai".to_string(), "modelrunner.run".to_string()],
            credentials: None,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl std::fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySettings")
            .field("route", &self.route)
            .field("allowed_domains", &self.allowed_domains)
            .field("credentials", &self.credentials.as_ref().map(|_| "***"))
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

/// Framework-agnostic relay handler.
pub struct ProxyHandler {
    allowlist: Allowlist,
    credentials: CredentialsResolver,
    http: Arc<dyn HttpSend>,
}

impl ProxyHandler {
    pub fn new(settings: &ProxySettings, http: Arc<dyn HttpSend>) -> Self {
        let credentials = match &settings.credentials {
            Some(key) => credentials::static_resolver(key.clone()),
            None => credentials::env_resolver(),
        };
        Self {
            allowlist: Allowlist::new(&settings.allowed_domains),
            credentials,
            http,
        }
    }

    /// Replace the credential source.
    pub fn with_credentials(mut self, resolver: CredentialsResolver) -> Self {
        self.credentials = resolver;
        self
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// Serve one exchange. Always leaves a response on it; returns its status.
    pub async fn handle<E>(&self, exchange: &mut E) -> u16
    where
        E: ProxyExchange + ?Sized,
    {
        let started = Instant::now();
        let method = exchange.method();

        let status = match self.relay(exchange).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(method = %method, reason = e.reason(), error = %e, "Relay request rejected");
                metrics::record_rejection(e.reason());
                let body = json!({ "error": e.to_string() }).to_string();
                exchange.set_header(CONTENT_TYPE.as_str(), "application/json");
                exchange.respond(e.status_code(), body.into_bytes());
                e.status_code()
            }
        };

        metrics::record_request(method.as_str(), status, started);
        status
    }

    async fn relay<E>(&self, exchange: &mut E) -> Result<u16, ProtocolError>
    where
        E: ProxyExchange + ?Sized,
    {
        let target = exchange
            .header(TARGET_URL_HEADER)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProtocolError::MissingTargetUrl(TARGET_URL_HEADER))?;
        let url = Url::parse(&target).map_err(|_| ProtocolError::DisallowedTarget(target.clone()))?;
        if !self.allowlist.permits(&url) {
            return Err(ProtocolError::DisallowedTarget(
                url.host_str().unwrap_or(target.as_str()).to_string(),
            ));
        }

        let credentials = (self.credentials)().ok_or(ProtocolError::MissingCredentials)?;

        let method = exchange.method();
        let mut request = RequestSpec::new(method.clone(), url.as_str());
        for (name, value) in exchange.headers() {
            let forwarded = name.starts_with(HEADER_PREFIX) && name != TARGET_URL_HEADER;
            if forwarded || name == REQUEST_ID_HEADER {
                set(&mut request, &name, &value)?;
            }
        }

        let authorization = exchange
            .header(AUTHORIZATION.as_str())
            .unwrap_or_else(|| credentials.authorization());
        set(&mut request, AUTHORIZATION.as_str(), &authorization)?;
        set(&mut request, ACCEPT.as_str(), "application/json")?;
        set(&mut request, CONTENT_TYPE.as_str(), "application/json")?;
        let agent = format!("modelrunner-proxy/{}", exchange.framework());
        set(&mut request, USER_AGENT.as_str(), &agent)?;

        if method != Method::GET && method != Method::HEAD {
            request.body = exchange.body().await?;
        }

        tracing::debug!(method = %method, target = %url, "Relaying request");
        let response = self
            .http
            .send(request)
            .await
            .map_err(|e| ProtocolError::Upstream(e.to_string()))?;

        for (name, value) in response.headers.iter() {
            if name == CONTENT_LENGTH || name == CONTENT_ENCODING || name == TRANSFER_ENCODING {
                continue;
            }
            if let Ok(value) = value.to_str() {
                exchange.set_header(name.as_str(), value);
            }
        }
        exchange.respond(response.status, response.body);
        tracing::debug!(method = %method, target = %url, status = response.status, "Relayed response");
        Ok(response.status)
    }
}

fn set(request: &mut RequestSpec, name: &str, value: &str) -> Result<(), ProtocolError> {
    request
        .set_header(name, value)
        .map_err(|e| ProtocolError::InvalidBody(e.to_string()))
}

impl std::fmt::Debug for ProxyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHandler")
            .field("allowlist", &self.allowlist)
            .finish_non_exhaustive()
    }
}
