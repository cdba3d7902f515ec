//! Where a realtime connection goes, resolved before every connect.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use url::Url;

use std::sync::Arc;

use crate::endpoint::EndpointId;
use crate::error::{Error, Result};
use crate::transport::{Payload, RequestSpec, Transport};

/// Query parameter carrying the short-lived token.
pub const TOKEN_PARAM: &str = "mr_jwt_token";
/// Lifetime requested for realtime tokens, in seconds.
pub const TOKEN_EXPIRATION_SECS: u64 = 120;

#[async_trait]
pub trait UrlSource: Send + Sync {
    async fn url(&self) -> Result<String>;
}

/// A fixed URL.
#[derive(Debug, Clone)]
pub struct StaticUrl(pub String);

#[async_trait]
impl UrlSource for StaticUrl {
    async fn url(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Endpoint URL with a freshly minted token appended.
#[derive(Debug, Clone)]
pub struct TokenUrl {
    transport: Arc<Transport>,
    endpoint: EndpointId,
}

impl TokenUrl {
    pub fn new(transport: Arc<Transport>, endpoint: EndpointId) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    async fn fetch_token(&self) -> Result<String> {
        let rest = self.transport.config().urls().rest.trim_end_matches('/');
        let request = RequestSpec::new(Method::POST, format!("{}/tokens/", rest)).with_json(&json!({
            "allowed_apps": [self.endpoint.alias],
            "token_expiration": TOKEN_EXPIRATION_SECS,
        }))?;

        let token = match self.transport.execute(request).await? {
            Payload::Json(Value::String(token)) => token,
            Payload::Json(Value::Object(body)) => body
                .get("token")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| Error::Decode("token response without a token".to_string()))?,
            Payload::Text(token) => token.trim().trim_matches('"').to_string(),
            other => return Err(Error::Decode(format!("unexpected token response: {:?}", other))),
        };
        tracing::debug!(endpoint = %self.endpoint, "Realtime token issued");
        Ok(token)
    }
}

#[async_trait]
impl UrlSource for TokenUrl {
    async fn url(&self) -> Result<String> {
        let base = self.transport.config().urls().realtime.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}/{}/realtime", base, self.endpoint.app_path()))
            .map_err(|e| Error::IllegalState(format!("invalid realtime url: {}", e)))?;

        let config = self.transport.config();
        if config.proxy_url().is_some() || config.resolve_credentials().is_some() {
            let token = self.fetch_token().await?;
            url.query_pairs_mut().append_pair(TOKEN_PARAM, &token);
        }
        Ok(url.into())
    }
}
