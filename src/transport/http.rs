//! Pluggable HTTP send primitive.
//!
//! `(method, url, headers, body) → (status, headers, body)`. The production
//! implementation wraps `reqwest`; tests substitute scripted responders.

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::error::Result;
use crate::transport::request::RequestSpec;

/// A fully buffered HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Content type header, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase())
    }
}

/// Sends one request and returns the buffered response.
///
/// Implementations return `Error::Network` for transport failures and must
/// never interpret the status code; classification belongs to the caller.
#[async_trait]
pub trait HttpSend: Send + Sync {
    async fn send(&self, request: RequestSpec) -> Result<HttpResponse>;
}

/// `reqwest`-backed sender.
#[derive(Debug, Clone)]
pub struct ReqwestSend {
    client: reqwest::Client,
}

impl ReqwestSend {
    /// Sender with reqwest defaults.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Wrap an existing client (shared pools, custom TLS).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// The underlying client, for transports that need streaming bodies.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Default for ReqwestSend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpSend for ReqwestSend {
    async fn send(&self, request: RequestSpec) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
