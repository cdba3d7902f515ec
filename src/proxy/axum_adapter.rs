//! `ProxyExchange` for axum.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::Method;

use crate::error::ProtocolError;
use crate::proxy::exchange::ProxyExchange;

/// Wraps one axum request and accumulates the relay's response.
pub struct AxumExchange {
    parts: Parts,
    body: Option<Body>,
    body_limit: usize,
    status: StatusCode,
    response_headers: HeaderMap,
    response_body: Vec<u8>,
}

impl AxumExchange {
    pub fn new(request: Request<Body>, body_limit: usize) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            parts,
            body: Some(body),
            body_limit,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            response_headers: HeaderMap::new(),
            response_body: Vec::new(),
        }
    }

    pub fn into_response(self) -> Response {
        let mut response = (self.status, self.response_body).into_response();
        response.headers_mut().extend(self.response_headers);
        response
    }
}

#[async_trait]
impl ProxyExchange for AxumExchange {
    fn framework(&self) -> &str {
        "axum"
    }

    fn method(&self) -> Method {
        self.parts.method.clone()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect()
    }

    async fn body(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let Some(body) = self.body.take() else {
            return Ok(None);
        };
        let bytes = axum::body::to_bytes(body, self.body_limit)
            .await
            .map_err(|e| ProtocolError::InvalidBody(e.to_string()))?;
        Ok((!bytes.is_empty()).then(|| bytes.to_vec()))
    }

    fn set_header(&mut self, name: &str, value: &str) {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.response_headers.append(name, value);
            }
            _ => tracing::debug!(header = name, "Skipping unrepresentable response header"),
        }
    }

    fn respond(&mut self, status: u16, body: Vec<u8>) {
        self.status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
        self.response_body = body;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_request_and_builds_response() {
        let request = Request::builder()
            .method("POST")
            .header("x-modelrunner-target-url", "https://modelrunner.run/a/b")
            .body(Body::from("{\"x\":1}"))
            .unwrap();
        let mut exchange = AxumExchange::new(request, 1024);

        assert_eq!(exchange.method(), Method::POST);
        assert_eq!(
            exchange.header("x-modelrunner-target-url").as_deref(),
            Some("https://modelrunner.run/a/b")
        );
        assert_eq!(exchange.body().await.unwrap(), Some(b"{\"x\":1}".to_vec()));
        assert_eq!(exchange.body().await.unwrap(), None);

        exchange.set_header("set-cookie", "a=1");
        exchange.set_header("set-cookie", "b=2");
        exchange.respond(201, b"done".to_vec());
        let response = exchange.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get_all("set-cookie").iter().count(), 2);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let request = Request::builder()
            .method("POST")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let mut exchange = AxumExchange::new(request, 16);
        let err = exchange.body().await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
