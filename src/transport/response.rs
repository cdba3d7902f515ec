//! Response classification.
//!
//! ```text
//! 2xx                          → Payload (by content type)
//! 4xx + {"detail": [{loc,msg,type}]} → Error::Validation
//! other non-2xx                → Error::Api
//! ```

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result, ValidationIssue};
use crate::transport::http::HttpResponse;

/// Decoded success body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    /// JSON view of the payload. Text that is not JSON becomes a JSON string.
    pub fn into_json(self) -> Result<Value> {
        match self {
            Payload::Json(v) => Ok(v),
            Payload::Text(t) => Ok(serde_json::from_str(&t).unwrap_or(Value::String(t))),
            Payload::Bytes(b) => serde_json::from_slice(&b).map_err(Error::from),
        }
    }

    /// Deserialize into a caller type.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.into_json()?)?)
    }
}

/// Strategy turning a raw response into a payload or a classified error.
pub trait ResponseHandler: Send + Sync {
    fn handle(&self, response: HttpResponse) -> Result<Payload>;
}

/// Content-type driven handler used unless the caller supplies another.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResponseHandler;

impl ResponseHandler for DefaultResponseHandler {
    fn handle(&self, response: HttpResponse) -> Result<Payload> {
        if !response.is_success() {
            return Err(classify_error(&response));
        }
        decode_payload(response)
    }
}

/// Decode a 2xx body according to its content type.
pub fn decode_payload(response: HttpResponse) -> Result<Payload> {
    if response.body.is_empty() {
        return Ok(Payload::Json(Value::Null));
    }
    match response.content_type() {
        Some(ct) if ct.contains("json") => Ok(Payload::Json(serde_json::from_slice(&response.body)?)),
        Some(ct) if ct.starts_with("text/") => Ok(Payload::Text(
            String::from_utf8_lossy(&response.body).into_owned(),
        )),
        Some(_) => Ok(Payload::Bytes(response.body)),
        None => Ok(serde_json::from_slice(&response.body)
            .map(Payload::Json)
            .unwrap_or(Payload::Bytes(response.body))),
    }
}

/// Map a non-2xx response onto the error taxonomy.
pub fn classify_error(response: &HttpResponse) -> Error {
    let body = String::from_utf8_lossy(&response.body).into_owned();
    let request_id = response
        .headers
        .get("x-modelrunner-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if (400..500).contains(&response.status) {
        if let Some(issues) = validation_issues(&response.body) {
            return Error::Validation {
                status: response.status,
                issues,
                body,
            };
        }
    }

    Error::Api {
        status: response.status,
        body,
        request_id,
    }
}

fn validation_issues(body: &[u8]) -> Option<Vec<ValidationIssue>> {
    let parsed: Value = serde_json::from_slice(body).ok()?;
    let detail = parsed.get("detail")?.as_array()?;

    let issues: Vec<ValidationIssue> = detail
        .iter()
        .filter_map(|item| {
            let message = item.get("msg")?.as_str()?.to_string();
            let field = item
                .get("loc")
                .and_then(Value::as_array)
                .map(|loc| {
                    loc.iter()
                        .map(|seg| match seg {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(".")
                })
                .unwrap_or_default();
            let kind = item
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some(ValidationIssue {
                field,
                message,
                kind,
            })
        })
        .collect();

    if issues.is_empty() {
        None
    } else {
        Some(issues)
    }
}
