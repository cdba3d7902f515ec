//! Scripted HTTP primitive for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::transport::http::{HttpResponse, HttpSend};
use crate::transport::request::RequestSpec;

/// Replays queued responses in order and records every request.
#[derive(Default)]
pub(crate) struct ScriptedSend {
    responses: Mutex<VecDeque<HttpResponse>>,
    seen: Mutex<Vec<RequestSpec>>,
}

impl ScriptedSend {
    pub(crate) fn new(responses: impl IntoIterator<Item = HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn seen(&self) -> Vec<RequestSpec> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpSend for ScriptedSend {
    async fn send(&self, request: RequestSpec) -> Result<HttpResponse> {
        self.seen.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Network("script exhausted".into()))
    }
}

pub(crate) fn json(status: u16, body: Value) -> HttpResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    HttpResponse {
        status,
        headers,
        body: body.to_string().into_bytes(),
    }
}
