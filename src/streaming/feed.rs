//! Server-sent event feed with bounded reconnection.
//!
//! Wraps `reqwest_eventsource::EventSource`, which already replays the
//! request and sends `Last-Event-ID` on reconnect. This layer decides which
//! failures are worth a retry and turns the source into a plain stream of
//! [`FeedItem`]s.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest_eventsource::{Error as SourceError, Event, EventSource};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::resilience::RetryPolicy;
use crate::transport::RequestSpec;

/// One message received on the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Event name; `message` when the server sent none.
    pub event: String,
    pub data: String,
    pub id: String,
}

#[derive(Debug)]
pub enum FeedItem {
    Message(SseMessage),
    /// The feed gave up; nothing follows.
    Failed(Error),
}

/// Retry decision plugged into the event source.
struct ReconnectPolicy {
    policy: RetryPolicy,
    attempts: Arc<AtomicU32>,
    server_delay: Option<Duration>,
}

impl reqwest_eventsource::retry::RetryPolicy for ReconnectPolicy {
    fn retry(&self, error: &SourceError, _last_retry: Option<(usize, Duration)>) -> Option<Duration> {
        if is_permanent(error) {
            return None;
        }
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.policy.allows(attempt) {
            return None;
        }
        let delay = self.server_delay.unwrap_or_else(|| self.policy.delay(attempt));
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Reconnecting feed");
        Some(delay)
    }

    fn set_reconnection_time(&mut self, duration: Duration) {
        self.server_delay = Some(duration);
    }
}

/// Client errors and wrong content types will not improve with a retry.
fn is_permanent(error: &SourceError) -> bool {
    match error {
        SourceError::InvalidStatusCode(status, _) => status.is_client_error(),
        SourceError::InvalidContentType(_, _) | SourceError::InvalidLastEventId(_) => true,
        _ => false,
    }
}

struct FeedState {
    source: EventSource,
    cancel: CancellationToken,
    attempts: Arc<AtomicU32>,
    last_error: Option<Error>,
    done: bool,
}

/// Open a feed for an already prepared request.
///
/// The stream ends without an item when `cancel` fires, and with a single
/// [`FeedItem::Failed`] once the retry budget is spent.
pub fn open(
    client: &reqwest::Client,
    request: RequestSpec,
    retry: RetryPolicy,
    cancel: CancellationToken,
) -> Result<BoxStream<'static, FeedItem>> {
    let mut builder = client
        .request(request.method, &request.url)
        .headers(request.headers);
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let mut source = EventSource::new(builder)
        .map_err(|e| Error::Connection(format!("request cannot be replayed: {}", e)))?;
    let attempts = Arc::new(AtomicU32::new(0));
    source.set_retry_policy(Box::new(ReconnectPolicy {
        policy: retry,
        attempts: attempts.clone(),
        server_delay: None,
    }));

    let state = FeedState {
        source,
        cancel,
        attempts,
        last_error: None,
        done: false,
    };

    Ok(stream::unfold(state, next_item).boxed())
}

async fn next_item(mut state: FeedState) -> Option<(FeedItem, FeedState)> {
    if state.done {
        return None;
    }
    loop {
        let event = tokio::select! {
            biased;
            _ = state.cancel.cancelled() => {
                state.source.close();
                return None;
            }
            event = state.source.next() => event,
        };

        match event {
            Some(Ok(Event::Open)) => {
                tracing::debug!("Feed connected");
            }
            Some(Ok(Event::Message(message))) => {
                state.attempts.store(0, Ordering::Relaxed);
                let item = FeedItem::Message(SseMessage {
                    event: message.event,
                    data: message.data,
                    id: message.id,
                });
                return Some((item, state));
            }
            Some(Err(SourceError::InvalidStatusCode(status, response))) => {
                tracing::warn!(status = status.as_u16(), "Feed rejected");
                let request_id = response
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let body = response.text().await.unwrap_or_default();
                state.last_error = Some(Error::Api {
                    status: status.as_u16(),
                    body,
                    request_id,
                });
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Feed interrupted");
                state.last_error = Some(Error::Connection(e.to_string()));
            }
            None => {
                state.done = true;
                let error = state
                    .last_error
                    .take()
                    .unwrap_or_else(|| Error::Connection("feed closed".to_string()));
                return Some((FeedItem::Failed(error), state));
            }
        }
    }
}
