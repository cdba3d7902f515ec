//! Progressive results of one invocation.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::endpoint::EndpointId;
use crate::error::{Error, Result};
use crate::resilience::RetryPolicy;
use crate::streaming::feed::{self, FeedItem, SseMessage};
use crate::transport::{RequestSpec, Transport};

/// Header carrying the per-invocation correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-modelrunner-correlation-id";

/// One item of a result stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// Intermediate output.
    Partial(Value),
    /// Final output; nothing follows.
    Completed(Value),
    /// Terminal failure; nothing follows.
    Error(Error),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Partial(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub retry: RetryPolicy,
    /// Fires to stop the stream early. The channel only ever cancels a child
    /// of this token, so one token can be shared by several streams.
    pub cancel: CancellationToken,
}

/// Lazy, finite and non-restartable stream of [`StreamEvent`]s.
///
/// Dropping the channel closes the underlying connection.
pub struct StreamChannel {
    correlation_id: String,
    events: BoxStream<'static, FeedItem>,
    cancel: CancellationToken,
    last_partial: Option<Value>,
    finished: bool,
}

impl StreamChannel {
    /// Open `POST {run}/{endpoint}/stream` with `input` as the body.
    pub async fn open<T>(
        transport: Arc<Transport>,
        endpoint: &EndpointId,
        input: &T,
        options: StreamOptions,
    ) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let base = transport.config().urls().run.trim_end_matches('/');
        let url = format!("{}/{}/stream", base, endpoint.full_path());
        let correlation_id = Uuid::new_v4().to_string();

        let request = RequestSpec::new(Method::POST, url)
            .with_json(input)?
            .with_header("accept", "text/event-stream")?
            .with_header(CORRELATION_ID_HEADER, &correlation_id)?;
        let request = transport.prepare(request).await?;

        // Own token: closing this stream must not stop others sharing the parent.
        let cancel = options.cancel.child_token();
        let events = feed::open(
            transport.config().stream_client(),
            request,
            options.retry,
            cancel.clone(),
        )?;
        tracing::info!(endpoint = %endpoint, correlation_id = %correlation_id, "Stream opened");

        Ok(Self {
            correlation_id,
            events,
            cancel,
            last_partial: None,
            finished: false,
        })
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Stop the stream; the next poll yields `None`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain the stream and return the final output.
    pub async fn done(mut self) -> Result<Value> {
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Partial(_) => {}
                StreamEvent::Completed(value) => return Ok(value),
                StreamEvent::Error(e) => return Err(e),
            }
        }
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Err(Error::Connection("stream ended without a result".to_string()))
        }
    }

    fn interpret(&mut self, message: SseMessage) -> StreamEvent {
        let data = parse_data(&message.data);
        match message.event.as_str() {
            "done" | "completed" => {
                let value = match data {
                    Value::Null => self.last_partial.take().unwrap_or(Value::Null),
                    value => value,
                };
                StreamEvent::Completed(value)
            }
            "error" => StreamEvent::Error(remote_error(data)),
            _ => {
                self.last_partial = Some(data.clone());
                StreamEvent::Partial(data)
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.events = stream::empty().boxed();
    }
}

impl Stream for StreamChannel {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        let event = match ready!(this.events.poll_next_unpin(cx)) {
            Some(FeedItem::Message(message)) => this.interpret(message),
            Some(FeedItem::Failed(e)) => StreamEvent::Error(e),
            None => {
                this.finish();
                return Poll::Ready(None);
            }
        };
        if event.is_terminal() {
            tracing::debug!(correlation_id = %this.correlation_id, "Stream finished");
            this.finish();
        }
        Poll::Ready(Some(event))
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for StreamChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamChannel")
            .field("correlation_id", &self.correlation_id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

fn parse_data(data: &str) -> Value {
    if data.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_string()))
}

fn remote_error(data: Value) -> Error {
    let status = data
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(500);
    let body = match &data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Error::Api {
        status,
        body,
        request_id: None,
    }
}
