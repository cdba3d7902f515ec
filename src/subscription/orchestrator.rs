//! Drives one job from submission to a terminal state.
//!
//! # Responsibilities
//! - Submit, then follow status by polling or by the pushed status feed
//! - Deliver status and log events in order, with exactly one terminal event
//! - Honour cancellation and the overall deadline by cancelling the job

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::endpoint::EndpointId;
use crate::error::{Error, Result};
use crate::queue::{JobStatus, JobTracker, LogCursor, Queue, QueueStatus};
use crate::streaming::feed::{self, FeedItem};
use crate::subscription::events::{
    SubscribeMode, SubscribeOptions, SubscriptionEvent, SubscriptionResult,
};
use crate::transport::RequestSpec;

/// Submit `input` and follow the job until it finishes.
///
/// `on_event` is invoked inline, in order. Once cancellation or the deadline
/// is observed no further events are delivered.
pub async fn subscribe<T, F>(
    queue: &Queue,
    endpoint: &EndpointId,
    input: &T,
    options: SubscribeOptions,
    mut on_event: F,
) -> Result<SubscriptionResult>
where
    T: Serialize + ?Sized,
    F: FnMut(SubscriptionEvent) + Send,
{
    let interrupt = Interrupt::new(&options);

    let handle = tokio::select! {
        biased;
        stop = interrupt.wait() => return Err(stop),
        submitted = queue.submit(endpoint, input, &options.submit) => submitted?,
    };
    let request_id = handle.request_id.clone();
    on_event(SubscriptionEvent::Enqueued {
        request_id: request_id.clone(),
    });

    let mut tracker = queue.track(handle);
    let mut progress = Progress::new(request_id.clone());

    let outcome = match options.mode {
        SubscribeMode::Polling => {
            poll_until_done(&mut tracker, &mut progress, &options, &interrupt, &mut on_event).await?
        }
        SubscribeMode::Streaming => {
            follow_feed(queue, &mut tracker, &mut progress, &options, &interrupt, &mut on_event)
                .await?
        }
    };

    match outcome {
        Outcome::Completed => {
            let data = tokio::select! {
                biased;
                stop = interrupt.wait() => return Err(stop),
                data = tracker.result() => data?,
            };
            tracing::info!(request_id = %request_id, "Subscription completed");
            Ok(SubscriptionResult {
                request_id,
                status: JobStatus::Completed,
                data,
            })
        }
        Outcome::Failed(detail) => {
            tracing::warn!(request_id = %request_id, "Job failed");
            Err(Error::Api {
                status: 500,
                body: detail.map(|d| d.to_string()).unwrap_or_default(),
                request_id: Some(request_id),
            })
        }
        Outcome::CancelledRemotely => {
            tracing::warn!(request_id = %request_id, "Job cancelled by the service");
            Err(Error::Cancelled)
        }
    }
}

async fn poll_until_done<F>(
    tracker: &mut JobTracker,
    progress: &mut Progress,
    options: &SubscribeOptions,
    interrupt: &Interrupt,
    on_event: &mut F,
) -> Result<Outcome>
where
    F: FnMut(SubscriptionEvent) + Send,
{
    let mut polls = 0u32;
    loop {
        let delay = options.polling.delay(polls);
        polls = polls.saturating_add(1);

        tokio::select! {
            biased;
            stop = interrupt.wait() => return abort(tracker, stop).await,
            _ = tokio::time::sleep(delay) => {}
        }

        let snapshot = tokio::select! {
            biased;
            stop = interrupt.wait() => return abort(tracker, stop).await,
            snapshot = tracker.poll(options.logs) => snapshot?,
        };

        if let Some(outcome) = progress.deliver(snapshot, on_event) {
            return Ok(outcome);
        }
    }
}

async fn follow_feed<F>(
    queue: &Queue,
    tracker: &mut JobTracker,
    progress: &mut Progress,
    options: &SubscribeOptions,
    interrupt: &Interrupt,
    on_event: &mut F,
) -> Result<Outcome>
where
    F: FnMut(SubscriptionEvent) + Send,
{
    let url = queue.status_stream_url(&tracker.handle().endpoint, tracker.request_id(), options.logs)?;
    let request = RequestSpec::new(Method::GET, url.as_str()).with_header("accept", "text/event-stream")?;
    let request = queue.transport().prepare(request).await?;
    let mut updates = feed::open(
        queue.transport().config().stream_client(),
        request,
        options.retry,
        options.cancel.child_token(),
    )?;

    loop {
        let item = tokio::select! {
            biased;
            stop = interrupt.wait() => return abort(tracker, stop).await,
            item = updates.next() => item,
        };
        match item {
            Some(FeedItem::Message(message)) => {
                if message.data.trim().is_empty() {
                    continue;
                }
                let snapshot: QueueStatus = serde_json::from_str(&message.data)?;
                let snapshot = tracker.observe(snapshot);
                if let Some(outcome) = progress.deliver(snapshot, on_event) {
                    return Ok(outcome);
                }
            }
            Some(FeedItem::Failed(e)) => return Err(e),
            None => return Err(Error::Connection("status feed closed".to_string())),
        }
    }
}

/// Best-effort remote cancellation, then report why we stopped.
async fn abort(tracker: &mut JobTracker, stop: Error) -> Result<Outcome> {
    if !tracker.status().is_terminal() {
        if let Err(e) = tracker.cancel().await {
            tracing::warn!(request_id = %tracker.request_id(), error = %e, "Cancel request failed");
        }
    }
    tracing::info!(request_id = %tracker.request_id(), reason = %stop, "Subscription stopped");
    Err(stop)
}

enum Outcome {
    Completed,
    Failed(Option<Value>),
    CancelledRemotely,
}

/// Resolves when the caller cancels or the deadline passes.
struct Interrupt {
    cancel: tokio_util::sync::CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl Interrupt {
    fn new(options: &SubscribeOptions) -> Self {
        Self {
            cancel: options.cancel.clone(),
            deadline: options.timeout.map(|t| (Instant::now() + t, t)),
        }
    }

    async fn wait(&self) -> Error {
        match self.deadline {
            Some((at, timeout)) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Error::Cancelled,
                _ = tokio::time::sleep_until(at) => Error::Timeout(timeout),
            },
            None => {
                self.cancel.cancelled().await;
                Error::Cancelled
            }
        }
    }
}

/// Turns successive snapshots into events.
struct Progress {
    request_id: String,
    last_status: Option<JobStatus>,
    last_position: Option<u64>,
    logs: LogCursor,
}

impl Progress {
    fn new(request_id: String) -> Self {
        Self {
            request_id,
            last_status: None,
            last_position: None,
            logs: LogCursor::default(),
        }
    }

    fn deliver<F>(&mut self, snapshot: QueueStatus, on_event: &mut F) -> Option<Outcome>
    where
        F: FnMut(SubscriptionEvent),
    {
        let status = snapshot.status;
        let moved = self.last_status != Some(status) || self.last_position != snapshot.queue_position;
        if moved && !status.is_terminal() {
            on_event(SubscriptionEvent::StatusChanged {
                request_id: self.request_id.clone(),
                status,
                queue_position: snapshot.queue_position,
            });
        }
        self.last_status = Some(status);
        self.last_position = snapshot.queue_position;

        let fresh = self.logs.take_new(&snapshot.logs);
        if !fresh.is_empty() {
            on_event(SubscriptionEvent::LogAppended {
                request_id: self.request_id.clone(),
                entries: fresh.to_vec(),
            });
        }

        match status {
            JobStatus::Completed => {
                on_event(SubscriptionEvent::Completed {
                    request_id: self.request_id.clone(),
                });
                Some(Outcome::Completed)
            }
            JobStatus::Failed | JobStatus::Cancelled => {
                on_event(SubscriptionEvent::Failed {
                    request_id: self.request_id.clone(),
                    detail: snapshot.error.clone(),
                });
                if status == JobStatus::Failed {
                    Some(Outcome::Failed(snapshot.error))
                } else {
                    Some(Outcome::CancelledRemotely)
                }
            }
            _ => None,
        }
    }
}
