//! Queue client and per-job tracker.
//!
//! # Responsibilities
//! - Submit inputs to an endpoint's queue
//! - Poll status (optionally with logs), cancel, fetch results
//! - Keep observed status monotone per job (`JobTracker`)

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::endpoint::EndpointId;
use crate::error::{Error, Result};
use crate::queue::types::{
    JobHandle, JobStatus, LogEntry, QueueStatus, SubmitOptions, SubmitResponse,
};
use crate::transport::{Payload, RequestSpec, Transport};

/// Header carrying the queue priority.
pub const PRIORITY_HEADER: &str = "x-modelrunner-queue-priority";
/// Header carrying the runner hint.
pub const HINT_HEADER: &str = "x-modelrunner-runner-hint";
/// Header carrying the start timeout in seconds.
pub const START_TIMEOUT_HEADER: &str = "x-modelrunner-request-timeout";
/// Query parameter carrying the webhook URL.
pub const WEBHOOK_PARAM: &str = "mr_webhook";

/// Stateless handle on the queue API of one client.
#[derive(Clone)]
pub struct Queue {
    transport: Arc<Transport>,
    base_url: String,
}

impl Queue {
    pub fn new(transport: Arc<Transport>) -> Self {
        let base_url = transport.config().urls().queue.trim_end_matches('/').to_string();
        Self {
            transport,
            base_url,
        }
    }

    /// Submit `input` for asynchronous execution.
    pub async fn submit<T>(
        &self,
        endpoint: &EndpointId,
        input: &T,
        options: &SubmitOptions,
    ) -> Result<JobHandle>
    where
        T: Serialize + ?Sized,
    {
        let mut url = self.url(&endpoint.full_path())?;
        if let Some(webhook) = &options.webhook_url {
            url.query_pairs_mut().append_pair(WEBHOOK_PARAM, webhook);
        }

        let mut request = RequestSpec::new(Method::POST, url.as_str()).with_json(input)?;
        if let Some(priority) = options.priority {
            request.set_header(PRIORITY_HEADER, priority.as_str())?;
        }
        if let Some(hint) = &options.hint {
            request.set_header(HINT_HEADER, hint)?;
        }
        if let Some(timeout) = options.start_timeout {
            request.set_header(START_TIMEOUT_HEADER, &timeout.as_secs().to_string())?;
        }

        let submitted: SubmitResponse = self.transport.execute(request).await?.deserialize()?;
        tracing::info!(
            endpoint = %endpoint,
            request_id = %submitted.request_id,
            queue_position = ?submitted.queue_position,
            "Job submitted"
        );

        Ok(JobHandle {
            request_id: submitted.request_id,
            endpoint: endpoint.clone(),
            status: JobStatus::Submitted,
            queue_position: submitted.queue_position,
            status_url: submitted.status_url,
            response_url: submitted.response_url,
            cancel_url: submitted.cancel_url,
        })
    }

    /// Fetch the current status snapshot.
    ///
    /// Returned logs are cumulative; consumers diff against what they
    /// already delivered (see [`LogCursor`]).
    pub async fn status(
        &self,
        endpoint: &EndpointId,
        request_id: &str,
        logs: bool,
    ) -> Result<QueueStatus> {
        let mut url = self.request_url(endpoint, request_id, Some("status"))?;
        url.query_pairs_mut()
            .append_pair("logs", if logs { "1" } else { "0" });

        let status: QueueStatus = self
            .transport
            .execute(RequestSpec::new(Method::GET, url.as_str()))
            .await?
            .deserialize()?;
        tracing::debug!(
            request_id = %request_id,
            status = %status.status,
            logs = status.logs.len(),
            "Status polled"
        );
        Ok(status)
    }

    /// Ask the service to cancel. Best effort: the remote job may still finish.
    pub async fn cancel(&self, endpoint: &EndpointId, request_id: &str) -> Result<()> {
        let url = self.request_url(endpoint, request_id, Some("cancel"))?;
        self.transport
            .execute(RequestSpec::new(Method::PUT, url.as_str()))
            .await?;
        tracing::info!(request_id = %request_id, "Cancellation acknowledged");
        Ok(())
    }

    /// Fetch the result payload of a completed job.
    pub async fn result(&self, endpoint: &EndpointId, request_id: &str) -> Result<Payload> {
        let url = self.request_url(endpoint, request_id, None)?;
        self.transport
            .execute(RequestSpec::new(Method::GET, url.as_str()))
            .await
    }

    /// Start tracking a submitted job.
    pub fn track(&self, handle: JobHandle) -> JobTracker {
        JobTracker {
            queue: self.clone(),
            handle,
        }
    }

    /// URL of the server-push status feed of one job.
    pub fn status_stream_url(&self, endpoint: &EndpointId, request_id: &str, logs: bool) -> Result<Url> {
        let mut url = self.request_url(endpoint, request_id, Some("status/stream"))?;
        url.query_pairs_mut()
            .append_pair("logs", if logs { "1" } else { "0" });
        Ok(url)
    }

    pub(crate) fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    fn url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}/{}", self.base_url, path))
            .map_err(|e| Error::IllegalState(format!("invalid queue url: {}", e)))
    }

    fn request_url(&self, endpoint: &EndpointId, request_id: &str, suffix: Option<&str>) -> Result<Url> {
        let mut path = format!("{}/requests/{}", endpoint.app_path(), request_id);
        if let Some(suffix) = suffix {
            path.push('/');
            path.push_str(suffix);
        }
        self.url(&path)
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").field("base_url", &self.base_url).finish()
    }
}

/// Tracks one job: holds only its handle and last observed status.
#[derive(Debug)]
pub struct JobTracker {
    queue: Queue,
    handle: JobHandle,
}

impl JobTracker {
    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn request_id(&self) -> &str {
        &self.handle.request_id
    }

    pub fn status(&self) -> JobStatus {
        self.handle.status
    }

    /// Poll once. The returned snapshot's status never regresses below a
    /// previously observed one.
    pub async fn poll(&mut self, logs: bool) -> Result<QueueStatus> {
        if self.handle.status == JobStatus::Cancelled {
            return Err(Error::Cancelled);
        }
        let snapshot = self
            .queue
            .status(&self.handle.endpoint, &self.handle.request_id, logs)
            .await?;
        Ok(self.observe(snapshot))
    }

    /// Fold a snapshot (from polling or a pushed feed) into the tracker.
    pub fn observe(&mut self, mut snapshot: QueueStatus) -> QueueStatus {
        let current = self.handle.status;
        if current.can_advance_to(snapshot.status) {
            tracing::debug!(
                request_id = %self.handle.request_id,
                from = %current,
                to = %snapshot.status,
                "Job status advanced"
            );
            self.handle.status = snapshot.status;
        } else if current != snapshot.status {
            tracing::debug!(
                request_id = %self.handle.request_id,
                current = %current,
                reported = %snapshot.status,
                "Ignoring non-monotone status report"
            );
            snapshot.status = current;
        }
        if snapshot.queue_position.is_some() {
            self.handle.queue_position = snapshot.queue_position;
        }
        snapshot
    }

    /// Request cancellation; after acknowledgement no poll delivers progress.
    pub async fn cancel(&mut self) -> Result<()> {
        if self.handle.status.is_terminal() {
            return Err(Error::IllegalState(format!(
                "job {} already {}",
                self.handle.request_id, self.handle.status
            )));
        }
        self.queue
            .cancel(&self.handle.endpoint, &self.handle.request_id)
            .await?;
        self.handle.status = JobStatus::Cancelled;
        Ok(())
    }

    /// Fetch the result; only valid once COMPLETED has been observed.
    pub async fn result(&self) -> Result<Payload> {
        if self.handle.status != JobStatus::Completed {
            return Err(Error::IllegalState(format!(
                "result requested for job {} in state {}",
                self.handle.request_id, self.handle.status
            )));
        }
        self.queue
            .result(&self.handle.endpoint, &self.handle.request_id)
            .await
    }
}

/// Remembers how many cumulative log entries were already delivered.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCursor {
    delivered: usize,
}

impl LogCursor {
    /// Entries not delivered yet, in arrival order. A shorter list than
    /// already delivered yields nothing; delivered lines are never retracted.
    pub fn take_new<'a>(&mut self, logs: &'a [LogEntry]) -> &'a [LogEntry] {
        if logs.len() <= self.delivered {
            return &[];
        }
        let fresh = &logs[self.delivered..];
        self.delivered = logs.len();
        fresh
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }
}
