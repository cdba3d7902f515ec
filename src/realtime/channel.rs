//! Persistent bidirectional channel with buffering, throttling and reconnect.
//!
//! # Responsibilities
//! - Own one background driver task per channel
//! - Buffer sends while connecting and flush them in order once open
//! - Coalesce sends within a throttle window ("latest wins")
//! - Reconnect after unexpected closure within the retry budget

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, HandlerError, Result};
use crate::realtime::config::{OverflowPolicy, RealtimeConfig};
use crate::realtime::connection::{Connection, Connector, Frame};
use crate::realtime::url::UrlSource;

/// Message type the service uses to report errors in-band.
pub const ERROR_MESSAGE_TYPE: &str = "x-modelrunner-error";

/// Lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

pub type MessageHandler = Arc<dyn Fn(Value) -> std::result::Result<(), HandlerError> + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(Error) + Send + Sync>;

/// Callbacks invoked from the driver task.
#[derive(Clone)]
pub struct RealtimeHandlers {
    pub on_message: MessageHandler,
    pub on_error: ErrorHook,
}

impl RealtimeHandlers {
    pub fn new<M>(on_message: M) -> Self
    where
        M: Fn(Value) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            on_message: Arc::new(on_message),
            on_error: Arc::new(|e| tracing::warn!(error = %e, "Realtime error")),
        }
    }

    pub fn on_error<E>(mut self, hook: E) -> Self
    where
        E: Fn(Error) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(hook);
        self
    }
}

struct Outbox {
    queue: VecDeque<Frame>,
    /// Pending throttled send; replaced by every newer one.
    latest: Option<Frame>,
}

struct Shared {
    outbox: Mutex<Outbox>,
    state: watch::Sender<ConnectionState>,
    /// Driver wake-up: new work queued.
    wake: Notify,
    /// Sender wake-up: buffer space freed or channel closed.
    space: Notify,
    config: RealtimeConfig,
}

impl Shared {
    fn outbox(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_replace(next);
        tracing::debug!(state = ?next, "Realtime state changed");
    }

    fn pop_queued(&self) -> Option<Frame> {
        let frame = self.outbox().queue.pop_front();
        if frame.is_some() {
            self.space.notify_waiters();
        }
        frame
    }
}

/// Handle on a realtime connection. Dropping it closes the connection.
pub struct RealtimeChannel {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    driver: Option<JoinHandle<()>>,
}

impl RealtimeChannel {
    /// Start connecting in the background.
    pub fn connect(
        connector: Arc<dyn Connector>,
        url: Arc<dyn UrlSource>,
        config: RealtimeConfig,
        handlers: RealtimeHandlers,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let shared = Arc::new(Shared {
            outbox: Mutex::new(Outbox {
                queue: VecDeque::with_capacity(config.buffer_capacity),
                latest: None,
            }),
            state,
            wake: Notify::new(),
            space: Notify::new(),
            config,
        });
        let shutdown = CancellationToken::new();

        let driver = Driver {
            shared: shared.clone(),
            connector,
            url,
            handlers,
            shutdown: shutdown.clone(),
            next_send: Instant::now(),
        };
        let driver = tokio::spawn(driver.run());

        Self {
            shared,
            shutdown,
            driver: Some(driver),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Serialize `message` as JSON and send it.
    pub async fn send(&self, message: &Value) -> Result<()> {
        self.send_frame(Frame::Text(message.to_string())).await
    }

    /// Queue one frame. With [`OverflowPolicy::Block`] this waits for space.
    pub async fn send_frame(&self, frame: Frame) -> Result<()> {
        let throttled = self.shared.config.throttle.interval().is_some();
        let capacity = self.shared.config.buffer_capacity.max(1);
        let mut frame = Some(frame);

        loop {
            let space = self.shared.space.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let state = self.shared.state();
                if matches!(state, ConnectionState::Closing | ConnectionState::Closed) {
                    return Err(Error::Connection("channel is closed".to_string()));
                }

                let mut outbox = self.shared.outbox();
                if state == ConnectionState::Open && throttled {
                    outbox.latest = frame.take();
                } else if outbox.queue.len() < capacity {
                    outbox.queue.extend(frame.take());
                } else if self.shared.config.overflow == OverflowPolicy::DropOldest {
                    outbox.queue.pop_front();
                    outbox.queue.extend(frame.take());
                    tracing::warn!(capacity, "Realtime buffer full, dropped oldest message");
                }
            }

            if frame.is_none() {
                self.shared.wake.notify_one();
                return Ok(());
            }
            space.await;
        }
    }

    /// Close gracefully and wait for the driver to stop.
    pub async fn close(mut self) {
        self.shutdown.cancel();
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                tracing::warn!(error = %e, "Realtime driver ended abnormally");
            }
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

enum SessionEnd {
    Shutdown,
    Dropped(Error),
}

struct Driver {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    url: Arc<dyn UrlSource>,
    handlers: RealtimeHandlers,
    shutdown: CancellationToken,
    next_send: Instant,
}

impl Driver {
    async fn run(mut self) {
        let retry = self.shared.config.reconnect;
        let mut attempt = 0u32;

        loop {
            self.shared.set_state(ConnectionState::Connecting);
            let opened = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                opened = self.open() => opened,
            };

            match opened {
                Ok(connection) => {
                    attempt = 0;
                    self.shared.set_state(ConnectionState::Open);
                    tracing::info!("Realtime connection open");
                    match self.session(connection).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Dropped(e) => {
                            tracing::warn!(error = %e, "Realtime connection dropped");
                            (self.handlers.on_error)(e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Realtime connect failed");
                    (self.handlers.on_error)(e);
                }
            }

            attempt += 1;
            if !retry.allows(attempt) {
                (self.handlers.on_error)(Error::Connection(format!(
                    "gave up after {} reconnect attempts",
                    retry.max_attempts
                )));
                break;
            }
            let delay = retry.delay(attempt);
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting realtime channel");
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.set_state(ConnectionState::Closed);
        self.shared.space.notify_waiters();
        tracing::info!("Realtime channel closed");
    }

    async fn open(&self) -> Result<Connection> {
        let url = self.url.url().await?;
        self.connector.open(&url).await
    }

    async fn session(&mut self, mut connection: Connection) -> SessionEnd {
        let throttle = self.shared.config.throttle.interval();

        loop {
            while let Some(frame) = self.shared.pop_queued() {
                if let Err(e) = connection.sink.send(frame).await {
                    return SessionEnd::Dropped(e);
                }
            }

            let mut wait_until = None;
            if let Some(interval) = throttle {
                let pending = self.shared.outbox().latest.is_some();
                if pending {
                    let now = Instant::now();
                    if now >= self.next_send {
                        let frame = self.shared.outbox().latest.take();
                        if let Some(frame) = frame {
                            if let Err(e) = connection.sink.send(frame).await {
                                return SessionEnd::Dropped(e);
                            }
                            self.next_send = now + interval;
                        }
                        continue;
                    }
                    wait_until = Some(self.next_send);
                }
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.shared.set_state(ConnectionState::Closing);
                    if let Err(e) = connection.sink.close().await {
                        tracing::debug!(error = %e, "Close handshake failed");
                    }
                    return SessionEnd::Shutdown;
                }
                _ = self.shared.wake.notified() => {}
                _ = sleep_until(wait_until), if wait_until.is_some() => {}
                inbound = connection.stream.recv() => match inbound {
                    Some(Ok(frame)) => self.dispatch(frame),
                    Some(Err(e)) => return SessionEnd::Dropped(e),
                    None => {
                        return SessionEnd::Dropped(Error::Connection(
                            "connection closed by peer".to_string(),
                        ))
                    }
                },
            }
        }
    }

    fn dispatch(&self, frame: Frame) {
        let message = match frame {
            Frame::Text(text) => {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            }
            Frame::Binary(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    (self.handlers.on_error)(Error::Decode(format!("binary frame: {}", e)));
                    return;
                }
            },
        };

        if message.get("type").and_then(Value::as_str) == Some(ERROR_MESSAGE_TYPE) {
            let status = message
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok())
                .unwrap_or(500);
            (self.handlers.on_error)(Error::Api {
                status,
                body: message.to_string(),
                request_id: None,
            });
            return;
        }

        let handler = self.handlers.on_message.clone();
        match catch_unwind(AssertUnwindSafe(|| handler(message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => (self.handlers.on_error)(Error::Handler(e.to_string())),
            Err(_) => (self.handlers.on_error)(Error::Handler("message handler panicked".to_string())),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
