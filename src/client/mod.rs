//! Client entry point.
//!
//! A [`Client`] bundles an immutable [`ClientConfig`] with the transport built
//! from it and exposes every invocation style: synchronous run, queue,
//! subscription, streaming and realtime.

pub mod config;
pub mod credentials;
pub mod default;

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;

use crate::endpoint::EndpointId;
use crate::error::Result;
use crate::queue::Queue;
use crate::realtime::{
    Connector, RealtimeChannel, RealtimeConfig, RealtimeHandlers, TokenUrl, WebSocketConnector,
};
use crate::streaming::{StreamChannel, StreamOptions};
use crate::subscription::{self, SubscribeOptions, SubscriptionEvent, SubscriptionResult};
use crate::transport::{Payload, RequestSpec, Transport};

pub use config::{ClientConfig, ClientConfigBuilder, Environment, ServiceUrls};
pub use credentials::Credentials;

#[derive(Debug, Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    transport: Arc<Transport>,
    queue: Queue,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let config = Arc::new(config);
        let transport = Arc::new(Transport::new(config.clone()));
        let queue = Queue::new(transport.clone());
        Self {
            config,
            transport,
            queue,
        }
    }

    /// Client with default settings and credentials read from the environment.
    pub fn from_env() -> Self {
        Self::new(ClientConfig::default())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A new client with `config`; operations in flight keep the old one.
    pub fn reconfigure(&self, config: ClientConfig) -> Self {
        Self::new(config)
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Run `endpoint` synchronously and return its output.
    pub async fn run<T>(&self, endpoint: &str, input: &T) -> Result<Payload>
    where
        T: Serialize + ?Sized,
    {
        let endpoint: EndpointId = endpoint.parse()?;
        let base = self.config.urls().run.trim_end_matches('/');
        let request =
            RequestSpec::new(Method::POST, format!("{}/{}", base, endpoint.full_path())).with_json(input)?;
        tracing::debug!(endpoint = %endpoint, "Running endpoint");
        self.transport.execute(request).await
    }

    /// Submit through the queue and follow the job to completion.
    pub async fn subscribe<T, F>(
        &self,
        endpoint: &str,
        input: &T,
        options: SubscribeOptions,
        on_event: F,
    ) -> Result<SubscriptionResult>
    where
        T: Serialize + ?Sized,
        F: FnMut(SubscriptionEvent) + Send,
    {
        let endpoint: EndpointId = endpoint.parse()?;
        subscription::subscribe(&self.queue, &endpoint, input, options, on_event).await
    }

    /// Open a progressive-result stream.
    pub async fn stream<T>(&self, endpoint: &str, input: &T, options: StreamOptions) -> Result<StreamChannel>
    where
        T: Serialize + ?Sized,
    {
        let endpoint: EndpointId = endpoint.parse()?;
        StreamChannel::open(self.transport.clone(), &endpoint, input, options).await
    }

    /// Connect a realtime channel over WebSocket.
    pub fn realtime(
        &self,
        endpoint: &str,
        config: RealtimeConfig,
        handlers: RealtimeHandlers,
    ) -> Result<RealtimeChannel> {
        self.realtime_with(Arc::new(WebSocketConnector), endpoint, config, handlers)
    }

    /// Connect a realtime channel through a custom connector.
    pub fn realtime_with(
        &self,
        connector: Arc<dyn Connector>,
        endpoint: &str,
        config: RealtimeConfig,
        handlers: RealtimeHandlers,
    ) -> Result<RealtimeChannel> {
        let endpoint: EndpointId = endpoint.parse()?;
        let url = Arc::new(TokenUrl::new(self.transport.clone(), endpoint));
        Ok(RealtimeChannel::connect(connector, url, config, handlers))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::from_env()
    }
}
