//! HTTP server hosting the relay.
//!
//! # Responsibilities
//! - Create the Axum router (relay route plus `/health`)
//! - Wire up middleware (tracing, timeout, request ID)
//! - Swap relay settings when a new configuration arrives
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ServerConfig, TimeoutConfig};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::proxy::{AxumExchange, ProxyHandler, ProxySettings};
use crate::transport::{HttpSend, ReqwestSend};

/// Relay handler plus the body limit it was built with.
struct Relay {
    handler: ProxyHandler,
    max_body_bytes: usize,
}

impl Relay {
    fn new(settings: &ProxySettings, http: Arc<dyn HttpSend>) -> Self {
        Self {
            handler: ProxyHandler::new(settings, http),
            max_body_bytes: settings.max_body_bytes,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    relay: Arc<ArcSwap<Relay>>,
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    relay: Arc<ArcSwap<Relay>>,
    http: Arc<dyn HttpSend>,
}

impl HttpServer {
    /// Create a server that calls upstream with a reqwest client.
    pub fn new(config: ServerConfig) -> Result<Self, reqwest::Error> {
        let client = upstream_client_builder(&config.timeouts).build()?;
        Ok(Self::with_http(config, Arc::new(ReqwestSend::with_client(client))))
    }

    /// Create a server with a custom upstream transport.
    pub fn with_http(config: ServerConfig, http: Arc<dyn HttpSend>) -> Self {
        let relay = Arc::new(ArcSwap::from_pointee(Relay::new(&config.proxy, http.clone())));
        let state = AppState {
            relay: relay.clone(),
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            relay,
            http,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route(&config.proxy.route, any(relay_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Every configuration received on `config_updates` replaces the relay
    /// settings for subsequent requests. The route and listener are fixed.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            route = %self.config.proxy.route,
            "Relay server starting"
        );

        let relay = self.relay.clone();
        let http = self.http.clone();
        let route = self.config.proxy.route.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                if config.proxy.route != route {
                    tracing::warn!(
                        current = %route,
                        requested = %config.proxy.route,
                        "Route changes need a restart; keeping current route"
                    );
                }
                relay.store(Arc::new(Relay::new(&config.proxy, http.clone())));
                tracing::info!(
                    allowed_domains = ?config.proxy.allowed_domains,
                    "Relay settings reloaded"
                );
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("Relay server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Builder for the client the relay calls upstream with.
///
/// Redirects are returned to the caller as-is; following them would reach
/// hosts the allow-list never saw.
pub fn upstream_client_builder(timeouts: &TimeoutConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .timeout(Duration::from_secs(timeouts.upstream_secs))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn relay_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let relay = state.relay.load_full();
    let id = request_id(request.headers()).unwrap_or("-").to_string();
    let mut exchange = AxumExchange::new(request, relay.max_body_bytes);
    relay.handler.handle(&mut exchange).await;
    let response = exchange.into_response();
    tracing::debug!(request_id = %id, status = %response.status(), "Relay request finished");
    response
}
