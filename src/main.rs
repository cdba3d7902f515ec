//! Credential-injecting relay for modelrunner API calls.
//!
//! Browser code points the SDK at this server's relay route; the server
//! adds the account key and forwards the call to the allow-listed API.
//!
//! ```text
//!   browser ──▶ /api/modelrunner/proxy ──▶ ProxyHandler ──▶ queue.modelrunner.run
//!     x-modelrunner-target-url            + Authorization      (allow-listed)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use modelrunner::config::{load_config, ConfigWatcher, ServerConfig};
use modelrunner::http::HttpServer;
use modelrunner::lifecycle::{spawn_signal_listener, Shutdown};
use modelrunner::observability::{init_logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "modelrunner-proxy", version, about = "Relay browser calls to modelrunner with server-side credentials")]
struct Args {
    /// TOML configuration file; watched for changes.
    #[arg(short, long, env = "MODELRUNNER_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.listener.bind_address = bind.clone();
    }

    if args.check {
        println!("configuration ok");
        return Ok(());
    }

    init_logging(
        Some(&config.observability.log_level),
        config.observability.json_logs,
    );
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "modelrunner-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        route = %config.proxy.route,
        allowed_domains = ?config.proxy.allowed_domains,
        explicit_credentials = config.proxy.credentials.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher must outlive the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
