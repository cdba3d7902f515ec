//! Structured logging setup for the relay binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "modelrunner=debug,modelrunner_proxy=debug,tower_http=debug";

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: Option<&str>, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) => EnvFilter::new(format!("modelrunner={level},modelrunner_proxy={level},tower_http={level}")),
        None => EnvFilter::new(DEFAULT_FILTER),
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
