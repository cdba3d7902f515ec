//! Process-wide default client.
//!
//! Reconfiguration swaps the whole client atomically; callers holding the
//! previous `Arc<Client>` finish their work on the old configuration.

use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use crate::client::{Client, ClientConfig};

static DEFAULT: OnceLock<ArcSwap<Client>> = OnceLock::new();

fn slot() -> &'static ArcSwap<Client> {
    DEFAULT.get_or_init(|| ArcSwap::from_pointee(Client::from_env()))
}

/// The current default client.
pub fn client() -> Arc<Client> {
    slot().load_full()
}

/// Replace the default client with one built from `config`.
pub fn configure(config: ClientConfig) -> Arc<Client> {
    let client = Arc::new(Client::new(config));
    slot().store(client.clone());
    tracing::debug!("Default client reconfigured");
    client
}
