//! Credential sources.
//!
//! Credentials are resolved lazily, once per request, through a resolver that
//! must behave as a pure accessor. The value is never logged: `Debug` redacts.

use std::fmt;
use std::sync::Arc;

/// Single combined key (`id:secret`).
pub const KEY_ENV: &str = "MODELRUNNER_KEY";
/// Key id half of a split key.
pub const KEY_ID_ENV: &str = "MODELRUNNER_KEY_ID";
/// Key secret half of a split key.
pub const KEY_SECRET_ENV: &str = "MODELRUNNER_KEY_SECRET";

/// Opaque API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw value, for building the authorization header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `Key <credentials>` header value.
    pub fn authorization(&self) -> String {
        format!("Key {}", self.0)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

/// Shared resolver invoked per request; may be called concurrently.
pub type CredentialsResolver = Arc<dyn Fn() -> Option<Credentials> + Send + Sync>;

/// Resolve from an arbitrary variable lookup. A combined key wins over a split pair.
pub fn resolve_with<F>(lookup: F) -> Option<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(key) = non_empty(KEY_ENV) {
        return Some(Credentials(key));
    }
    match (non_empty(KEY_ID_ENV), non_empty(KEY_SECRET_ENV)) {
        (Some(id), Some(secret)) => Some(Credentials(format!("{}:{}", id, secret))),
        _ => None,
    }
}

/// Resolve from the process environment.
pub fn from_env() -> Option<Credentials> {
    resolve_with(|name| std::env::var(name).ok())
}

/// Resolver backed by the process environment.
pub fn env_resolver() -> CredentialsResolver {
    Arc::new(from_env)
}

/// Resolver that always returns the same key. A blank key resolves to none.
pub fn static_resolver(key: impl Into<String>) -> CredentialsResolver {
    let key = key.into();
    let credentials = (!key.trim().is_empty()).then(|| Credentials::new(key));
    Arc::new(move || credentials.clone())
}

/// Resolver that never yields credentials (proxy-only clients).
pub fn no_credentials() -> CredentialsResolver {
    Arc::new(|| None)
}
