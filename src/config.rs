//! Runtime configuration, injected into the engine at construction time.

use std::fmt::{self, Debug, Display};
use std::time::Duration;

/// A value that must never end up in logs.
#[derive(Clone, Default)]
pub struct Secret<T>
where
    T: Clone + Default,
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

/// Credentials shared with the payment processor.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub key_id: String,
    /// Signs client payment confirmations.
    pub key_secret: Secret<String>,
    /// Signs webhook bodies.
    pub webhook_secret: Secret<String>,
}

impl GatewayConfig {
    /// Uses `key_secret` for both confirmation and webhook signatures.
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        let key_secret = Secret::new(key_secret.into());
        Self {
            key_id: key_id.into(),
            webhook_secret: key_secret.clone(),
            key_secret,
        }
    }

    pub fn with_webhook_secret(mut self, webhook_secret: impl Into<String>) -> Self {
        self.webhook_secret = Secret::new(webhook_secret.into());
        self
    }
}

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Tuning knobs for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Read-decide-write attempts before giving up with `ConcurrentModification`.
    pub max_attempts: u32,
    /// Upper bound on a whole engine call.
    pub deadline: Option<Duration>,
    /// Substitute a local placeholder reference when remote order creation fails.
    pub degraded_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            deadline: None,
            degraded_mode: false,
        }
    }
}
