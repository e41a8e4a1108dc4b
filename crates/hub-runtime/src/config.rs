//! # Hub Configuration
//!
//! One section per component. Every section has defaults, so an empty
//! environment yields a runnable in-memory hub; `validate` is the gate
//! before anything is wired.

use hub_03_event_router::RouterConfig;
use hub_04_invoice_coordinator::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub const MEMORY_URL: &str = "memory://";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse '{value}'")]
    Unparsable { var: &'static str, value: String },

    #[error("{section}: {reason}")]
    Invalid { section: &'static str, reason: String },

    #[error("unsupported URL scheme for {var}: '{url}'")]
    UnsupportedScheme { var: &'static str, url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    /// `memory://` or `redis://...`.
    pub url: String,
    /// Prefix of the reserved state channels.
    pub channel_prefix: String,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: MEMORY_URL.to_string(),
            channel_prefix: "hub".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Shared L2: `memory://` or `redis://...`.
    pub url: String,
    /// Hex master key for credential encryption (32 bytes).
    #[serde(skip_serializing)]
    pub master_key: Option<String>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            url: MEMORY_URL.to_string(),
            master_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Store of record: `memory://` or `postgres://...`.
    pub url: String,
    pub max_connections: u32,
    /// Policy rule cache lifetime.
    pub policy_ttl_secs: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            url: MEMORY_URL.to_string(),
            max_connections: 10,
            policy_ttl_secs: 60,
        }
    }
}

impl StoreSection {
    #[must_use]
    pub fn policy_ttl(&self) -> Duration {
        Duration::from_secs(self.policy_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen_addr: SocketAddr,
    /// Bearer token for tenant 0 streams.
    #[serde(skip_serializing)]
    pub superuser_token: Option<String>,
    /// Drain window after the shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            superuser_token: None,
            shutdown_grace_secs: 30,
        }
    }
}

impl ServerSection {
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoicingSection {
    /// Provider codes that get a worker and a response listener.
    pub providers: Vec<String>,
    /// Workers per provider.
    pub workers_per_provider: usize,
    #[serde(flatten)]
    pub coordinator: CoordinatorConfig,
}

impl Default for InvoicingSection {
    fn default() -> Self {
        Self {
            providers: vec!["siigo".to_string()],
            workers_per_provider: 1,
            coordinator: CoordinatorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub broker: BrokerSection,
    pub cache: CacheSection,
    pub store: StoreSection,
    pub router: RouterConfig,
    pub coordinator: InvoicingSection,
    pub server: ServerSection,
}

/// Adapter family a URL selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Redis,
    Postgres,
}

/// Map a URL to its backend, refusing schemes `var` does not support.
pub fn backend(var: &'static str, url: &str, allowed: &[Backend]) -> Result<Backend, ConfigError> {
    let found = if url.starts_with(MEMORY_URL) {
        Backend::Memory
    } else if url.starts_with("redis://") || url.starts_with("rediss://") {
        Backend::Redis
    } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Backend::Postgres
    } else {
        return Err(ConfigError::UnsupportedScheme {
            var,
            url: url.to_string(),
        });
    };
    if allowed.contains(&found) {
        Ok(found)
    } else {
        Err(ConfigError::UnsupportedScheme {
            var,
            url: url.to_string(),
        })
    }
}

impl HubConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(url) = get("BROKER_URL") {
            config.broker.url = url;
        }
        if let Some(prefix) = get("CHANNEL_PREFIX") {
            config.broker.channel_prefix = prefix;
        }
        if let Some(url) = get("CACHE_URL") {
            config.cache.url = url;
        }
        config.cache.master_key = get("MASTER_KEY");
        if let Some(url) = get("STORE_URL") {
            config.store.url = url;
        }
        if let Some(v) = get("RING_SIZE") {
            config.router.ring_size = parse("RING_SIZE", &v)?;
        }
        if let Some(v) = get("MAILBOX_SIZE") {
            config.router.mailbox_size = parse("MAILBOX_SIZE", &v)?;
        }
        if let Some(v) = get("KEEPALIVE_SEC") {
            config.router.keepalive_secs = parse("KEEPALIVE_SEC", &v)?;
        }
        if let Some(v) = get("TOKEN_SAFETY_SEC") {
            config.coordinator.coordinator.token_safety_secs = parse("TOKEN_SAFETY_SEC", &v)?;
        }
        if let Some(v) = get("REQUEST_TIMEOUT_SEC") {
            config.coordinator.coordinator.request_timeout_secs = parse("REQUEST_TIMEOUT_SEC", &v)?;
        }
        if let Some(v) = get("INVOICE_PROVIDERS") {
            config.coordinator.providers = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_lowercase)
                .collect();
        }
        if let Some(v) = get("SHUTDOWN_GRACE_SEC") {
            config.server.shutdown_grace_secs = parse("SHUTDOWN_GRACE_SEC", &v)?;
        }
        if let Some(v) = get("LISTEN_ADDR") {
            config.server.listen_addr = parse("LISTEN_ADDR", &v)?;
        }
        config.server.superuser_token = get("SUPERUSER_TOKEN");

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        backend("BROKER_URL", &self.broker.url, &[Backend::Memory, Backend::Redis])?;
        backend("CACHE_URL", &self.cache.url, &[Backend::Memory, Backend::Redis])?;
        backend("STORE_URL", &self.store.url, &[Backend::Memory, Backend::Postgres])?;

        if self.broker.channel_prefix.contains(char::is_whitespace) {
            return Err(invalid("broker", "channel prefix must not contain whitespace"));
        }
        self.router
            .validate()
            .map_err(|e| invalid("router", e.to_string()))?;
        self.coordinator
            .coordinator
            .validate()
            .map_err(|e| invalid("coordinator", e.to_string()))?;
        if self.coordinator.workers_per_provider == 0 {
            return Err(invalid("coordinator", "workers_per_provider must be at least 1"));
        }
        if self.store.max_connections == 0 {
            return Err(invalid("store", "max_connections must be at least 1"));
        }
        if self.server.shutdown_grace_secs == 0 {
            return Err(invalid("server", "shutdown grace must be at least 1 second"));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Unparsable {
        var,
        value: value.to_string(),
    })
}

fn invalid(section: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        section,
        reason: reason.into(),
    }
}
