//! Outbound ports: the shared K/V layer and the store of record.

use async_trait::async_trait;
use shared_types::IntegrationId;
use std::time::Duration;

use crate::domain::{CacheError, StoredIntegration};

/// L2: a key-value store shared across processes. Values are JSON strings.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// L3: the relational store of record.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn load(&self, id: IntegrationId) -> Result<Option<StoredIntegration>, CacheError>;

    /// Insert or replace.
    async fn save(&self, record: StoredIntegration) -> Result<(), CacheError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: IntegrationId) -> Result<bool, CacheError>;
}
