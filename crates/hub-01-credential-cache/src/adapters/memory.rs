//! In-process L2 and L3, used by `memory://` deployments and by tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{IntegrationId, TtlCache};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::{CacheError, StoredIntegration};
use crate::ports::{IntegrationStore, SharedCache};

pub struct InMemorySharedCache {
    entries: TtlCache<String, String>,
}

impl InMemorySharedCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: TtlCache::new(Duration::from_secs(3600)),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.get(&key.to_string()).is_some()
    }
}

impl Default for InMemorySharedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(&key.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert_with_ttl(key.to_string(), value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(&key.to_string());
        Ok(())
    }
}

/// Store of record kept in a map. Counts loads so callers can observe
/// which layer answered.
#[derive(Default)]
pub struct InMemoryIntegrationStore {
    rows: RwLock<HashMap<IntegrationId, StoredIntegration>>,
    loads: AtomicUsize,
}

impl InMemoryIntegrationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `load` calls served so far.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IntegrationStore for InMemoryIntegrationStore {
    async fn load(&self, id: IntegrationId) -> Result<Option<StoredIntegration>, CacheError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn save(&self, record: StoredIntegration) -> Result<(), CacheError> {
        self.rows
            .write()
            .insert(record.integration.integration_id, record);
        Ok(())
    }

    async fn delete(&self, id: IntegrationId) -> Result<bool, CacheError> {
        Ok(self.rows.write().remove(&id).is_some())
    }
}
