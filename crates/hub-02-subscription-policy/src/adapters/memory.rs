use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::TenantId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::{PolicyError, SubscriptionRule};
use crate::ports::RuleStore;

#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<(TenantId, String), SubscriptionRule>>,
    finds: AtomicUsize,
}

impl InMemoryRuleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn find_count(&self) -> usize {
        self.finds.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn find(&self, tenant_id: TenantId, event_type: &str) -> Result<Option<SubscriptionRule>, PolicyError> {
        self.finds.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .rules
            .read()
            .get(&(tenant_id, event_type.to_string()))
            .cloned())
    }

    async fn upsert(&self, rule: SubscriptionRule) -> Result<(), PolicyError> {
        self.rules
            .write()
            .insert((rule.tenant_id, rule.event_type.clone()), rule);
        Ok(())
    }

    async fn delete(&self, tenant_id: TenantId, event_type: &str) -> Result<bool, PolicyError> {
        Ok(self
            .rules
            .write()
            .remove(&(tenant_id, event_type.to_string()))
            .is_some())
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<SubscriptionRule>, PolicyError> {
        let mut rules: Vec<_> = self
            .rules
            .read()
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.event_type.cmp(&b.event_type));
        Ok(rules)
    }
}
