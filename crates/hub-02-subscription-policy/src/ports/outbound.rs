use async_trait::async_trait;
use shared_types::TenantId;

use crate::domain::{PolicyError, SubscriptionRule};

/// Store of record for rules; `(tenant_id, event_type)` is the primary key.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn find(&self, tenant_id: TenantId, event_type: &str) -> Result<Option<SubscriptionRule>, PolicyError>;

    /// Insert or replace.
    async fn upsert(&self, rule: SubscriptionRule) -> Result<(), PolicyError>;

    async fn delete(&self, tenant_id: TenantId, event_type: &str) -> Result<bool, PolicyError>;

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<SubscriptionRule>, PolicyError>;
}
