use async_trait::async_trait;
use shared_types::TenantId;

use crate::domain::EventMeta;

/// Consulted by the router before an event is buffered or fanned out.
#[async_trait]
pub trait NotificationPolicy: Send + Sync {
    async fn should_notify(&self, tenant_id: TenantId, event_type: &str, meta: &EventMeta) -> bool;
}
