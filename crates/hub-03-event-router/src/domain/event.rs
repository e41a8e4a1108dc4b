use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_types::{DomainEvent, IntegrationId, JsonMap, TenantId};

/// An accepted event with its position in the router's global order.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedEvent {
    pub seq: u64,
    pub event: DomainEvent,
    /// Subscription policy said no. Such events reach superuser streams
    /// live and are never buffered.
    pub suppressed: bool,
}

#[derive(Serialize)]
struct WireEvent<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    tenant_id: Option<TenantId>,
    integration_id: Option<IntegrationId>,
    timestamp: &'a DateTime<Utc>,
    data: &'a JsonMap,
    metadata: &'a JsonMap,
    seq: u64,
}

impl SequencedEvent {
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }

    /// JSON body of the stream frame.
    pub fn to_wire_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireEvent {
            id: &self.event.id,
            event_type: &self.event.event_type,
            tenant_id: self.event.tenant_id,
            integration_id: self.event.integration_id,
            timestamp: &self.event.timestamp,
            data: &self.event.data,
            metadata: &self.event.metadata,
            seq: self.seq,
        })
    }
}
