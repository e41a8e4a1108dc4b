use serde::{Deserialize, Serialize};
use shared_types::{DomainEvent, EventType, IntegrationId, TenantId};

use super::PolicyError;

/// Notification rule for one `(tenant, event_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRule {
    pub tenant_id: TenantId,
    pub event_type: String,
    pub enabled: bool,
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub payment_method_ids: Vec<u64>,
    #[serde(default)]
    pub source_integration_id: Option<IntegrationId>,
}

impl SubscriptionRule {
    pub fn new(tenant_id: TenantId, event_type: &str) -> Result<Self, PolicyError> {
        let event_type = EventType::parse(event_type)?;
        Ok(Self {
            tenant_id,
            event_type: event_type.as_str().to_string(),
            enabled: true,
            statuses: Vec::new(),
            payment_method_ids: Vec::new(),
            source_integration_id: None,
        })
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    #[must_use]
    pub fn with_statuses<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_payment_methods(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.payment_method_ids = ids.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_source_integration(mut self, id: IntegrationId) -> Self {
        self.source_integration_id = Some(id);
        self
    }
}

/// The event attributes a rule can constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EventMeta {
    pub source_integration_id: Option<IntegrationId>,
    pub status: Option<String>,
    pub payment_method_id: Option<u64>,
}

impl EventMeta {
    /// Derive from an envelope. The source integration is the envelope's
    /// `integration_id`, else a `source_integration_id` attribute. Status and
    /// payment method come from `metadata`, falling back to `data`.
    #[must_use]
    pub fn from_event(event: &DomainEvent) -> Self {
        let source_integration_id = event.integration_id.or_else(|| {
            event
                .attribute("source_integration_id")
                .and_then(|v| v.parse().ok())
                .map(IntegrationId)
        });
        Self {
            source_integration_id,
            status: event.attribute("status"),
            payment_method_id: event
                .attribute("payment_method_id")
                .and_then(|v| v.parse().ok()),
        }
    }
}
