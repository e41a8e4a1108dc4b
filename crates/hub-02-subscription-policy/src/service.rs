use async_trait::async_trait;
use hub_telemetry::metrics::{CACHE_LOOKUPS, EVENTS_SUPPRESSED};
use shared_types::{EventType, SystemTimeSource, TenantId, TimeSource, TtlCache};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::{evaluate, EventMeta, PolicyError, SubscriptionRule};
use crate::ports::{NotificationPolicy, RuleStore};

pub const DEFAULT_POLICY_TTL: Duration = Duration::from_secs(60);

const METRIC_CACHE: &str = "policy";

type RuleKey = (TenantId, String);

pub struct SubscriptionPolicyService {
    store: Arc<dyn RuleStore>,
    /// `None` values cache the absence of a rule.
    rules: TtlCache<RuleKey, Option<Arc<SubscriptionRule>>>,
}

impl SubscriptionPolicyService {
    #[must_use]
    pub fn new(store: Arc<dyn RuleStore>, ttl: Duration) -> Self {
        Self::with_clock(store, ttl, Arc::new(SystemTimeSource))
    }

    #[must_use]
    pub fn with_clock(store: Arc<dyn RuleStore>, ttl: Duration, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            store,
            rules: TtlCache::with_clock(ttl, clock),
        }
    }

    /// Cached rule lookup. Store failures are not cached.
    pub async fn rule(&self, tenant_id: TenantId, event_type: &str) -> Result<Option<Arc<SubscriptionRule>>, PolicyError> {
        let key = (tenant_id, event_type.to_string());
        if let Some(hit) = self.rules.get(&key) {
            CACHE_LOOKUPS.with_label_values(&[METRIC_CACHE, "l1"]).inc();
            return Ok(hit);
        }
        let found = self.store.find(tenant_id, event_type).await?.map(Arc::new);
        CACHE_LOOKUPS
            .with_label_values(&[METRIC_CACHE, if found.is_some() { "l3" } else { "miss" }])
            .inc();
        self.rules.insert(key, found.clone());
        Ok(found)
    }

    /// Write a rule and drop its cached lookup.
    pub async fn put_rule(&self, rule: SubscriptionRule) -> Result<(), PolicyError> {
        let event_type = EventType::parse(&rule.event_type)?;
        let tenant_id = rule.tenant_id;
        self.store.upsert(rule).await?;
        self.invalidate(tenant_id, event_type.as_str());
        Ok(())
    }

    pub async fn delete_rule(&self, tenant_id: TenantId, event_type: &str) -> Result<bool, PolicyError> {
        let removed = self.store.delete(tenant_id, event_type).await?;
        self.invalidate(tenant_id, event_type);
        Ok(removed)
    }

    pub fn invalidate(&self, tenant_id: TenantId, event_type: &str) {
        self.rules.invalidate(&(tenant_id, event_type.to_string()));
    }

    /// Drop every cached rule of a tenant.
    pub fn invalidate_tenant(&self, tenant_id: TenantId) -> usize {
        self.rules.invalidate_where(|(t, _)| *t == tenant_id)
    }

    pub async fn rules_for(&self, tenant_id: TenantId) -> Result<Vec<SubscriptionRule>, PolicyError> {
        self.store.list(tenant_id).await
    }
}

#[async_trait]
impl NotificationPolicy for SubscriptionPolicyService {
    /// A rule store outage notifies rather than suppresses; the failed lookup
    /// is retried on the next event.
    async fn should_notify(&self, tenant_id: TenantId, event_type: &str, meta: &EventMeta) -> bool {
        let rule = match self.rule(tenant_id, event_type).await {
            Ok(rule) => rule,
            Err(e) => {
                warn!(tenant_id = %tenant_id, event_type = event_type, error = %e, "Rule lookup failed, notifying");
                return true;
            }
        };
        let notify = evaluate(rule.as_deref(), meta);
        if !notify {
            EVENTS_SUPPRESSED.inc();
            debug!(tenant_id = %tenant_id, event_type = event_type, "Suppressed by subscription rule");
        }
        notify
    }
}
