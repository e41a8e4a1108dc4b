//! Which streams may see which events.

use shared_types::{DomainEvent, EventType, IntegrationId, TenantId};
use std::collections::BTreeSet;

use super::{RouterError, SequencedEvent};

/// Per-stream predicates. Every set predicate must hold; an empty one is a
/// wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberFilter {
    pub integration_id: Option<IntegrationId>,
    pub event_types: BTreeSet<String>,
    pub order_ids: BTreeSet<String>,
}

impl SubscriberFilter {
    /// Build from the raw query values. Lists are comma separated; blank
    /// items are ignored. Event types must belong to a declared namespace.
    pub fn parse(
        integration_id: Option<u64>,
        event_types: Option<&str>,
        order_ids: Option<&str>,
    ) -> Result<Self, RouterError> {
        let event_types = split_list(event_types)
            .map(|raw| {
                EventType::parse(raw)
                    .map(|t| t.as_str().to_string())
                    .map_err(|e| RouterError::InvalidFilter(e.to_string()))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            integration_id: integration_id.map(IntegrationId),
            event_types,
            order_ids: split_list(order_ids).map(str::to_string).collect(),
        })
    }

    #[must_use]
    pub fn matches(&self, event: &DomainEvent) -> bool {
        if let Some(id) = self.integration_id {
            if event.integration_id != Some(id) {
                return false;
            }
        }
        if !self.event_types.is_empty() && !self.event_types.contains(&event.event_type) {
            return false;
        }
        if !self.order_ids.is_empty() {
            match event.metadata_str("order_id") {
                Some(order_id) if self.order_ids.contains(&order_id) => {}
                _ => return false,
            }
        }
        true
    }
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

/// Tenant scoping: superuser sees everything, everyone sees global events,
/// otherwise the tenants must match.
#[must_use]
pub fn tenant_visible(connection_tenant: TenantId, event: &DomainEvent) -> bool {
    connection_tenant.is_superuser()
        || match event.owning_tenant() {
            None => true,
            Some(owner) => owner == connection_tenant,
        }
}

/// Full admission check for one stream.
#[must_use]
pub fn admits(connection_tenant: TenantId, filter: &SubscriberFilter, event: &SequencedEvent) -> bool {
    if event.suppressed && !connection_tenant.is_superuser() {
        return false;
    }
    tenant_visible(connection_tenant, &event.event) && filter.matches(&event.event)
}

/// What a client asked for when opening a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamRequest {
    pub tenant_id: TenantId,
    pub filter: SubscriberFilter,
    /// Replay everything buffered after this seq.
    pub since_seq: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared_types::{EventFamily, JsonMap};

    fn event(tenant: Option<u64>, name: &str) -> DomainEvent {
        let mut event = DomainEvent::new(EventType::new(EventFamily::Order, name).unwrap(), JsonMap::new());
        event.tenant_id = tenant.map(TenantId);
        event
    }

    fn sequenced(event: DomainEvent, suppressed: bool) -> SequencedEvent {
        SequencedEvent {
            seq: 1,
            event,
            suppressed,
        }
    }

    #[test]
    fn test_parse_lists() {
        let filter = SubscriberFilter::parse(Some(4), Some("order.paid, order.created,,"), Some(" 10 ,11")).unwrap();
        assert_eq!(filter.integration_id, Some(IntegrationId(4)));
        assert_eq!(filter.event_types.len(), 2);
        assert!(filter.order_ids.contains("10") && filter.order_ids.contains("11"));
    }

    #[test]
    fn test_parse_rejects_unknown_namespace() {
        assert!(matches!(
            SubscriberFilter::parse(None, Some("order.paid,refund.made"), None),
            Err(RouterError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_empty_filter_is_wildcard() {
        assert!(SubscriberFilter::default().matches(&event(Some(1), "paid")));
    }

    #[test]
    fn test_tenant_scoping() {
        assert!(tenant_visible(TenantId(7), &event(Some(7), "paid")));
        assert!(!tenant_visible(TenantId(8), &event(Some(7), "paid")));
        assert!(tenant_visible(TenantId(8), &event(None, "paid")));
        assert!(tenant_visible(TenantId(8), &event(Some(0), "paid")));
        assert!(tenant_visible(TenantId::SUPERUSER, &event(Some(7), "paid")));
    }

    #[test]
    fn test_order_id_matches_numeric_metadata() {
        let filter = SubscriberFilter::parse(None, None, Some("12")).unwrap();
        assert!(filter.matches(&event(Some(1), "paid").with_metadata("order_id", 12)));
        assert!(!filter.matches(&event(Some(1), "paid").with_metadata("order_id", 13)));
        assert!(!filter.matches(&event(Some(1), "paid")));
    }

    #[test]
    fn test_suppressed_only_for_superuser() {
        let e = sequenced(event(Some(3), "paid"), true);
        assert!(!admits(TenantId(3), &SubscriberFilter::default(), &e));
        assert!(admits(TenantId::SUPERUSER, &SubscriberFilter::default(), &e));
    }

    fn arb_event() -> impl Strategy<Value = DomainEvent> {
        (
            proptest::option::of(0u64..4),
            proptest::option::of(1u64..3),
            prop::sample::select(vec!["paid", "created", "shipped"]),
            proptest::option::of(1u64..4),
        )
            .prop_map(|(tenant, integration, name, order)| {
                let mut e = event(tenant, name);
                e.integration_id = integration.map(IntegrationId);
                if let Some(order) = order {
                    e = e.with_metadata("order_id", order);
                }
                e
            })
    }

    fn arb_filter() -> impl Strategy<Value = SubscriberFilter> {
        (
            proptest::option::of(1u64..3),
            proptest::collection::btree_set(prop::sample::select(vec!["order.paid", "order.created"]), 0..2),
            proptest::collection::btree_set(1u64..4, 0..2),
        )
            .prop_map(|(integration, types, orders)| SubscriberFilter {
                integration_id: integration.map(IntegrationId),
                event_types: types.into_iter().map(str::to_string).collect(),
                order_ids: orders.into_iter().map(|o| o.to_string()).collect(),
            })
    }

    proptest! {
        #[test]
        fn prop_admitted_events_belong_to_tenant(
            conn in 1u64..4,
            e in arb_event(),
            f in arb_filter(),
            suppressed in any::<bool>(),
        ) {
            let conn = TenantId(conn);
            let seq = sequenced(e, suppressed);
            if admits(conn, &f, &seq) {
                let owner = seq.event.owning_tenant();
                prop_assert!(owner.is_none() || owner == Some(conn));
                prop_assert!(!seq.suppressed);
            }
        }

        #[test]
        fn prop_admitted_events_satisfy_every_predicate(
            conn in 0u64..4,
            e in arb_event(),
            f in arb_filter(),
        ) {
            let seq = sequenced(e, false);
            if admits(TenantId(conn), &f, &seq) {
                if let Some(id) = f.integration_id {
                    prop_assert_eq!(seq.event.integration_id, Some(id));
                }
                if !f.event_types.is_empty() {
                    prop_assert!(f.event_types.contains(&seq.event.event_type));
                }
                if !f.order_ids.is_empty() {
                    let order = seq.event.metadata_str("order_id");
                    prop_assert!(order.is_some_and(|o| f.order_ids.contains(&o)));
                }
            }
        }

        #[test]
        fn prop_superuser_sees_every_unfiltered_event(e in arb_event(), suppressed in any::<bool>()) {
            prop_assert!(admits(TenantId::SUPERUSER, &SubscriberFilter::default(), &sequenced(e, suppressed)));
        }
    }
}
