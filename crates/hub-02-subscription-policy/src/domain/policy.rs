use super::{EventMeta, SubscriptionRule};

/// Pure decision for one event against the rule found for its
/// `(tenant, event_type)`, if any.
#[must_use]
pub fn evaluate(rule: Option<&SubscriptionRule>, meta: &EventMeta) -> bool {
    let Some(rule) = rule else {
        return true;
    };
    if !rule.enabled {
        return false;
    }
    if let Some(required) = rule.source_integration_id {
        if meta.source_integration_id != Some(required) {
            return false;
        }
    }
    if !rule.statuses.is_empty() {
        match &meta.status {
            Some(status) if rule.statuses.iter().any(|s| s == status) => {}
            _ => return false,
        }
    }
    if !rule.payment_method_ids.is_empty() {
        match meta.payment_method_id {
            Some(id) if rule.payment_method_ids.contains(&id) => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared_types::{IntegrationId, TenantId};

    fn rule() -> SubscriptionRule {
        SubscriptionRule::new(TenantId(3), "order.paid").unwrap()
    }

    fn meta(source: Option<u64>, status: Option<&str>, method: Option<u64>) -> EventMeta {
        EventMeta {
            source_integration_id: source.map(IntegrationId),
            status: status.map(str::to_string),
            payment_method_id: method,
        }
    }

    #[test]
    fn test_no_rule_notifies() {
        assert!(evaluate(None, &EventMeta::default()));
    }

    #[test]
    fn test_disabled_rule_suppresses() {
        assert!(!evaluate(Some(&rule().disabled()), &meta(Some(1), Some("paid"), Some(1))));
    }

    #[test]
    fn test_source_integration_must_match() {
        let r = rule().with_source_integration(IntegrationId(7));
        assert!(evaluate(Some(&r), &meta(Some(7), None, None)));
        assert!(!evaluate(Some(&r), &meta(Some(8), None, None)));
        assert!(!evaluate(Some(&r), &meta(None, None, None)));
    }

    #[test]
    fn test_status_list() {
        let r = rule().with_statuses(["paid", "shipped"]);
        assert!(evaluate(Some(&r), &meta(None, Some("shipped"), None)));
        assert!(!evaluate(Some(&r), &meta(None, Some("cancelled"), None)));
        assert!(!evaluate(Some(&r), &meta(None, None, None)));
    }

    #[test]
    fn test_payment_method_list() {
        let r = rule().with_payment_methods([2, 4]);
        assert!(evaluate(Some(&r), &meta(None, None, Some(4))));
        assert!(!evaluate(Some(&r), &meta(None, None, Some(3))));
    }

    #[test]
    fn test_enabled_empty_rule_notifies() {
        assert!(evaluate(Some(&rule()), &meta(None, None, None)));
    }

    proptest! {
        #[test]
        fn prop_evaluate_is_deterministic(
            enabled in any::<bool>(),
            statuses in proptest::collection::vec("[a-z]{1,6}", 0..3),
            methods in proptest::collection::vec(0u64..6, 0..3),
            source in proptest::option::of(0u64..4),
            event_status in proptest::option::of("[a-z]{1,6}"),
            event_method in proptest::option::of(0u64..6),
            event_source in proptest::option::of(0u64..4),
        ) {
            let mut r = rule().with_statuses(statuses).with_payment_methods(methods);
            r.enabled = enabled;
            r.source_integration_id = source.map(IntegrationId);
            let m = EventMeta {
                source_integration_id: event_source.map(IntegrationId),
                status: event_status,
                payment_method_id: event_method,
            };
            let first = evaluate(Some(&r), &m);
            prop_assert_eq!(first, evaluate(Some(&r), &m));
            if !enabled {
                prop_assert!(!first);
            }
        }
    }
}
