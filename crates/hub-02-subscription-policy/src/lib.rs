//! # Subscription Policy Store
//!
//! **Component:** hub-02
//!
//! Answers `should_notify(tenant, event_type, meta)` for every event the
//! router is about to distribute.
//!
//! ## Decision Contract
//!
//! | Step | Condition | Result |
//! |------|-----------|--------|
//! | 1 | no rule for `(tenant, event_type)` | notify |
//! | 2 | `rule.enabled == false` | suppress |
//! | 3 | `rule.source_integration_id` set and differs from the event's | suppress |
//! | 4 | `rule.statuses` non-empty and event status not listed | suppress |
//! | 5 | `rule.payment_method_ids` non-empty and event method not listed | suppress |
//! | 6 | otherwise | notify |
//!
//! `(tenant, event_type)` is the rule's primary key, so at most one rule is
//! ever consulted. Lookups (including "no rule") are cached for 60 s.
//!
//! ## Module Structure
//!
//! ```text
//! domain/   - SubscriptionRule, EventMeta, evaluate(), PolicyError
//! ports/    - NotificationPolicy (inbound), RuleStore (outbound)
//! adapters/ - in-memory, PostgreSQL (feature `postgres`)
//! service   - SubscriptionPolicyService
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::InMemoryRuleStore;
pub use domain::{evaluate, EventMeta, PolicyError, SubscriptionRule};
pub use ports::{NotificationPolicy, RuleStore};
pub use service::{SubscriptionPolicyService, DEFAULT_POLICY_TTL};

#[cfg(feature = "postgres")]
pub use adapters::postgres::PgRuleStore;
