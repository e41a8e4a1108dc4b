//! Broker → router → stream scenarios.

#![allow(clippy::unwrap_used)]

use hub_02_subscription_policy::SubscriptionRule;
use hub_03_event_router::{StreamRequest, SubscriberFilter};
use hub_runtime::HubConfig;
use serde_json::{json, Value};
use shared_types::TenantId;
use std::time::Duration;
use tokio::time::timeout;

use super::fixtures::{order_event, Harness, WAIT};

fn stream(tenant: u64, event_types: Option<&str>, since_seq: Option<u64>) -> StreamRequest {
    StreamRequest {
        tenant_id: TenantId(tenant),
        filter: SubscriberFilter::parse(None, event_types, None).unwrap(),
        since_seq,
    }
}

// =============================================================================
// SCOPED STREAM
// =============================================================================

#[tokio::test]
async fn test_scoped_stream_receives_only_matching_tenant_and_type() {
    let harness = Harness::memory().await;
    let mut sub = harness.hub.router().open_stream(stream(7, Some("order.paid"), None));

    let a = order_event(7, "paid");
    harness.publish_order(&a).await;
    harness.publish_order(&order_event(7, "created")).await;
    harness.publish_order(&order_event(8, "paid")).await;
    harness.await_seq(3).await;

    let got = timeout(WAIT, sub.next_live()).await.unwrap().unwrap();
    assert_eq!(got.event.id, a.id);
    assert!(timeout(Duration::from_millis(100), sub.next_live()).await.is_err());
}

#[tokio::test]
async fn test_tenants_never_see_each_other() {
    let harness = Harness::memory().await;
    let router = harness.hub.router();
    let mut streams: Vec<_> = (1..=3).map(|t| router.open_stream(stream(t, None, None))).collect();
    let mut superuser = router.open_stream(stream(0, None, None));

    for round in 0..4 {
        for tenant in 1..=3 {
            let event = order_event(tenant, "paid").with_metadata("round", round);
            harness.publish_order(&event).await;
        }
    }
    harness.await_seq(12).await;

    for (index, sub) in streams.iter_mut().enumerate() {
        let tenant = TenantId(index as u64 + 1);
        for _ in 0..4 {
            let event = timeout(WAIT, sub.next_live()).await.unwrap().unwrap();
            assert_eq!(event.event.tenant_id, Some(tenant));
        }
        assert!(timeout(Duration::from_millis(50), sub.next_live()).await.is_err());
    }
    for _ in 0..12 {
        timeout(WAIT, superuser.next_live()).await.unwrap().unwrap();
    }
}

// =============================================================================
// REPLAY
// =============================================================================

#[tokio::test]
async fn test_replay_bridges_to_live() {
    let harness = Harness::memory().await;
    for _ in 0..20 {
        harness.publish_order(&order_event(5, "paid")).await;
    }
    harness.await_seq(20).await;

    let mut sub = harness.hub.router().open_stream(stream(5, None, Some(10)));
    let replayed: Vec<u64> = sub.replay.iter().map(|e| e.seq).collect();
    assert_eq!(replayed, (11..=20).collect::<Vec<_>>());
    assert!(sub.gap.is_none());

    harness.publish_order(&order_event(5, "paid")).await;
    let live = timeout(WAIT, sub.next_live()).await.unwrap().unwrap();
    assert_eq!(live.seq, 21);
}

#[tokio::test]
async fn test_full_ring_reports_gap_and_keeps_the_rest() {
    let mut config = HubConfig::default();
    config.router.ring_size = 4;
    let harness = Harness::start(config).await;
    for _ in 0..5 {
        harness.publish_order(&order_event(2, "paid")).await;
    }
    harness.await_seq(5).await;

    // Seq 1 was evicted; asking from it loses nothing.
    let sub = harness.hub.router().open_stream(stream(2, None, Some(1)));
    assert_eq!(sub.replay.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2, 3, 4, 5]);
    assert!(sub.gap.is_none());

    let sub = harness.hub.router().open_stream(stream(2, None, Some(0)));
    let gap = sub.gap.unwrap();
    assert_eq!(gap.oldest_seq, 2);
}

// =============================================================================
// POLICY
// =============================================================================

#[tokio::test]
async fn test_policy_suppression_reaches_no_tenant_stream() {
    let harness = Harness::memory().await;
    harness
        .hub
        .policy()
        .put_rule(SubscriptionRule::new(TenantId(3), "order.paid").unwrap().disabled())
        .await
        .unwrap();
    let router = harness.hub.router();
    let mut tenant = router.open_stream(stream(3, None, None));
    let mut superuser = router.open_stream(stream(0, None, None));

    harness.publish_order(&order_event(3, "paid")).await;
    harness.await_seq(1).await;

    assert!(timeout(Duration::from_millis(100), tenant.next_live()).await.is_err());
    let seen = timeout(WAIT, superuser.next_live()).await.unwrap().unwrap();
    assert!(seen.suppressed);
    assert!(router.recent_events(TenantId(3), 0).is_empty());

    // Other types for the same tenant still flow.
    harness.publish_order(&order_event(3, "created")).await;
    let event = timeout(WAIT, tenant.next_live()).await.unwrap().unwrap();
    assert_eq!(event.event_type(), "order.created");
}

// =============================================================================
// SLOW CONSUMER
// =============================================================================

#[tokio::test]
async fn test_slow_consumer_loses_only_its_own_events() {
    let mut config = HubConfig::default();
    config.router.mailbox_size = 8;
    let harness = Harness::start(config).await;
    let router = harness.hub.router();
    let mut fast = router.open_stream(stream(4, None, None));
    let mut slow = router.open_stream(stream(4, None, None));

    let mut fast_seqs = Vec::new();
    for _ in 0..200 {
        router.publish(order_event(4, "paid"), false);
        fast_seqs.push(timeout(WAIT, fast.next_live()).await.unwrap().unwrap().seq);
    }
    assert_eq!(fast_seqs, (1..=200).collect::<Vec<_>>());

    assert_eq!(slow.dropped(), 192);
    assert!(router.subscriber(&slow.connection_id()).is_some());
    let mut slow_seqs = Vec::new();
    for _ in 0..8 {
        slow_seqs.push(timeout(WAIT, slow.next_live()).await.unwrap().unwrap().seq);
    }
    assert_eq!(slow_seqs, (1..=8).collect::<Vec<_>>());

    // Still registered and receiving once it catches up.
    router.publish(order_event(4, "paid"), false);
    assert_eq!(timeout(WAIT, slow.next_live()).await.unwrap().unwrap().seq, 201);
}

// =============================================================================
// ROUND TRIP OVER SSE
// =============================================================================

async fn read_until(response: &mut reqwest::Response, needle: &str) -> String {
    let mut seen = String::new();
    while !seen.contains(needle) {
        let chunk = timeout(WAIT, response.chunk())
            .await
            .expect("timed out")
            .unwrap()
            .expect("stream ended");
        seen.push_str(std::str::from_utf8(&chunk).unwrap());
    }
    seen
}

#[tokio::test]
async fn test_published_envelope_arrives_unchanged_over_sse() {
    let harness = Harness::memory().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = harness.hub.http();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut response = reqwest::get(format!("{base}/events/7")).await.unwrap();
    read_until(&mut response, "event: connection_established").await;

    let mut event = order_event(7, "paid").with_metadata("order_id", 812);
    event.data.insert("total".into(), json!(40000.5));
    event.data.insert("items".into(), json!([{"sku": "SKU-9", "qty": 1}]));
    harness.publish_order(&event).await;

    let body = read_until(&mut response, "\"seq\":1}").await;
    let frame = body
        .split("\n\n")
        .find(|f| f.starts_with("event: order.paid"))
        .unwrap();
    let data: String = frame
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .collect::<Vec<_>>()
        .join("\n");
    let wire: Value = serde_json::from_str(&data).unwrap();
    let original: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

    assert_eq!(wire["type"], original["event_type"]);
    for field in ["id", "tenant_id", "timestamp", "data", "metadata"] {
        assert_eq!(wire[field], original[field], "field {field}");
    }
    assert_eq!(wire["seq"], 1);
}
