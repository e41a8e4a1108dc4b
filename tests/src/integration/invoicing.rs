//! Client → queue → worker → provider → response scenarios.

#![allow(clippy::unwrap_used)]

use futures::future::join_all;
use hub_03_event_router::{StreamRequest, SubscriberFilter};
use hub_runtime::HubConfig;
use serde_json::json;
use shared_types::{CorrelationId, ErrorCode, InvoiceStatus, TenantId};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;

use super::fixtures::{invoice_request, siigo_integration, Harness, MockSiigo, WAIT};

fn fast_config() -> HubConfig {
    let mut config = HubConfig::default();
    config.coordinator.coordinator.request_timeout_secs = 2;
    config.coordinator.coordinator.retry_backoff_ms = 10;
    config
}

#[tokio::test]
async fn test_invoice_success() {
    let provider = MockSiigo::start(200, json!({"id": "x", "name": "FV-123", "metadata": {"cufe": "Z"}})).await;
    let harness = Harness::start(fast_config()).await;
    siigo_integration(&harness.hub, 42, 3, &provider.base_url).await;

    let response = timeout(WAIT, harness.hub.client().submit(invoice_request(42, "c1")))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, InvoiceStatus::Success);
    assert_eq!(response.external_id.as_deref(), Some("x"));
    assert_eq!(response.invoice_number.as_deref(), Some("FV-123"));
    assert_eq!(response.cufe.as_deref(), Some("Z"));
    assert_eq!(response.correlation_id.as_str(), "c1");
    assert_eq!(response.audit.request_url, format!("{}/v1/invoices", provider.base_url));
    assert_eq!(response.audit.response_status, 200);
    assert!(response.audit.response_body.contains("FV-123"));
    assert!(response.audit.request_payload.contains("SKU-9"));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_invoice_business_error_is_not_retried() {
    let provider = MockSiigo::start(400, json!({"Errors": [{"Message": "tax mismatch"}]})).await;
    let harness = Harness::start(fast_config()).await;
    siigo_integration(&harness.hub, 42, 3, &provider.base_url).await;

    let response = timeout(WAIT, harness.hub.client().submit(invoice_request(42, "c2")))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, InvoiceStatus::Error);
    assert_eq!(response.error_code, Some(ErrorCode::ProviderError));
    assert!(response.error.as_deref().unwrap().contains("tax mismatch"));
    assert_eq!(response.audit.response_status, 400);
    assert!(response.audit.is_populated());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_server_errors_retried_within_budget() {
    let provider = MockSiigo::start(503, json!({"message": "down"})).await;
    let harness = Harness::start(fast_config()).await;
    siigo_integration(&harness.hub, 42, 3, &provider.base_url).await;

    let response = timeout(WAIT, harness.hub.client().submit(invoice_request(42, "c3")))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.error_code, Some(ErrorCode::UpstreamError));
    assert_eq!(response.audit.response_status, 503);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_unknown_integration_answers_with_synthetic_audit() {
    let harness = Harness::start(fast_config()).await;

    let response = timeout(WAIT, harness.hub.client().submit(invoice_request(404, "c4")))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.error_code, Some(ErrorCode::IntegrationNotFound));
    assert_eq!(response.audit.response_status, 0);
    assert!(response.audit.is_populated());
}

#[tokio::test]
async fn test_concurrent_requests_keep_their_correlation() {
    let provider = MockSiigo::start(200, json!({"id": "x", "name": "FV-1"})).await;
    let harness = Harness::start(fast_config()).await;
    siigo_integration(&harness.hub, 42, 3, &provider.base_url).await;
    let client = harness.hub.client().clone();

    let submits = (0..10).map(|i| {
        let client = client.clone();
        async move { client.submit(invoice_request(42, &format!("req-{i}"))).await.unwrap() }
    });
    let responses = timeout(WAIT, join_all(submits)).await.unwrap();

    let ids: HashSet<String> = responses.iter().map(|r| r.correlation_id.as_str().to_string()).collect();
    assert_eq!(ids.len(), 10);
    for (i, response) in responses.iter().enumerate() {
        assert_eq!(response.correlation_id, CorrelationId::from(format!("req-{i}")));
    }
    assert_eq!(client.pending().pending_count(), 0);
}

#[tokio::test]
async fn test_invoice_outcome_streams_to_owning_tenant() {
    let provider = MockSiigo::start(200, json!({"id": "x", "name": "FV-123"})).await;
    let harness = Harness::start(fast_config()).await;
    siigo_integration(&harness.hub, 42, 3, &provider.base_url).await;
    let mut owner = harness.hub.router().open_stream(StreamRequest {
        tenant_id: TenantId(3),
        filter: SubscriberFilter::parse(None, Some("invoice.issued"), Some("812")).unwrap(),
        since_seq: None,
    });
    let mut other = harness.hub.router().open_stream(StreamRequest {
        tenant_id: TenantId(4),
        ..StreamRequest::default()
    });

    harness.hub.client().submit(invoice_request(42, "c6")).await.unwrap();

    let event = timeout(WAIT, owner.next_live()).await.unwrap().unwrap();
    assert_eq!(event.event_type(), "invoice.issued");
    assert_eq!(event.event.metadata_str("correlation_id").as_deref(), Some("c6"));
    assert!(timeout(Duration::from_millis(100), other.next_live()).await.is_err());
}

#[tokio::test]
async fn test_unanswered_provider_times_out() {
    let mut config = fast_config();
    // No worker for alegra: requests sit in the queue.
    config.coordinator.providers = vec!["siigo".into()];
    let harness = Harness::start(config).await;
    let mut request = invoice_request(42, "c7");
    request.provider = "alegra".into();

    let client = harness.hub.client().clone();
    let waited = tokio::spawn(async move { client.submit(request).await });
    // Deadline for a 2 s timeout with two retries at 10 ms backoff.
    let response = timeout(Duration::from_secs(10), waited).await.unwrap().unwrap().unwrap();
    assert_eq!(response.error_code, Some(ErrorCode::Timeout));
    assert!(response.audit.request_url.starts_with("queue://invoicing.alegra.requests"));
}
