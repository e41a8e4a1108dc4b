//! Test harness: a wired hub, a scripted provider and envelope builders.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use chrono::Utc;
use hub_01_credential_cache::{CachedIntegration, IntegrationType};
use hub_runtime::{Hub, HubConfig};
use serde_json::{json, Value};
use shared_bus::{InMemoryBroker, TopicBroker};
use shared_types::{
    CorrelationId, Customer, DomainEvent, EventFamily, EventType, IntegrationId, InvoiceData, InvoiceItem,
    InvoiceOperation, InvoiceRequest, JsonMap, TenantId,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(3);

pub struct Harness {
    pub hub: Hub,
    pub broker: Arc<InMemoryBroker>,
}

impl Harness {
    pub async fn start(config: HubConfig) -> Self {
        let broker = Arc::new(InMemoryBroker::new().with_poll_interval(Duration::from_millis(20)));
        let hub = Hub::start_with_broker(config, broker.clone()).await.unwrap();
        Self { hub, broker }
    }

    pub async fn memory() -> Self {
        Self::start(HubConfig::default()).await
    }

    /// Publish `event` on the orders state topic.
    pub async fn publish_order(&self, event: &DomainEvent) {
        let channel = self.hub.channels().orders();
        self.broker
            .publish(&channel, Bytes::from(event.to_json().unwrap()))
            .await
            .unwrap();
    }

    /// Wait until the router has sequenced `seq` events.
    pub async fn await_seq(&self, seq: u64) {
        let router = self.hub.router().clone();
        tokio::time::timeout(WAIT, async move {
            while router.last_seq() < seq {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}

pub fn order_event(tenant: u64, name: &str) -> DomainEvent {
    DomainEvent::new(EventType::new(EventFamily::Order, name).unwrap(), JsonMap::new()).with_tenant(TenantId(tenant))
}

/// Register a Siigo integration pointing at `base_url`.
pub async fn siigo_integration(hub: &Hub, id: u64, tenant: u64, base_url: &str) {
    let mut config = JsonMap::new();
    config.insert("base_url".into(), json!(base_url));
    config.insert("document_id".into(), json!(24446));
    hub.credentials()
        .put_integration(
            CachedIntegration::new(IntegrationId(id), Some(TenantId(tenant)), IntegrationType::Siigo).with_config(config),
            BTreeMap::from([
                ("username".to_string(), "api@shop.co".to_string()),
                ("access_key".to_string(), "k3y".to_string()),
            ]),
        )
        .await
        .unwrap();
}

pub fn invoice_request(integration_id: u64, correlation: &str) -> InvoiceRequest {
    InvoiceRequest {
        invoice_id: 3001,
        provider: "siigo".into(),
        operation: InvoiceOperation::Create,
        invoice_data: InvoiceData {
            integration_id: IntegrationId(integration_id),
            customer: Customer {
                name: "Ana Gomez".into(),
                dni: "1020304050".into(),
                ..Customer::default()
            },
            items: vec![InvoiceItem {
                sku: "SKU-9".into(),
                name: "Gorra".into(),
                qty: 1.0,
                unit_price: 40_000.0,
                total_price: 40_000.0,
                ..InvoiceItem::default()
            }],
            total: 40_000.0,
            subtotal: 40_000.0,
            tax: 0.0,
            discount: 0.0,
            shipping_cost: 0.0,
            currency: "COP".into(),
            order_id: 812,
            config: JsonMap::new(),
        },
        correlation_id: CorrelationId::from(correlation),
        timestamp: Utc::now(),
    }
}

/// Mock Siigo: token endpoint always succeeds, invoice endpoint answers
/// `status` with `body`. Counts invoice calls.
pub struct MockSiigo {
    pub base_url: String,
    pub invoice_calls: Arc<AtomicUsize>,
}

impl MockSiigo {
    pub async fn start(status: u16, body: Value) -> Self {
        let invoice_calls = Arc::new(AtomicUsize::new(0));
        let calls = invoice_calls.clone();
        let app = Router::new()
            .route(
                "/auth",
                post(|| async { Json(json!({"access_token": "tok", "expires_in": 86400})) }),
            )
            .route(
                "/v1/invoices",
                post(move || {
                    let body = body.clone();
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        (StatusCode::from_u16(status).unwrap(), Json(body))
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://{addr}"),
            invoice_calls,
        }
    }

    pub fn calls(&self) -> usize {
        self.invoice_calls.load(Ordering::SeqCst)
    }
}
