//! Provider worker: one per provider, owning its request queue.
//!
//! ```text
//! <family>.<provider>.requests ──▶ parse ──▶ CIC: integration + credentials
//!        ──▶ merge config ──▶ provider call (audited) ──▶ InvoiceResponse
//!        ──▶ <family>.<provider>.responses  (+ invoice.* on the invoicing state topic)
//!        ──▶ ack
//! ```
//!
//! Every consumed request yields exactly one response, including malformed
//! ones. The request is nacked only when the response could not be
//! published, so the broker redelivers it.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use hub_01_credential_cache::{CacheError, CredentialCacheApi};
use hub_telemetry::metrics::{INVOICE_PROCESSING_SECONDS, INVOICE_REQUESTS};
use serde_json::Value;
use shared_bus::{
    consume, Ack, Broker, ChannelNames, Delivery, ProviderFamily, QueueHandler, TopicBroker, WorkQueue,
};
use shared_types::{
    CorrelationId, DomainEvent, EventFamily, EventType, IntegrationId, InvoiceRequest, InvoiceResponse,
    InvoiceStatus, JsonMap, TenantId,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::{
    merge_config, synthetic_audit, CoordinatorError, Credentials, ProviderCall, ProviderOutcome,
};
use crate::ports::InvoiceProvider;

/// Where the invoicing state event for a response belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateContext {
    pub tenant_id: Option<TenantId>,
    pub integration_id: IntegrationId,
    pub order_id: u64,
}

pub struct InvoiceWorker {
    provider: Arc<dyn InvoiceProvider>,
    credentials: Arc<dyn CredentialCacheApi>,
    broker: Arc<dyn Broker>,
    channels: ChannelNames,
    family: ProviderFamily,
}

impl InvoiceWorker {
    #[must_use]
    pub fn new(
        provider: Arc<dyn InvoiceProvider>,
        credentials: Arc<dyn CredentialCacheApi>,
        broker: Arc<dyn Broker>,
        channels: ChannelNames,
    ) -> Self {
        Self {
            provider,
            credentials,
            broker,
            channels,
            family: ProviderFamily::Invoicing,
        }
    }

    #[must_use]
    pub fn provider_code(&self) -> &'static str {
        self.provider.code()
    }

    #[must_use]
    pub fn request_queue(&self) -> String {
        self.family.request_queue(self.provider.code())
    }

    #[must_use]
    pub fn response_channel(&self) -> String {
        self.family.response_channel(self.provider.code())
    }

    /// Declare the request queue and consume it until shutdown. Returns the
    /// number of requests handled.
    pub async fn run(
        self: Arc<Self>,
        consumer: &str,
        shutdown: watch::Receiver<bool>,
    ) -> Result<u64, CoordinatorError> {
        let queue = self.request_queue();
        self.broker.declare_queue(&queue, true).await?;
        info!(provider = self.provider.code(), queue = %queue, consumer, "Invoice worker started");
        let broker = self.broker.clone();
        Ok(consume(broker, &queue, consumer, self, shutdown).await)
    }

    /// Turn one raw request into its response.
    pub async fn process(&self, payload: &[u8]) -> (InvoiceResponse, Option<StateContext>) {
        let request: InvoiceRequest = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => return (self.malformed(payload, &e.to_string()), None),
        };
        let integration_id = request.integration_id();
        let no_config = JsonMap::new();

        if request.provider != self.provider.code() {
            let error = CacheError::ProviderMismatch {
                integration_id,
                expected: self.provider.code().to_string(),
                actual: request.provider.clone(),
            };
            return (self.before_call(&request, &no_config, error.into()), None);
        }

        let integration = match self
            .credentials
            .get_active_integration(integration_id, self.provider.code())
            .await
        {
            Ok(integration) => integration,
            Err(e) => return (self.before_call(&request, &no_config, e.into()), None),
        };
        let context = StateContext {
            tenant_id: integration.tenant_id,
            integration_id,
            order_id: request.invoice_data.order_id,
        };
        let config = merge_config(&integration.config, &request.invoice_data.config);

        let mut credentials = Credentials::default();
        for field in self.provider.integration_type().required_fields() {
            match self.credentials.get_credential_field(integration_id, field).await {
                Ok(value) => credentials.insert(*field, value),
                Err(e) => return (self.before_call(&request, &config, e.into()), Some(context)),
            }
        }

        let outcome = self
            .provider
            .issue(ProviderCall {
                request: &request,
                integration_id,
                credentials: &credentials,
                config: &config,
            })
            .await;
        (respond(&request, outcome), Some(context))
    }

    fn malformed(&self, payload: &[u8], reason: &str) -> InvoiceResponse {
        // Echo whatever identifies the request so the producer can correlate.
        let raw: Value = serde_json::from_slice(payload).unwrap_or(Value::Null);
        let error = CoordinatorError::MalformedRequest(reason.to_string());
        let audit = synthetic_audit(
            format!("queue://{}", self.request_queue()),
            String::from_utf8_lossy(payload).into_owned(),
            &error,
        );
        InvoiceResponse::failure(
            raw["invoice_id"].as_u64().unwrap_or(0),
            self.provider.code(),
            CorrelationId::from(raw["correlation_id"].as_str().unwrap_or_default()),
            error.error_code(),
            error.to_string(),
            audit,
        )
    }

    fn before_call(&self, request: &InvoiceRequest, config: &JsonMap, error: CoordinatorError) -> InvoiceResponse {
        let payload = serde_json::to_string(&request.invoice_data).unwrap_or_default();
        let outcome = ProviderOutcome::before_call(self.provider.invoice_url(config), payload, error);
        respond(request, outcome)
    }

    async fn publish(&self, response: &InvoiceResponse, context: Option<StateContext>) -> Result<(), CoordinatorError> {
        let body = serde_json::to_vec(response).map_err(|e| CoordinatorError::MalformedRequest(e.to_string()))?;
        self.broker
            .publish(&self.response_channel(), Bytes::from(body))
            .await?;

        if let Some(context) = context {
            match state_event(response, context) {
                Some(event) => {
                    let topic = self.channels.invoicing();
                    let payload = event.to_json().map(Bytes::from);
                    let published = match payload {
                        Ok(payload) => self.broker.publish(&topic, payload).await.map(|_| ()),
                        Err(e) => {
                            warn!(error = %e, "Invoice state event not serializable");
                            Ok(())
                        }
                    };
                    if let Err(e) = published {
                        warn!(topic = %topic, error = %e, "Invoice state event not published");
                    }
                }
                None => debug!(correlation_id = %response.correlation_id, "No state event for response"),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl QueueHandler for InvoiceWorker {
    async fn handle(&self, delivery: &Delivery) -> Ack {
        let started = Instant::now();
        let (response, context) = self.process(&delivery.payload).await;
        let provider = self.provider.code();
        let status = if response.is_success() { "success" } else { "error" };

        match self.publish(&response, context).await {
            Ok(()) => {
                INVOICE_REQUESTS.with_label_values(&[provider, status]).inc();
                INVOICE_PROCESSING_SECONDS
                    .with_label_values(&[provider])
                    .observe(started.elapsed().as_secs_f64());
                info!(
                    provider,
                    invoice_id = response.invoice_id,
                    correlation_id = %response.correlation_id,
                    status,
                    error_code = response.error_code.map(|c| c.as_str()),
                    redelivered = delivery.redelivered,
                    "Invoice request handled"
                );
                Ack::Ack
            }
            Err(e) => {
                warn!(
                    provider,
                    correlation_id = %response.correlation_id,
                    error = %e,
                    "Response not published, request will be redelivered"
                );
                Ack::Nack
            }
        }
    }
}

fn respond(request: &InvoiceRequest, outcome: ProviderOutcome) -> InvoiceResponse {
    let elapsed = (Utc::now() - request.timestamp).num_milliseconds();
    let processing_time_ms = u64::try_from(elapsed).unwrap_or(0);

    let mut response = match outcome.result {
        Ok(issued) => InvoiceResponse {
            invoice_id: request.invoice_id,
            provider: request.provider.clone(),
            status: InvoiceStatus::Success,
            invoice_number: issued.invoice_number,
            external_id: Some(issued.external_id),
            cufe: issued.cufe,
            issued_at: issued.issued_at,
            public_url: issued.public_url,
            error: None,
            error_code: None,
            correlation_id: request.correlation_id.clone(),
            timestamp: Utc::now(),
            processing_time_ms: 0,
            audit: outcome.audit,
        },
        Err(error) => InvoiceResponse::failure(
            request.invoice_id,
            &request.provider,
            request.correlation_id.clone(),
            error.error_code(),
            error.to_string(),
            outcome.audit,
        ),
    };
    response.processing_time_ms = processing_time_ms;
    response
}

/// `invoice.issued` / `invoice.failed` for the router.
fn state_event(response: &InvoiceResponse, context: StateContext) -> Option<DomainEvent> {
    let name = if response.is_success() { "issued" } else { "failed" };
    let event_type = EventType::new(EventFamily::Invoice, name).ok()?;
    let data = match serde_json::to_value(response).ok()? {
        Value::Object(map) => map,
        _ => return None,
    };

    let mut event = DomainEvent::new(event_type, data)
        .with_integration(context.integration_id)
        .with_metadata("correlation_id", response.correlation_id.as_str())
        .with_metadata("invoice_id", response.invoice_id)
        .with_metadata("order_id", context.order_id.to_string());
    if let Some(tenant) = context.tenant_id {
        event = event.with_tenant(tenant);
    }
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{HttpClient, SiigoProvider};
    use crate::config::CoordinatorConfig;
    use crate::testing::{credential_cache, sample_request, serve};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use futures::StreamExt;
    use hub_01_credential_cache::{CachedIntegration, CredentialCacheService, IntegrationType};
    use serde_json::json;
    use shared_bus::InMemoryBroker;
    use shared_types::ErrorCode;
    use std::collections::BTreeMap;
    use std::time::Duration;

    async fn siigo_mock(status: u16, body: Value) -> String {
        let app = Router::new()
            .route(
                "/auth",
                post(|| async { Json(json!({"access_token": "tok", "expires_in": 86400})) }),
            )
            .route(
                "/v1/invoices",
                post(move || {
                    let body = body.clone();
                    async move { (StatusCode::from_u16(status).unwrap(), Json(body)) }
                }),
            );
        serve(app).await
    }

    async fn worker(base: &str) -> (InvoiceWorker, Arc<CredentialCacheService>, Arc<InMemoryBroker>) {
        let cache = credential_cache();
        let mut config = JsonMap::new();
        config.insert("base_url".into(), json!(base));
        config.insert("document_id".into(), json!(1));
        cache
            .put_integration(
                CachedIntegration::new(IntegrationId(42), Some(TenantId(3)), IntegrationType::Siigo)
                    .with_config(config),
                BTreeMap::from([
                    ("username".to_string(), "api@shop.co".to_string()),
                    ("access_key".to_string(), "k3y".to_string()),
                ]),
            )
            .await
            .unwrap();

        let coordinator = CoordinatorConfig {
            max_retries: 0,
            request_timeout_secs: 2,
            ..CoordinatorConfig::default()
        };
        let provider = Arc::new(SiigoProvider::new(
            HttpClient::new(&coordinator).unwrap(),
            coordinator.token_safety(),
        ));
        let broker = Arc::new(InMemoryBroker::new());
        let worker = InvoiceWorker::new(provider, cache.clone(), broker.clone(), ChannelNames::default());
        (worker, cache, broker)
    }

    fn payload(request: &InvoiceRequest) -> Vec<u8> {
        serde_json::to_vec(request).unwrap()
    }

    #[tokio::test]
    async fn test_success_response_and_context() {
        let base = siigo_mock(200, json!({"id": "x", "name": "FV-123", "metadata": {"cufe": "Z"}})).await;
        let (worker, _, _) = worker(&base).await;

        let (response, context) = worker.process(&payload(&sample_request("siigo", 42, "c1"))).await;
        assert_eq!(response.status, InvoiceStatus::Success);
        assert_eq!(response.external_id.as_deref(), Some("x"));
        assert_eq!(response.invoice_number.as_deref(), Some("FV-123"));
        assert_eq!(response.cufe.as_deref(), Some("Z"));
        assert_eq!(response.correlation_id.as_str(), "c1");
        assert!(response.audit.is_populated());
        assert_eq!(context.unwrap().tenant_id, Some(TenantId(3)));
    }

    #[tokio::test]
    async fn test_unknown_integration() {
        let (worker, _, _) = worker("http://127.0.0.1:9").await;
        let (response, context) = worker.process(&payload(&sample_request("siigo", 99, "c2"))).await;
        assert_eq!(response.error_code, Some(ErrorCode::IntegrationNotFound));
        assert!(response.audit.is_populated());
        assert!(context.is_none());
    }

    #[tokio::test]
    async fn test_wrong_provider_for_queue() {
        let (worker, _, _) = worker("http://127.0.0.1:9").await;
        let (response, _) = worker.process(&payload(&sample_request("alegra", 42, "c3"))).await;
        assert_eq!(response.error_code, Some(ErrorCode::ProviderMismatch));
    }

    #[tokio::test]
    async fn test_malformed_request_still_answered() {
        let (worker, _, _) = worker("http://127.0.0.1:9").await;
        let (response, _) = worker
            .process(br#"{"invoice_id": 5, "correlation_id": "c4", "provider": "siigo"}"#)
            .await;
        assert_eq!(response.error_code, Some(ErrorCode::MalformedRequest));
        assert_eq!(response.invoice_id, 5);
        assert_eq!(response.correlation_id.as_str(), "c4");
    }

    #[tokio::test]
    async fn test_handle_publishes_response_and_state_event() {
        let base = siigo_mock(400, json!({"Errors": [{"Message": "tax mismatch"}]})).await;
        let (worker, _, broker) = worker(&base).await;
        let mut responses = broker.subscribe(&worker.response_channel()).await.unwrap();
        let mut states = broker.subscribe(&ChannelNames::default().invoicing()).await.unwrap();

        let delivery = Delivery {
            queue: worker.request_queue(),
            id: "1".into(),
            payload: Bytes::from(payload(&sample_request("siigo", 42, "c5"))),
            redelivered: false,
        };
        assert_eq!(worker.handle(&delivery).await, Ack::Ack);

        let raw = tokio::time::timeout(Duration::from_secs(1), responses.next()).await.unwrap().unwrap();
        let response: InvoiceResponse = serde_json::from_slice(&raw).unwrap();
        assert_eq!(response.status, InvoiceStatus::Error);
        assert!(response.error.unwrap().contains("tax mismatch"));

        let raw = tokio::time::timeout(Duration::from_secs(1), states.next()).await.unwrap().unwrap();
        let event = DomainEvent::from_slice(&raw).unwrap();
        assert_eq!(event.event_type, "invoice.failed");
        assert_eq!(event.tenant_id, Some(TenantId(3)));
        assert_eq!(event.metadata_str("correlation_id").as_deref(), Some("c5"));
    }

    #[tokio::test]
    async fn test_unpublishable_response_is_nacked() {
        let (worker, _, broker) = worker("http://127.0.0.1:9").await;
        broker.disconnect();
        let delivery = Delivery {
            queue: worker.request_queue(),
            id: "1".into(),
            payload: Bytes::from(payload(&sample_request("siigo", 99, "c6"))),
            redelivered: false,
        };
        assert_eq!(worker.handle(&delivery).await, Ack::Nack);
    }
}
