//! Siigo: token auth, invoices at `/v1/invoices`.
//!
//! Success bodies carry `{id, name, date, metadata: {cufe}}`; failures carry
//! `{Errors: [{Code, Message}]}`.

use async_trait::async_trait;
use hub_01_credential_cache::IntegrationType;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{AuditBlock, IntegrationId, InvoiceRequest, JsonMap};
use std::time::Duration;
use zeroize::Zeroizing;

use super::http::{CallAuth, HttpClient, OutboundCall};
use super::{classify, text_field};
use crate::domain::{
    typed_config, CoordinatorError, IssuedInvoice, IssuedToken, ProviderCall, ProviderOutcome, TokenCache,
};
use crate::ports::InvoiceProvider;

pub const SIIGO_BASE_URL: &str = "https://api.siigo.com";
const DEFAULT_PARTNER_ID: &str = "commercehub";

fn default_base_url() -> String {
    SIIGO_BASE_URL.to_string()
}

fn default_partner_id() -> String {
    DEFAULT_PARTNER_ID.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiigoConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_partner_id")]
    pub partner_id: String,
    /// Invoice document type configured in the Siigo account.
    pub document_id: u64,
    #[serde(default)]
    pub seller_id: Option<u64>,
    #[serde(default)]
    pub payment_method_id: Option<u64>,
    #[serde(default)]
    pub tax_id: Option<u64>,
}

impl SiigoConfig {
    fn invoices_url(&self) -> String {
        format!("{}/v1/invoices", self.base_url.trim_end_matches('/'))
    }

    fn auth_url(&self) -> String {
        format!("{}/auth", self.base_url.trim_end_matches('/'))
    }
}

/// Auth failure together with the exchange that produced it.
struct AuthFailure {
    error: CoordinatorError,
    audit: AuditBlock,
}

pub struct SiigoProvider {
    http: HttpClient,
    tokens: TokenCache,
}

impl SiigoProvider {
    #[must_use]
    pub fn new(http: HttpClient, token_safety: Duration) -> Self {
        Self {
            http,
            tokens: TokenCache::new(token_safety),
        }
    }

    async fn authenticate(
        &self,
        config: &SiigoConfig,
        username: &str,
        access_key: &str,
    ) -> Result<IssuedToken, AuthFailure> {
        let call = OutboundCall::post(
            config.auth_url(),
            json!({ "username": username, "access_key": access_key }),
        )
        .with_header("Partner-Id", config.partner_id.clone());
        let outcome = self.http.send(&call).await;
        // Never keep the access key in an audit.
        let mut audit = outcome.audit;
        audit.request_payload = json!({ "username": username, "access_key": "***" }).to_string();

        let reply = outcome.result.map_err(|error| AuthFailure {
            error,
            audit: audit.clone(),
        })?;
        let body = reply.json();
        let token = body["access_token"].as_str().filter(|t| !t.is_empty());
        match (reply.is_success(), token) {
            (true, Some(token)) => Ok(IssuedToken {
                token: Zeroizing::new(token.to_string()),
                expires_in: Duration::from_secs(body["expires_in"].as_u64().unwrap_or(0)),
            }),
            _ => Err(AuthFailure {
                error: CoordinatorError::AuthFailed(
                    parse_errors(&body).unwrap_or_else(|| format!("auth returned status {}", reply.status)),
                ),
                audit,
            }),
        }
    }

    async fn token(
        &self,
        id: IntegrationId,
        config: &SiigoConfig,
        call: &ProviderCall<'_>,
    ) -> Result<Zeroizing<String>, AuthFailure> {
        let fail = |error| AuthFailure {
            audit: crate::domain::synthetic_audit(config.auth_url(), String::new(), &error),
            error,
        };
        let username = call.credentials.get("username").map_err(fail)?;
        let access_key = call.credentials.get("access_key").map_err(fail)?;
        self.tokens
            .get_or_refresh(id, || self.authenticate(config, username, access_key))
            .await
    }
}

#[async_trait]
impl InvoiceProvider for SiigoProvider {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Siigo
    }

    fn invoice_url(&self, config: &JsonMap) -> String {
        typed_config::<SiigoConfig>(config)
            .map(|c| c.invoices_url())
            .unwrap_or_else(|_| format!("{SIIGO_BASE_URL}/v1/invoices"))
    }

    async fn issue(&self, call: ProviderCall<'_>) -> ProviderOutcome {
        let config: SiigoConfig = match typed_config(call.config) {
            Ok(config) => config,
            Err(e) => {
                let payload = serde_json::to_string(&call.request.invoice_data).unwrap_or_default();
                return ProviderOutcome::before_call(self.invoice_url(call.config), payload, e);
            }
        };

        // Captured once; a concurrent refresh cannot change it mid-request.
        let token = match self.token(call.integration_id, &config, &call).await {
            Ok(token) => token,
            Err(AuthFailure { error, audit }) => {
                return ProviderOutcome {
                    result: Err(error),
                    audit,
                }
            }
        };

        let outbound = OutboundCall::post(config.invoices_url(), invoice_body(&config, call.request))
            .with_auth(CallAuth::Bearer(token.to_string()))
            .with_header("Partner-Id", config.partner_id.clone());
        let outcome = classify(self.http.send(&outbound).await, parse_invoice, parse_errors);

        if matches!(outcome.result, Err(CoordinatorError::AuthFailed(_))) {
            self.tokens.invalidate(call.integration_id).await;
        }
        outcome
    }
}

fn invoice_body(config: &SiigoConfig, request: &InvoiceRequest) -> Value {
    let data = &request.invoice_data;
    let date = request.timestamp.date_naive().to_string();
    let taxes: Vec<Value> = config.tax_id.map(|id| json!({ "id": id })).into_iter().collect();
    let items: Vec<Value> = data
        .items
        .iter()
        .map(|item| {
            json!({
                "code": item.sku,
                "description": item.description.as_deref().unwrap_or(&item.name),
                "quantity": item.qty,
                "price": item.unit_price,
                "discount": item.discount,
                "taxes": taxes,
            })
        })
        .collect();

    let mut body = json!({
        "document": { "id": config.document_id },
        "date": date,
        "customer": { "identification": data.customer.dni, "branch_office": 0 },
        "items": items,
        "observations": format!("Order {}", data.order_id),
    });
    if let Some(seller) = config.seller_id {
        body["seller"] = json!(seller);
    }
    if let Some(method) = config.payment_method_id {
        body["payments"] = json!([{ "id": method, "value": data.total, "due_date": date }]);
    }
    body
}

fn parse_invoice(body: &Value) -> Option<IssuedInvoice> {
    Some(IssuedInvoice {
        external_id: text_field(&body["id"])?,
        invoice_number: text_field(&body["name"]),
        cufe: text_field(&body["metadata"]["cufe"]),
        issued_at: text_field(&body["date"]),
        public_url: text_field(&body["public_url"]),
    })
}

fn parse_errors(body: &Value) -> Option<String> {
    let messages: Vec<String> = body["Errors"]
        .as_array()?
        .iter()
        .filter_map(|e| {
            let message = text_field(&e["Message"])?;
            Some(match text_field(&e["Code"]) {
                Some(code) => format!("{code}: {message}"),
                None => message,
            })
        })
        .collect();
    (!messages.is_empty()).then(|| messages.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::domain::Credentials;
    use crate::testing::{sample_request, serve};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn provider() -> SiigoProvider {
        let config = CoordinatorConfig {
            max_retries: 0,
            request_timeout_secs: 2,
            ..CoordinatorConfig::default()
        };
        SiigoProvider::new(HttpClient::new(&config).unwrap(), Duration::from_secs(1800))
    }

    fn credentials() -> Credentials {
        let mut creds = Credentials::default();
        creds.insert("username", "api@shop.co".into());
        creds.insert("access_key", "k3y".into());
        creds
    }

    fn config(base: &str) -> JsonMap {
        let mut config = JsonMap::new();
        config.insert("base_url".into(), json!(base));
        config.insert("document_id".into(), json!(24446));
        config
    }

    struct Mock {
        auth_hits: Arc<AtomicUsize>,
        invoice_hits: Arc<AtomicUsize>,
    }

    async fn mock(invoice_status: u16, invoice_body: Value) -> (String, Mock) {
        let auth_hits = Arc::new(AtomicUsize::new(0));
        let invoice_hits = Arc::new(AtomicUsize::new(0));
        let (a, i) = (auth_hits.clone(), invoice_hits.clone());
        let app = Router::new()
            .route(
                "/auth",
                post(move |Json(body): Json<Value>| {
                    let a = a.clone();
                    async move {
                        a.fetch_add(1, Ordering::SeqCst);
                        if body["access_key"] == "k3y" {
                            (StatusCode::OK, Json(json!({"access_token": "tok", "expires_in": 86400})))
                        } else {
                            (StatusCode::UNAUTHORIZED, Json(json!({"Errors": [{"Code": "invalid_grant", "Message": "bad key"}]})))
                        }
                    }
                }),
            )
            .route(
                "/v1/invoices",
                post(move |headers: HeaderMap| {
                    let i = i.clone();
                    let body = invoice_body.clone();
                    async move {
                        i.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(headers["authorization"], "Bearer tok");
                        assert_eq!(headers["partner-id"], "commercehub");
                        (StatusCode::from_u16(invoice_status).unwrap(), Json(body))
                    }
                }),
            );
        (serve(app).await, Mock { auth_hits, invoice_hits })
    }

    #[tokio::test]
    async fn test_success_maps_fields_and_reuses_token() {
        let (base, mock) = mock(200, json!({"id": "x", "name": "FV-123", "date": "2024-05-01", "metadata": {"cufe": "Z"}})).await;
        let provider = provider();
        let request = sample_request("siigo", 42, "c1");
        let creds = credentials();
        let config = config(&base);

        for _ in 0..2 {
            let outcome = provider
                .issue(ProviderCall {
                    request: &request,
                    integration_id: IntegrationId(42),
                    credentials: &creds,
                    config: &config,
                })
                .await;
            let issued = outcome.result.unwrap();
            assert_eq!(issued.external_id, "x");
            assert_eq!(issued.invoice_number.as_deref(), Some("FV-123"));
            assert_eq!(issued.cufe.as_deref(), Some("Z"));
            assert_eq!(outcome.audit.request_url, format!("{base}/v1/invoices"));
            assert_eq!(outcome.audit.response_status, 200);
            assert!(outcome.audit.request_payload.contains("\"id\":24446"));
        }
        assert_eq!(mock.auth_hits.load(Ordering::SeqCst), 1);
        assert_eq!(mock.invoice_hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_business_error_not_retried() {
        let (base, mock) = mock(400, json!({"Errors": [{"Message": "tax mismatch"}]})).await;
        let request = sample_request("siigo", 42, "c1");
        let creds = credentials();
        let outcome = provider()
            .issue(ProviderCall {
                request: &request,
                integration_id: IntegrationId(42),
                credentials: &creds,
                config: &config(&base),
            })
            .await;

        match outcome.result {
            Err(CoordinatorError::Provider { status: 400, message }) => assert_eq!(message, "tax mismatch"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(outcome.audit.is_populated());
        assert_eq!(mock.invoice_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let (base, _mock) = mock(429, json!({})).await;
        let request = sample_request("siigo", 42, "c1");
        let creds = credentials();
        let outcome = provider()
            .issue(ProviderCall {
                request: &request,
                integration_id: IntegrationId(42),
                credentials: &creds,
                config: &config(&base),
            })
            .await;
        assert_eq!(outcome.result.unwrap_err(), CoordinatorError::RateLimited);
    }

    #[tokio::test]
    async fn test_auth_failure_carries_auth_exchange_without_secret() {
        let (base, mock) = mock(200, json!({"id": "x"})).await;
        let request = sample_request("siigo", 42, "c1");
        let mut creds = Credentials::default();
        creds.insert("username", "api@shop.co".into());
        creds.insert("access_key", "wrong".into());

        let outcome = provider()
            .issue(ProviderCall {
                request: &request,
                integration_id: IntegrationId(42),
                credentials: &creds,
                config: &config(&base),
            })
            .await;
        match outcome.result {
            Err(CoordinatorError::AuthFailed(message)) => assert!(message.contains("bad key")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(outcome.audit.request_url, format!("{base}/auth"));
        assert_eq!(outcome.audit.response_status, 401);
        assert!(!outcome.audit.request_payload.contains("wrong"));
        assert_eq!(mock.invoice_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_call() {
        let request = sample_request("siigo", 42, "c1");
        let creds = credentials();
        let mut config = JsonMap::new();
        config.insert("document_id".into(), json!("not-a-number"));

        let outcome = provider()
            .issue(ProviderCall {
                request: &request,
                integration_id: IntegrationId(42),
                credentials: &creds,
                config: &config,
            })
            .await;
        assert_eq!(outcome.result.unwrap_err().error_code().as_str(), "invalid_config");
        assert_eq!(outcome.audit.request_url, format!("{SIIGO_BASE_URL}/v1/invoices"));
        assert!(outcome.audit.is_populated());
    }
}
