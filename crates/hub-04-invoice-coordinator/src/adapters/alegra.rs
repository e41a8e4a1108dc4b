//! Alegra: HTTP basic auth with the account email and API token.
//!
//! Success bodies carry `{id, date, numberTemplate: {fullNumber}, stamp: {cufe}}`;
//! failures carry `{message, code}`.

use async_trait::async_trait;
use hub_01_credential_cache::IntegrationType;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{InvoiceRequest, JsonMap};

use super::http::{CallAuth, HttpClient, OutboundCall};
use super::{classify, text_field};
use crate::domain::{typed_config, CoordinatorError, IssuedInvoice, ProviderCall, ProviderOutcome};
use crate::ports::InvoiceProvider;

pub const ALEGRA_BASE_URL: &str = "https://api.alegra.com/api/v1";

fn default_base_url() -> String {
    ALEGRA_BASE_URL.to_string()
}

fn default_payment_form() -> String {
    "CASH".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlegraConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub number_template_id: Option<u64>,
    #[serde(default = "default_payment_form")]
    pub payment_form: String,
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Ask Alegra to stamp the invoice with the tax authority.
    #[serde(default = "default_true")]
    pub generate_stamp: bool,
}

impl AlegraConfig {
    fn invoices_url(&self) -> String {
        format!("{}/invoices", self.base_url.trim_end_matches('/'))
    }
}

pub struct AlegraProvider {
    http: HttpClient,
}

impl AlegraProvider {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl InvoiceProvider for AlegraProvider {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Alegra
    }

    fn invoice_url(&self, config: &JsonMap) -> String {
        typed_config::<AlegraConfig>(config)
            .map(|c| c.invoices_url())
            .unwrap_or_else(|_| format!("{ALEGRA_BASE_URL}/invoices"))
    }

    async fn issue(&self, call: ProviderCall<'_>) -> ProviderOutcome {
        let body = serde_json::to_string(&call.request.invoice_data).unwrap_or_default();
        let config: AlegraConfig = match typed_config(call.config) {
            Ok(config) => config,
            Err(e) => return ProviderOutcome::before_call(self.invoice_url(call.config), body, e),
        };
        let (email, token) = match (call.credentials.get("email"), call.credentials.get("token")) {
            (Ok(email), Ok(token)) => (email, token),
            (Err(e), _) | (_, Err(e)) => {
                return ProviderOutcome::before_call(config.invoices_url(), body, e)
            }
        };

        let outbound = OutboundCall::post(config.invoices_url(), invoice_body(&config, call.request))
            .with_auth(CallAuth::Basic {
                user: email.to_string(),
                password: token.to_string(),
            });
        classify(self.http.send(&outbound).await, parse_invoice, parse_error)
    }
}

fn invoice_body(config: &AlegraConfig, request: &InvoiceRequest) -> Value {
    let data = &request.invoice_data;
    let date = request.timestamp.date_naive().to_string();
    let items: Vec<Value> = data
        .items
        .iter()
        .map(|item| {
            let mut line = json!({
                "name": item.name,
                "reference": item.sku,
                "price": item.unit_price,
                "quantity": item.qty,
                "discount": item.discount,
            });
            if let Some(id) = item.product_id {
                line["id"] = json!(id);
            }
            if let Some(description) = &item.description {
                line["description"] = json!(description);
            }
            line
        })
        .collect();

    let mut body = json!({
        "date": date,
        "dueDate": date,
        "client": {
            "identification": data.customer.dni,
            "name": data.customer.name,
            "email": data.customer.email,
            "phonePrimary": data.customer.phone,
            "address": { "address": data.customer.address },
        },
        "items": items,
        "paymentForm": config.payment_form,
        "observations": format!("Order {}", data.order_id),
        "stamp": { "generateStamp": config.generate_stamp },
    });
    if let Some(template) = config.number_template_id {
        body["numberTemplate"] = json!({ "id": template });
    }
    if let Some(method) = &config.payment_method {
        body["paymentMethod"] = json!(method);
    }
    body
}

fn parse_invoice(body: &Value) -> Option<IssuedInvoice> {
    Some(IssuedInvoice {
        external_id: text_field(&body["id"])?,
        invoice_number: text_field(&body["numberTemplate"]["fullNumber"]),
        cufe: text_field(&body["stamp"]["cufe"]),
        issued_at: text_field(&body["date"]),
        public_url: None,
    })
}

fn parse_error(body: &Value) -> Option<String> {
    let message = text_field(&body["message"])?;
    Some(match text_field(&body["code"]) {
        Some(code) => format!("{code}: {message}"),
        None => message,
    })
}
