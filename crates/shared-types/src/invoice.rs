//! # Invoice Request / Response Envelopes
//!
//! Jobs travel on `invoicing.<provider>.requests`; results come back on
//! `invoicing.<provider>.responses` and are mirrored onto the invoicing state
//! topic so live dashboards see them.

use crate::errors::ErrorCode;
use crate::event::JsonMap;
use crate::ids::{CorrelationId, IntegrationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceOperation {
    Create,
    Retry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub dni: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub sku: String,
    pub name: String,
    pub qty: f64,
    pub unit_price: f64,
    pub total_price: f64,
    #[serde(default)]
    pub tax: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<f64>,
    #[serde(default)]
    pub discount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Business payload of an invoice job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceData {
    pub integration_id: IntegrationId,
    pub customer: Customer,
    pub items: Vec<InvoiceItem>,
    pub total: f64,
    pub subtotal: f64,
    #[serde(default)]
    pub tax: f64,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub shipping_cost: f64,
    pub currency: String,
    pub order_id: u64,
    /// Request-level provider config; wins over integration config.
    #[serde(default)]
    pub config: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub invoice_id: u64,
    pub provider: String,
    pub operation: InvoiceOperation,
    pub invoice_data: InvoiceData,
    pub correlation_id: CorrelationId,
    pub timestamp: DateTime<Utc>,
}

impl InvoiceRequest {
    #[must_use]
    pub fn integration_id(&self) -> IntegrationId {
        self.invoice_data.integration_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Success,
    Error,
}

/// Captured HTTP exchange attached to every outcome.
///
/// Failures that happen before any HTTP call (unknown integration, bad
/// credentials) still fill the block: `request_url` names the endpoint the
/// call would have used, status is `0` and `response_body` carries the error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditBlock {
    #[serde(rename = "audit_request_url", default)]
    pub request_url: String,
    #[serde(rename = "audit_request_payload", default)]
    pub request_payload: String,
    #[serde(rename = "audit_response_status", default)]
    pub response_status: u16,
    #[serde(rename = "audit_response_body", default)]
    pub response_body: String,
}

impl AuditBlock {
    #[must_use]
    pub fn is_populated(&self) -> bool {
        !self.request_url.is_empty()
            && !self.request_payload.is_empty()
            && !self.response_body.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub invoice_id: u64,
    pub provider: String,
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cufe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub correlation_id: CorrelationId,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: u64,
    #[serde(flatten)]
    pub audit: AuditBlock,
}

impl InvoiceResponse {
    /// Error response with the given audit block.
    #[must_use]
    pub fn failure(
        invoice_id: u64,
        provider: &str,
        correlation_id: CorrelationId,
        code: ErrorCode,
        message: impl Into<String>,
        audit: AuditBlock,
    ) -> Self {
        Self {
            invoice_id,
            provider: provider.to_string(),
            status: InvoiceStatus::Error,
            invoice_number: None,
            external_id: None,
            cufe: None,
            issued_at: None,
            public_url: None,
            error: Some(message.into()),
            error_code: Some(code),
            correlation_id,
            timestamp: Utc::now(),
            processing_time_ms: 0,
            audit,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == InvoiceStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_json() -> serde_json::Value {
        json!({
            "invoice_id": 9,
            "provider": "siigo",
            "operation": "create",
            "invoice_data": {
                "integration_id": 42,
                "customer": {"name": "Ana", "email": "ana@example.com", "phone": "", "dni": "123", "address": "Calle 1"},
                "items": [{"sku": "A1", "name": "Shirt", "qty": 2, "unit_price": 50.0, "total_price": 100.0, "tax": 19.0, "discount": 0}],
                "total": 119.0,
                "subtotal": 100.0,
                "tax": 19.0,
                "discount": 0,
                "shipping_cost": 0,
                "currency": "COP",
                "order_id": 77,
                "config": {"document_id": 24446}
            },
            "correlation_id": "c1",
            "timestamp": "2024-05-01T10:00:00Z"
        })
    }

    #[test]
    fn test_request_envelope_parses() {
        let request: InvoiceRequest = serde_json::from_value(request_json()).unwrap();
        assert_eq!(request.integration_id(), IntegrationId(42));
        assert_eq!(request.operation, InvoiceOperation::Create);
        assert_eq!(request.correlation_id.as_str(), "c1");
        assert_eq!(request.invoice_data.items[0].qty, 2.0);
    }

    #[test]
    fn test_unknown_operation_is_rejected() {
        let mut raw = request_json();
        raw["operation"] = json!("delete");
        assert!(serde_json::from_value::<InvoiceRequest>(raw).is_err());
    }

    #[test]
    fn test_response_audit_fields_are_flat() {
        let response = InvoiceResponse::failure(
            9,
            "siigo",
            CorrelationId::from("c1"),
            ErrorCode::ProviderError,
            "tax mismatch",
            AuditBlock {
                request_url: "https://api.example/v1/invoices".into(),
                request_payload: "{}".into(),
                response_status: 400,
                response_body: "{\"Errors\":[]}".into(),
            },
        );
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["audit_response_status"], json!(400));
        assert_eq!(value["error_code"], json!("provider_error"));
        assert_eq!(value["status"], json!("error"));
        assert!(value.get("audit").is_none());

        let back: InvoiceResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back.audit.response_status, 400);
    }
}
