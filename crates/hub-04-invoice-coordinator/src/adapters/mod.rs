//! Outbound adapters: HTTP client and provider implementations.

pub mod alegra;
pub mod http;
pub mod siigo;

use serde_json::Value;

use crate::domain::{CoordinatorError, IssuedInvoice, ProviderOutcome};
use http::HttpOutcome;

pub use alegra::{AlegraConfig, AlegraProvider};
pub use http::{CallAuth, HttpClient, HttpReply, OutboundCall};
pub use siigo::{SiigoConfig, SiigoProvider};

/// Classify an invoice call's reply. `parse_success` maps a 2xx body;
/// `parse_error` extracts a business message from a 4xx body.
pub(crate) fn classify(
    outcome: HttpOutcome,
    parse_success: impl FnOnce(&Value) -> Option<IssuedInvoice>,
    parse_error: impl FnOnce(&Value) -> Option<String>,
) -> ProviderOutcome {
    let HttpOutcome { result, audit } = outcome;
    let result = result.and_then(|reply| {
        let body = reply.json();
        match reply.status {
            200..=299 => parse_success(&body).ok_or_else(|| CoordinatorError::Upstream {
                status: reply.status,
                message: "success body missing invoice id".into(),
            }),
            401 | 403 => Err(CoordinatorError::AuthFailed(
                parse_error(&body).unwrap_or_else(|| reply.body.clone()),
            )),
            429 => Err(CoordinatorError::RateLimited),
            status => Err(CoordinatorError::Provider {
                status,
                message: parse_error(&body).unwrap_or_else(|| reply.body.clone()),
            }),
        }
    });
    ProviderOutcome { result, audit }
}

/// String or number field as a string.
pub(crate) fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
