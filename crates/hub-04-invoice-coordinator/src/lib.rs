//! # Invoice Coordinator
//!
//! **Component:** hub-04
//!
//! Request/reply over the broker for electronic invoicing. Producers submit
//! an [`InvoiceRequest`](shared_types::InvoiceRequest) and wait on its
//! correlation id; one worker per provider consumes the durable request
//! queue, calls the provider's HTTP API and publishes exactly one
//! response.
//!
//! ```text
//!  InvoiceClient::submit ──register(correlation_id)──▶ PendingRequestStore
//!        │ enqueue                                          ▲ complete
//!        ▼                                                  │
//!  invoicing.<p>.requests ──▶ InvoiceWorker ──▶ invoicing.<p>.responses
//!                                │   ▲                      │
//!                    credentials │   │ audit block          └──▶ invoicing state topic
//!                                ▼   │
//!                       InvoiceProvider (Siigo, Alegra) ──▶ provider API
//! ```
//!
//! ## Guarantees
//!
//! - Every consumed request gets one response, malformed input included.
//! - Every response carries an audit block, synthetic when the failure
//!   happened before any HTTP call.
//! - Retries are bounded and apply only to network errors and 5xx replies.
//! - A producer waiting past the deadline receives a `timeout` response
//!   instead of hanging.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod client;
pub mod config;
pub mod domain;
pub mod ports;
pub mod worker;

pub use adapters::{AlegraProvider, HttpClient, SiigoProvider};
pub use client::InvoiceClient;
pub use config::CoordinatorConfig;
pub use domain::{CoordinatorError, PendingRequestStore, TokenCache};
pub use ports::InvoiceProvider;
pub use worker::InvoiceWorker;

use hub_01_credential_cache::IntegrationType;
use std::sync::Arc;

/// Build the provider implementation for an integration type code.
pub fn provider_for(code: &str, config: &CoordinatorConfig) -> Result<Arc<dyn InvoiceProvider>, CoordinatorError> {
    let http = HttpClient::new(config)?;
    match IntegrationType::from_code(code)? {
        IntegrationType::Siigo => Ok(Arc::new(SiigoProvider::new(http, config.token_safety()))),
        IntegrationType::Alegra => Ok(Arc::new(AlegraProvider::new(http))),
        _ => Err(CoordinatorError::InvalidConfig(format!(
            "no invoicing provider for integration type '{code}'"
        ))),
    }
}
