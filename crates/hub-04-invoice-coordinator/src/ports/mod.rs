//! Provider port.

use async_trait::async_trait;
use hub_01_credential_cache::IntegrationType;
use shared_types::JsonMap;

use crate::domain::{ProviderCall, ProviderOutcome};

/// An external invoicing API.
#[async_trait]
pub trait InvoiceProvider: Send + Sync {
    fn integration_type(&self) -> IntegrationType;

    /// Provider code used in queue and channel names.
    fn code(&self) -> &'static str {
        self.integration_type().code()
    }

    /// Endpoint an invoice call goes to under `config`. Named in audits of
    /// requests that fail before any HTTP exchange.
    fn invoice_url(&self, config: &JsonMap) -> String;

    /// Issue one invoice. Never fails without an audit block.
    async fn issue(&self, call: ProviderCall<'_>) -> ProviderOutcome;
}
