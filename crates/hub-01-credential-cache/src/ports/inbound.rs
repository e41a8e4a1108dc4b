//! Inbound port used by outbound workers.

use async_trait::async_trait;
use shared_types::IntegrationId;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{CacheError, CachedIntegration};

#[async_trait]
pub trait CredentialCacheApi: Send + Sync {
    async fn get_integration(&self, id: IntegrationId) -> Result<Arc<CachedIntegration>, CacheError>;

    /// Like `get_integration`, but the integration must be active and of the
    /// named provider.
    async fn get_active_integration(
        &self,
        id: IntegrationId,
        provider: &str,
    ) -> Result<Arc<CachedIntegration>, CacheError>;

    /// Plaintext of one credential field.
    async fn get_credential_field(&self, id: IntegrationId, field: &str) -> Result<String, CacheError>;

    /// Plaintext of every credential field on the integration.
    async fn get_all_credentials(&self, id: IntegrationId) -> Result<BTreeMap<String, String>, CacheError>;
}
