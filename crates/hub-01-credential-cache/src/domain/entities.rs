use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{IntegrationId, JsonMap, TenantId};
use std::collections::BTreeMap;

use super::{IntegrationCategory, IntegrationType};

/// L2 key for integration metadata.
#[must_use]
pub fn meta_key(id: IntegrationId) -> String {
    format!("integration:meta:{id}")
}

/// L2 key for encrypted credential fields.
#[must_use]
pub fn creds_key(id: IntegrationId) -> String {
    format!("integration:creds:{id}")
}

/// Integration metadata as the fabric sees it. Carries only what outbound
/// workers consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedIntegration {
    pub integration_id: IntegrationId,
    /// `None` for global integrations owned by the platform.
    pub tenant_id: Option<TenantId>,
    pub type_code: IntegrationType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: JsonMap,
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CachedIntegration {
    #[must_use]
    pub fn new(integration_id: IntegrationId, tenant_id: Option<TenantId>, type_code: IntegrationType) -> Self {
        let now = Utc::now();
        Self {
            integration_id,
            tenant_id,
            type_code,
            name: String::new(),
            config: JsonMap::new(),
            is_active: true,
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: JsonMap) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn category(&self) -> IntegrationCategory {
        self.type_code.category()
    }

    /// Provider name as used in queue names and invoice requests.
    #[must_use]
    pub fn provider(&self) -> &'static str {
        self.type_code.code()
    }

    /// Tenant whose derived key protects this integration's credentials.
    /// Global integrations use the tenant-0 key.
    #[must_use]
    pub fn key_tenant(&self) -> u64 {
        self.tenant_id.map_or(0, |t| t.0)
    }
}

/// Credential fields as stored: field name to hex-encoded ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCredentials {
    pub integration_id: IntegrationId,
    pub fields: BTreeMap<String, String>,
}

impl EncryptedCredentials {
    #[must_use]
    pub fn new(integration_id: IntegrationId) -> Self {
        Self {
            integration_id,
            fields: BTreeMap::new(),
        }
    }
}

/// One row of the store of record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredIntegration {
    pub integration: CachedIntegration,
    pub credentials: EncryptedCredentials,
}
