//! Layered cache service.

use async_trait::async_trait;
use chrono::Utc;
use hub_telemetry::metrics::CACHE_LOOKUPS;
use shared_crypto::CredentialCipher;
use shared_types::{IntegrationId, SystemTimeSource, TimeSource, TtlCache};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use zeroize::Zeroizing;

use crate::domain::{
    creds_key, meta_key, CacheError, CachedIntegration, EncryptedCredentials, StoredIntegration,
};
use crate::ports::{CredentialCacheApi, IntegrationStore, SharedCache};

const METRIC_CACHE: &str = "integration";

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// L1 lifetime of metadata and ciphertext.
    pub meta_ttl: Duration,
    /// L1 lifetime of decrypted fields.
    pub plaintext_ttl: Duration,
    /// L2 lifetime of metadata and ciphertext.
    pub shared_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            meta_ttl: Duration::from_secs(300),
            plaintext_ttl: Duration::from_secs(30),
            shared_ttl: Duration::from_secs(3600),
        }
    }
}

pub struct CredentialCacheService {
    store: Arc<dyn IntegrationStore>,
    shared: Arc<dyn SharedCache>,
    cipher: Arc<CredentialCipher>,
    config: CacheConfig,
    meta: TtlCache<IntegrationId, Arc<CachedIntegration>>,
    ciphertext: TtlCache<IntegrationId, Arc<EncryptedCredentials>>,
    plaintext: TtlCache<(IntegrationId, String), Zeroizing<String>>,
}

impl CredentialCacheService {
    #[must_use]
    pub fn new(
        store: Arc<dyn IntegrationStore>,
        shared: Arc<dyn SharedCache>,
        cipher: Arc<CredentialCipher>,
        config: CacheConfig,
    ) -> Self {
        Self::with_clock(store, shared, cipher, config, Arc::new(SystemTimeSource))
    }

    #[must_use]
    pub fn with_clock(
        store: Arc<dyn IntegrationStore>,
        shared: Arc<dyn SharedCache>,
        cipher: Arc<CredentialCipher>,
        config: CacheConfig,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            meta: TtlCache::with_clock(config.meta_ttl, clock.clone()),
            ciphertext: TtlCache::with_clock(config.meta_ttl, clock.clone()),
            plaintext: TtlCache::with_clock(config.plaintext_ttl, clock),
            store,
            shared,
            cipher,
            config,
        }
    }

    // =========================================================================
    // WRITE-THROUGH
    // =========================================================================

    /// Encrypt `credentials` under the integration's tenant key, write the
    /// row to the store and invalidate L1 and L2.
    pub async fn put_integration(
        &self,
        integration: CachedIntegration,
        credentials: BTreeMap<String, String>,
    ) -> Result<(), CacheError> {
        let id = integration.integration_id;
        if let Some(missing) = integration
            .type_code
            .required_fields()
            .iter()
            .find(|f| !credentials.contains_key(**f))
        {
            return Err(CacheError::InvalidIntegration(format!(
                "{} integration {id} is missing credential field '{missing}'",
                integration.type_code
            )));
        }

        let tenant = integration.key_tenant();
        let mut encrypted = EncryptedCredentials::new(id);
        for (field, value) in credentials {
            let value = Zeroizing::new(value);
            let sealed = self
                .cipher
                .encrypt_field(tenant, id.0, &field, &value)
                .map_err(|e| CacheError::InvalidIntegration(e.to_string()))?;
            encrypted.fields.insert(field, sealed);
        }

        let mut integration = integration;
        integration.updated_at = Utc::now();
        self.store
            .save(StoredIntegration {
                integration,
                credentials: encrypted,
            })
            .await?;
        self.invalidate(id).await;
        Ok(())
    }

    /// Delete from the store and every cache layer. Returns whether the
    /// store held the integration.
    pub async fn remove_integration(&self, id: IntegrationId) -> Result<bool, CacheError> {
        let existed = self.store.delete(id).await?;
        self.invalidate(id).await;
        Ok(existed)
    }

    /// Drop every cached copy of the integration (L1 metadata, ciphertext,
    /// plaintext, and both L2 keys).
    pub async fn invalidate(&self, id: IntegrationId) {
        self.meta.invalidate(&id);
        self.ciphertext.invalidate(&id);
        self.plaintext.invalidate_where(|(owner, _)| *owner == id);

        for key in [meta_key(id), creds_key(id)] {
            if let Err(e) = self.shared.delete(&key).await {
                warn!(key = %key, error = %e, "Failed to invalidate shared cache entry");
            }
        }
        debug!(integration_id = %id, "Integration invalidated");
    }

    // =========================================================================
    // READ PATH
    // =========================================================================

    async fn meta(&self, id: IntegrationId) -> Result<Arc<CachedIntegration>, CacheError> {
        if let Some(hit) = self.meta.get(&id) {
            CACHE_LOOKUPS.with_label_values(&[METRIC_CACHE, "l1"]).inc();
            return Ok(hit);
        }
        if let Some(hit) = self.shared_get::<CachedIntegration>(&meta_key(id)).await {
            CACHE_LOOKUPS.with_label_values(&[METRIC_CACHE, "l2"]).inc();
            let hit = Arc::new(hit);
            self.meta.insert(id, hit.clone());
            return Ok(hit);
        }
        let (meta, _) = self.load_from_store(id).await?;
        Ok(meta)
    }

    async fn encrypted(&self, id: IntegrationId) -> Result<Arc<EncryptedCredentials>, CacheError> {
        if let Some(hit) = self.ciphertext.get(&id) {
            return Ok(hit);
        }
        if let Some(hit) = self.shared_get::<EncryptedCredentials>(&creds_key(id)).await {
            let hit = Arc::new(hit);
            self.ciphertext.insert(id, hit.clone());
            return Ok(hit);
        }
        let (_, creds) = self.load_from_store(id).await?;
        Ok(creds)
    }

    /// L3 read; repopulates L2 and L1.
    async fn load_from_store(
        &self,
        id: IntegrationId,
    ) -> Result<(Arc<CachedIntegration>, Arc<EncryptedCredentials>), CacheError> {
        let Some(record) = self.store.load(id).await? else {
            CACHE_LOOKUPS.with_label_values(&[METRIC_CACHE, "miss"]).inc();
            return Err(CacheError::IntegrationNotFound(id));
        };
        CACHE_LOOKUPS.with_label_values(&[METRIC_CACHE, "l3"]).inc();

        self.shared_set(&meta_key(id), &record.integration).await;
        self.shared_set(&creds_key(id), &record.credentials).await;

        let meta = Arc::new(record.integration);
        let creds = Arc::new(record.credentials);
        self.meta.insert(id, meta.clone());
        self.ciphertext.insert(id, creds.clone());
        Ok((meta, creds))
    }

    /// L2 failures and undecodable entries degrade to a miss.
    async fn shared_get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.shared.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = key, error = %e, "Discarding undecodable shared cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = key, error = %e, "Shared cache read failed, falling through to store");
                None
            }
        }
    }

    async fn shared_set<T: serde::Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to encode shared cache entry");
                return;
            }
        };
        if let Err(e) = self.shared.set(key, raw, self.config.shared_ttl).await {
            warn!(key = key, error = %e, "Shared cache write failed");
        }
    }

    fn decrypt(
        &self,
        meta: &CachedIntegration,
        creds: &EncryptedCredentials,
        field: &str,
    ) -> Result<String, CacheError> {
        let id = meta.integration_id;
        let sealed = creds
            .fields
            .get(field)
            .ok_or_else(|| CacheError::FieldNotFound {
                integration_id: id,
                field: field.to_string(),
            })?;

        let plaintext = self
            .cipher
            .decrypt_field(meta.key_tenant(), id.0, field, sealed)
            .map_err(|e| {
                error!(integration_id = %id, field = field, error = %e, "Credential decryption failed");
                CacheError::DecryptionFailed {
                    integration_id: id,
                    field: field.to_string(),
                }
            })?;

        self.plaintext
            .insert((id, field.to_string()), Zeroizing::new(plaintext.clone()));
        Ok(plaintext)
    }
}

#[async_trait]
impl CredentialCacheApi for CredentialCacheService {
    async fn get_integration(&self, id: IntegrationId) -> Result<Arc<CachedIntegration>, CacheError> {
        self.meta(id).await
    }

    async fn get_active_integration(
        &self,
        id: IntegrationId,
        provider: &str,
    ) -> Result<Arc<CachedIntegration>, CacheError> {
        let meta = self.meta(id).await?;
        if !meta.is_active {
            return Err(CacheError::IntegrationInactive(id));
        }
        if meta.provider() != provider {
            return Err(CacheError::ProviderMismatch {
                integration_id: id,
                expected: provider.to_string(),
                actual: meta.provider().to_string(),
            });
        }
        Ok(meta)
    }

    async fn get_credential_field(&self, id: IntegrationId, field: &str) -> Result<String, CacheError> {
        if let Some(hit) = self.plaintext.get(&(id, field.to_string())) {
            return Ok(hit.to_string());
        }
        let meta = self.meta(id).await?;
        let creds = self.encrypted(id).await?;
        self.decrypt(&meta, &creds, field)
    }

    async fn get_all_credentials(&self, id: IntegrationId) -> Result<BTreeMap<String, String>, CacheError> {
        let meta = self.meta(id).await?;
        let creds = self.encrypted(id).await?;
        let mut out = BTreeMap::new();
        for field in creds.fields.keys() {
            let value = match self.plaintext.get(&(id, field.clone())) {
                Some(hit) => hit.to_string(),
                None => self.decrypt(&meta, &creds, field)?,
            };
            out.insert(field.clone(), value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryIntegrationStore, InMemorySharedCache};
    use crate::domain::IntegrationType;
    use shared_crypto::MasterKey;
    use shared_types::{ManualClock, TenantId};

    struct Fixture {
        store: Arc<InMemoryIntegrationStore>,
        shared: Arc<InMemorySharedCache>,
        cipher: Arc<CredentialCipher>,
        clock: Arc<ManualClock>,
        service: CredentialCacheService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryIntegrationStore::new());
        let shared = Arc::new(InMemorySharedCache::new());
        let cipher = Arc::new(CredentialCipher::new(MasterKey::from_bytes([7u8; 32])));
        let clock = Arc::new(ManualClock::new());
        let service = CredentialCacheService::with_clock(
            store.clone(),
            shared.clone(),
            cipher.clone(),
            CacheConfig::default(),
            clock.clone(),
        );
        Fixture {
            store,
            shared,
            cipher,
            clock,
            service,
        }
    }

    fn siigo(id: u64, tenant: u64) -> CachedIntegration {
        CachedIntegration::new(IntegrationId(id), Some(TenantId(tenant)), IntegrationType::Siigo)
    }

    fn siigo_creds() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("username".to_string(), "api@shop.co".to_string()),
            ("access_key".to_string(), "s3cret".to_string()),
        ])
    }

    #[tokio::test]
    async fn test_field_decrypts_from_store() {
        let f = fixture();
        f.service.put_integration(siigo(42, 7), siigo_creds()).await.unwrap();

        let key = f.service.get_credential_field(IntegrationId(42), "access_key").await.unwrap();
        assert_eq!(key, "s3cret");
    }

    #[tokio::test]
    async fn test_ciphertext_at_rest_is_not_plaintext() {
        let f = fixture();
        f.service.put_integration(siigo(42, 7), siigo_creds()).await.unwrap();
        let row = f.store.load(IntegrationId(42)).await.unwrap().unwrap();
        assert_ne!(row.credentials.fields["access_key"], "s3cret");
    }

    #[tokio::test]
    async fn test_l1_hit_skips_store() {
        let f = fixture();
        f.service.put_integration(siigo(42, 7), siigo_creds()).await.unwrap();

        f.service.get_integration(IntegrationId(42)).await.unwrap();
        let loads = f.store.load_count();
        f.service.get_integration(IntegrationId(42)).await.unwrap();
        f.service.get_credential_field(IntegrationId(42), "username").await.unwrap();
        assert_eq!(f.store.load_count(), loads);
    }

    #[tokio::test]
    async fn test_l2_repopulates_fresh_instance() {
        let f = fixture();
        f.service.put_integration(siigo(42, 7), siigo_creds()).await.unwrap();
        f.service.get_integration(IntegrationId(42)).await.unwrap();
        assert!(f.shared.contains("integration:meta:42"));
        assert!(f.shared.contains("integration:creds:42"));

        let other = CredentialCacheService::new(
            f.store.clone(),
            f.shared.clone(),
            f.cipher.clone(),
            CacheConfig::default(),
        );
        let loads = f.store.load_count();
        let value = other.get_credential_field(IntegrationId(42), "username").await.unwrap();
        assert_eq!(value, "api@shop.co");
        assert_eq!(f.store.load_count(), loads);
    }

    #[tokio::test]
    async fn test_plaintext_expires_before_metadata() {
        let f = fixture();
        f.service.put_integration(siigo(42, 7), siigo_creds()).await.unwrap();
        f.service.get_credential_field(IntegrationId(42), "access_key").await.unwrap();
        assert_eq!(f.service.plaintext.len(), 1);

        f.clock.advance(Duration::from_secs(31));
        assert!(f.service.plaintext.get(&(IntegrationId(42), "access_key".into())).is_none());
        assert!(f.service.meta.get(&IntegrationId(42)).is_some());
    }

    #[tokio::test]
    async fn test_unknown_integration() {
        let f = fixture();
        let err = f.service.get_integration(IntegrationId(404)).await.unwrap_err();
        assert_eq!(err, CacheError::IntegrationNotFound(IntegrationId(404)));
        assert_eq!(err.error_code().as_str(), "integration_not_found");
    }

    #[tokio::test]
    async fn test_missing_field() {
        let f = fixture();
        f.service.put_integration(siigo(42, 7), siigo_creds()).await.unwrap();
        let err = f
            .service
            .get_credential_field(IntegrationId(42), "partner_id")
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::FieldNotFound { ref field, .. } if field == "partner_id"));
    }

    #[tokio::test]
    async fn test_wrong_tenant_key_fails_decryption() {
        let f = fixture();
        let id = IntegrationId(42);
        let sealed = f.cipher.encrypt_field(8, id.0, "access_key", "s3cret").unwrap();
        let mut creds = EncryptedCredentials::new(id);
        creds.fields.insert("access_key".into(), sealed);
        f.store
            .save(StoredIntegration {
                integration: siigo(42, 7),
                credentials: creds,
            })
            .await
            .unwrap();

        let err = f.service.get_credential_field(id, "access_key").await.unwrap_err();
        assert!(matches!(err, CacheError::DecryptionFailed { .. }));
    }

    #[tokio::test]
    async fn test_update_invalidates_every_layer() {
        let f = fixture();
        f.service.put_integration(siigo(42, 7), siigo_creds()).await.unwrap();
        assert_eq!(
            f.service.get_credential_field(IntegrationId(42), "access_key").await.unwrap(),
            "s3cret"
        );

        let mut rotated = siigo_creds();
        rotated.insert("access_key".into(), "rotated".into());
        f.service.put_integration(siigo(42, 7), rotated).await.unwrap();

        assert!(!f.shared.contains("integration:creds:42"));
        assert_eq!(
            f.service.get_credential_field(IntegrationId(42), "access_key").await.unwrap(),
            "rotated"
        );
    }

    #[tokio::test]
    async fn test_remove_integration() {
        let f = fixture();
        f.service.put_integration(siigo(42, 7), siigo_creds()).await.unwrap();
        f.service.get_integration(IntegrationId(42)).await.unwrap();

        assert!(f.service.remove_integration(IntegrationId(42)).await.unwrap());
        assert!(matches!(
            f.service.get_integration(IntegrationId(42)).await,
            Err(CacheError::IntegrationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_rejects_missing_required_field() {
        let f = fixture();
        let mut creds = siigo_creds();
        creds.remove("access_key");
        let err = f.service.put_integration(siigo(42, 7), creds).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidIntegration(_)));
    }

    #[tokio::test]
    async fn test_active_integration_checks() {
        let f = fixture();
        let mut inactive = siigo(1, 7);
        inactive.is_active = false;
        f.service.put_integration(inactive, siigo_creds()).await.unwrap();
        f.service.put_integration(siigo(2, 7), siigo_creds()).await.unwrap();

        assert_eq!(
            f.service.get_active_integration(IntegrationId(1), "siigo").await.unwrap_err(),
            CacheError::IntegrationInactive(IntegrationId(1))
        );
        assert!(matches!(
            f.service.get_active_integration(IntegrationId(2), "alegra").await,
            Err(CacheError::ProviderMismatch { .. })
        ));
        assert!(f.service.get_active_integration(IntegrationId(2), "siigo").await.is_ok());
    }

    #[tokio::test]
    async fn test_get_all_credentials() {
        let f = fixture();
        f.service.put_integration(siigo(42, 7), siigo_creds()).await.unwrap();
        let all = f.service.get_all_credentials(IntegrationId(42)).await.unwrap();
        assert_eq!(all, siigo_creds());
    }
}
