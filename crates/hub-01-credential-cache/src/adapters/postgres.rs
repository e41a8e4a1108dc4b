//! PostgreSQL store of record.
//!
//! Two tables: `integrations` (metadata) and `integration_credentials`
//! (one row per encrypted field). Rows with a `type_code` outside the
//! registry fail to load with `UnknownIntegrationType`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{IntegrationId, JsonMap, TenantId};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::info;

use crate::domain::{
    CacheError, CachedIntegration, EncryptedCredentials, IntegrationType, StoredIntegration,
};
use crate::ports::IntegrationStore;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS integrations (
        id BIGINT PRIMARY KEY,
        tenant_id BIGINT,
        type_code VARCHAR(64) NOT NULL,
        name VARCHAR(255) NOT NULL DEFAULT '',
        config JSONB NOT NULL DEFAULT '{}',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        is_default BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS integration_credentials (
        integration_id BIGINT NOT NULL REFERENCES integrations(id) ON DELETE CASCADE,
        field VARCHAR(128) NOT NULL,
        ciphertext TEXT NOT NULL,
        PRIMARY KEY (integration_id, field)
    );
    "#,
    "CREATE INDEX IF NOT EXISTS idx_integrations_tenant ON integrations(tenant_id);",
];

fn db_err(e: sqlx::Error) -> CacheError {
    CacheError::Store(e.to_string())
}

pub struct PgIntegrationStore {
    pool: PgPool,
}

impl PgIntegrationStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, CacheError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), CacheError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        info!("Integration tables migrations completed");
        Ok(())
    }

    fn map_row(row: &PgRow) -> Result<CachedIntegration, CacheError> {
        let id: i64 = row.try_get("id").map_err(db_err)?;
        let tenant_id: Option<i64> = row.try_get("tenant_id").map_err(db_err)?;
        let type_code: String = row.try_get("type_code").map_err(db_err)?;
        let config: serde_json::Value = row.try_get("config").map_err(db_err)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_err)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(db_err)?;

        let config: JsonMap = match config {
            serde_json::Value::Object(map) => map,
            _ => JsonMap::new(),
        };

        Ok(CachedIntegration {
            integration_id: IntegrationId(id as u64),
            tenant_id: tenant_id.map(|t| TenantId(t as u64)),
            type_code: IntegrationType::from_code(&type_code)?,
            name: row.try_get("name").map_err(db_err)?,
            config,
            is_active: row.try_get("is_active").map_err(db_err)?,
            is_default: row.try_get("is_default").map_err(db_err)?,
            created_at,
            updated_at,
        })
    }
}

#[async_trait]
impl IntegrationStore for PgIntegrationStore {
    async fn load(&self, id: IntegrationId) -> Result<Option<StoredIntegration>, CacheError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, type_code, name, config, is_active, is_default, created_at, updated_at
            FROM integrations
            WHERE id = $1
            "#,
        )
        .bind(id.0 as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let integration = Self::map_row(&row)?;

        let rows = sqlx::query(
            "SELECT field, ciphertext FROM integration_credentials WHERE integration_id = $1",
        )
        .bind(id.0 as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut credentials = EncryptedCredentials::new(id);
        for row in rows {
            let field: String = row.try_get("field").map_err(db_err)?;
            let ciphertext: String = row.try_get("ciphertext").map_err(db_err)?;
            credentials.fields.insert(field, ciphertext);
        }

        Ok(Some(StoredIntegration {
            integration,
            credentials,
        }))
    }

    async fn save(&self, record: StoredIntegration) -> Result<(), CacheError> {
        let StoredIntegration {
            integration,
            credentials,
        } = record;
        let id = integration.integration_id.0 as i64;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO integrations
                (id, tenant_id, type_code, name, config, is_active, is_default, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                tenant_id = EXCLUDED.tenant_id,
                type_code = EXCLUDED.type_code,
                name = EXCLUDED.name,
                config = EXCLUDED.config,
                is_active = EXCLUDED.is_active,
                is_default = EXCLUDED.is_default,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(id)
        .bind(integration.tenant_id.map(|t| t.0 as i64))
        .bind(integration.type_code.code())
        .bind(&integration.name)
        .bind(serde_json::Value::Object(integration.config.clone()))
        .bind(integration.is_active)
        .bind(integration.is_default)
        .bind(integration.created_at)
        .bind(integration.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM integration_credentials WHERE integration_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for (field, ciphertext) in &credentials.fields {
            sqlx::query(
                "INSERT INTO integration_credentials (integration_id, field, ciphertext) VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(field)
            .bind(ciphertext)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }

    async fn delete(&self, id: IntegrationId) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM integrations WHERE id = $1")
            .bind(id.0 as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}
