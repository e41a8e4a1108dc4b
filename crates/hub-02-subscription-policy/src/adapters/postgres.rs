//! PostgreSQL rule store. Array columns hold the status and payment method
//! lists.

use async_trait::async_trait;
use shared_types::{IntegrationId, TenantId};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::info;

use crate::domain::{PolicyError, SubscriptionRule};
use crate::ports::RuleStore;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS subscription_rules (
        tenant_id BIGINT NOT NULL,
        event_type VARCHAR(128) NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        statuses TEXT[] NOT NULL DEFAULT '{}',
        payment_method_ids BIGINT[] NOT NULL DEFAULT '{}',
        source_integration_id BIGINT,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (tenant_id, event_type)
    );
"#;

fn db_err(e: sqlx::Error) -> PolicyError {
    PolicyError::Store(e.to_string())
}

pub struct PgRuleStore {
    pool: PgPool,
}

impl PgRuleStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), PolicyError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        info!("Subscription rules migrations completed");
        Ok(())
    }

    fn map_row(row: &PgRow) -> Result<SubscriptionRule, PolicyError> {
        let tenant_id: i64 = row.try_get("tenant_id").map_err(db_err)?;
        let methods: Vec<i64> = row.try_get("payment_method_ids").map_err(db_err)?;
        let source: Option<i64> = row.try_get("source_integration_id").map_err(db_err)?;
        Ok(SubscriptionRule {
            tenant_id: TenantId(tenant_id as u64),
            event_type: row.try_get("event_type").map_err(db_err)?,
            enabled: row.try_get("enabled").map_err(db_err)?,
            statuses: row.try_get("statuses").map_err(db_err)?,
            payment_method_ids: methods.into_iter().map(|m| m as u64).collect(),
            source_integration_id: source.map(|s| IntegrationId(s as u64)),
        })
    }
}

#[async_trait]
impl RuleStore for PgRuleStore {
    async fn find(&self, tenant_id: TenantId, event_type: &str) -> Result<Option<SubscriptionRule>, PolicyError> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, event_type, enabled, statuses, payment_method_ids, source_integration_id
            FROM subscription_rules
            WHERE tenant_id = $1 AND event_type = $2
            "#,
        )
        .bind(tenant_id.0 as i64)
        .bind(event_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn upsert(&self, rule: SubscriptionRule) -> Result<(), PolicyError> {
        let methods: Vec<i64> = rule.payment_method_ids.iter().map(|m| *m as i64).collect();
        sqlx::query(
            r#"
            INSERT INTO subscription_rules
                (tenant_id, event_type, enabled, statuses, payment_method_ids, source_integration_id, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (tenant_id, event_type) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                statuses = EXCLUDED.statuses,
                payment_method_ids = EXCLUDED.payment_method_ids,
                source_integration_id = EXCLUDED.source_integration_id,
                updated_at = NOW()
            "#,
        )
        .bind(rule.tenant_id.0 as i64)
        .bind(&rule.event_type)
        .bind(rule.enabled)
        .bind(&rule.statuses)
        .bind(&methods)
        .bind(rule.source_integration_id.map(|s| s.0 as i64))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete(&self, tenant_id: TenantId, event_type: &str) -> Result<bool, PolicyError> {
        let result = sqlx::query("DELETE FROM subscription_rules WHERE tenant_id = $1 AND event_type = $2")
            .bind(tenant_id.0 as i64)
            .bind(event_type)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<SubscriptionRule>, PolicyError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, event_type, enabled, statuses, payment_method_ids, source_integration_id
            FROM subscription_rules
            WHERE tenant_id = $1
            ORDER BY event_type
            "#,
        )
        .bind(tenant_id.0 as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(Self::map_row).collect()
    }
}
