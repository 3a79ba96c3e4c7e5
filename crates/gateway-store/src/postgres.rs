//! PostgreSQL store.
//!
//! Limits are a monthly token ceiling per project: usage recorded since the
//! start of the current UTC month is compared against
//! `projects.monthly_token_limit` (NULL means unlimited).

use async_trait::async_trait;
use chrono::{Datelike, TimeZone, Utc};
use gateway_config::PostgresSettings;
use gateway_core::{
    hash_secret, ApiKey, GatewayError, GatewayStore, LimitCheckResult, ModelConfig, UsageRecord,
};
use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use crate::StoreError;

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and run pending migrations
    pub async fn connect(settings: &PostgresSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(settings.url.expose_secret())
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        info!(
            max_connections = settings.max_connections,
            "Connected to PostgreSQL store"
        );

        Ok(Self { pool })
    }

    /// Distinct provider identifiers referenced by model records
    pub async fn referenced_providers(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT provider FROM llm_models ORDER BY provider")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }
}

fn month_start() -> Result<chrono::DateTime<Utc>, StoreError> {
    let now = Utc::now();
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .ok_or_else(|| StoreError::Database("could not compute billing window".to_string()))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl GatewayStore for PostgresStore {
    async fn find_api_key(&self, secret: &str) -> Result<Option<ApiKey>, GatewayError> {
        let row: Option<(String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT id, project_id, owner_id, name FROM api_keys \
             WHERE key_hash = $1 AND revoked_at IS NULL",
        )
        .bind(hash_secret(secret))
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(row.map(|(id, project_id, owner_id, name)| ApiKey {
            id,
            project_id,
            owner_id,
            name,
        }))
    }

    async fn get_authorized_models(&self, api_key_id: &str) -> Result<Vec<ModelConfig>, GatewayError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT m.id, m.name, m.provider FROM llm_models m \
             JOIN api_key_models akm ON akm.model_id = m.id \
             WHERE akm.api_key_id = $1 \
             ORDER BY akm.position, m.created_at",
        )
        .bind(api_key_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(rows
            .into_iter()
            .map(|(id, name, provider)| ModelConfig { id, name, provider })
            .collect())
    }

    async fn check_limits(&self, api_key_id: &str) -> Result<LimitCheckResult, GatewayError> {
        let since = month_start()?;

        let row: Option<(Option<i64>, i64)> = sqlx::query_as(
            "SELECT p.monthly_token_limit, \
                    COALESCE(SUM(u.total_tokens), 0)::BIGINT \
             FROM api_keys k \
             JOIN projects p ON p.id = k.project_id \
             LEFT JOIN completion_usage u \
               ON u.project_id = p.id AND u.created_at >= $2 \
             WHERE k.id = $1 \
             GROUP BY p.monthly_token_limit",
        )
        .bind(api_key_id)
        .bind(since)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let (limit, used) = row.ok_or_else(|| StoreError::NotFound {
            kind: "api key",
            id: api_key_id.to_string(),
        })?;
        let used = u64::try_from(used).unwrap_or_default();

        debug!(api_key_id, used, ?limit, "Calculated monthly usage");

        Ok(match limit {
            Some(limit) => LimitCheckResult::against(used, u64::try_from(limit).unwrap_or_default()),
            None => LimitCheckResult::unlimited(used),
        })
    }

    async fn record_usage(&self, record: UsageRecord) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO completion_usage \
             (project_id, api_key_id, model_id, prompt_tokens, completion_tokens, total_tokens) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&record.project_id)
        .bind(&record.api_key_id)
        .bind(&record.model_id)
        .bind(to_i64(record.prompt_tokens))
        .bind(to_i64(record.completion_tokens))
        .bind(to_i64(record.total_tokens))
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(())
    }
}
