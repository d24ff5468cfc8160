//! Repository for `shared_state`, the key/value store backing the six
//! persisted config singletons (proxy, health-check, load-balance, routing,
//! ui, routing-llm). Each key holds one singleton's config serialized as a
//! JSON string value; [`crate::config::Config::with_persisted`] merges it in
//! between the compiled default and environment overrides.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::Repository;
use crate::db::models::shared_state::SharedStateDBResponse;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct SharedStateSetRequest {
    pub key: String,
    pub value: String,
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SharedStateFilter {
    pub key_prefix: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
struct SharedStateRow {
    key: String,
    value: String,
    updated_at: DateTime<Utc>,
    updated_by: Option<String>,
}

impl From<SharedStateRow> for SharedStateDBResponse {
    fn from(r: SharedStateRow) -> Self {
        Self { key: r.key, value: r.value, updated_at: r.updated_at, updated_by: r.updated_by }
    }
}

pub struct SharedState<'c> {
    db: &'c mut PgConnection,
}

impl<'c> SharedState<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Upsert a key, used both for first-write and subsequent admin-driven
    /// config updates.
    #[instrument(skip(self, request), fields(key = %request.key), err)]
    pub async fn set(&mut self, request: &SharedStateSetRequest) -> Result<SharedStateDBResponse> {
        let row: SharedStateRow = sqlx::query_as(
            "INSERT INTO shared_state (key, value, updated_by, updated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_by = excluded.updated_by, updated_at = now()
             RETURNING *",
        )
        .bind(&request.key)
        .bind(&request.value)
        .bind(&request.updated_by)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row.into())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for SharedState<'c> {
    type CreateRequest = SharedStateSetRequest;
    type UpdateRequest = SharedStateSetRequest;
    type Response = SharedStateDBResponse;
    type Id = String;
    type Filter = SharedStateFilter;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        self.set(request).await
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row: Option<SharedStateRow> =
            sqlx::query_as("SELECT * FROM shared_state WHERE key = $1").bind(id).fetch_optional(&mut *self.db).await?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<SharedStateRow> =
            sqlx::query_as("SELECT * FROM shared_state WHERE key = ANY($1)").bind(&ids).fetch_all(&mut *self.db).await?;
        Ok(rows.into_iter().map(|r| (r.key.clone(), r.into())).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let rows: Vec<SharedStateRow> = match &filter.key_prefix {
            Some(prefix) => sqlx::query_as("SELECT * FROM shared_state WHERE key LIKE $1 || '%' ORDER BY key")
                .bind(prefix)
                .fetch_all(&mut *self.db)
                .await?,
            None => sqlx::query_as("SELECT * FROM shared_state ORDER BY key").fetch_all(&mut *self.db).await?,
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM shared_state WHERE key = $1").bind(id).execute(&mut *self.db).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        if id != request.key {
            return Err(DbError::Other(anyhow::anyhow!("key mismatch in shared_state update")));
        }
        self.set(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    async fn set_is_idempotent_upsert(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = SharedState::new(&mut conn);
        repo.set(&SharedStateSetRequest { key: "proxy".to_string(), value: "{\"timeout_secs\":30}".to_string(), updated_by: None })
            .await
            .unwrap();
        repo.set(&SharedStateSetRequest { key: "proxy".to_string(), value: "{\"timeout_secs\":60}".to_string(), updated_by: Some("admin".to_string()) })
            .await
            .unwrap();

        let fetched = repo.get_by_id("proxy".to_string()).await.unwrap().unwrap();
        assert_eq!(fetched.value, "{\"timeout_secs\":60}");
        assert_eq!(fetched.updated_by.as_deref(), Some("admin"));
    }

    #[sqlx::test]
    async fn list_filters_by_prefix(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = SharedState::new(&mut conn);
        repo.set(&SharedStateSetRequest { key: "routing".to_string(), value: "{}".to_string(), updated_by: None }).await.unwrap();
        repo.set(&SharedStateSetRequest { key: "routing_llm".to_string(), value: "{}".to_string(), updated_by: None }).await.unwrap();
        repo.set(&SharedStateSetRequest { key: "ui".to_string(), value: "{}".to_string(), updated_by: None }).await.unwrap();

        let routing_keys = repo.list(&SharedStateFilter { key_prefix: Some("routing".to_string()) }).await.unwrap();
        assert_eq!(routing_keys.len(), 2);
    }
}
