//! Repository for the `providers` table.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::Repository;
use crate::db::models::provider::{ProviderCreateDBRequest, ProviderDBResponse, ProviderUpdateDBRequest};
use crate::types::{abbrev_uuid, ProviderId};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct ProviderFilter {
    pub enabled_only: bool,
}

#[derive(Debug, Clone, FromRow)]
struct ProviderRow {
    id: ProviderId,
    name: String,
    base_url: String,
    api_key: Option<String>,
    enabled: bool,
    weight: i32,
    max_concurrent: i32,
    extra_headers: JsonValue,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProviderRow> for ProviderDBResponse {
    fn from(r: ProviderRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            base_url: r.base_url,
            api_key: r.api_key,
            enabled: r.enabled,
            weight: r.weight,
            max_concurrent: r.max_concurrent,
            extra_headers: r.extra_headers,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub struct Providers<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Providers<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Providers<'c> {
    type CreateRequest = ProviderCreateDBRequest;
    type UpdateRequest = ProviderUpdateDBRequest;
    type Response = ProviderDBResponse;
    type Id = ProviderId;
    type Filter = ProviderFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let row: ProviderRow = sqlx::query_as(
            "INSERT INTO providers (name, base_url, api_key, enabled, weight, max_concurrent, extra_headers)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(&request.name)
        .bind(&request.base_url)
        .bind(&request.api_key)
        .bind(request.enabled)
        .bind(request.weight)
        .bind(request.max_concurrent)
        .bind(&request.extra_headers)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row: Option<ProviderRow> = sqlx::query_as("SELECT * FROM providers WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<ProviderRow> = sqlx::query_as("SELECT * FROM providers WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(rows.into_iter().map(|r| (r.id, r.into())).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let rows: Vec<ProviderRow> = if filter.enabled_only {
            sqlx::query_as("SELECT * FROM providers WHERE enabled ORDER BY name")
                .fetch_all(&mut *self.db)
                .await?
        } else {
            sqlx::query_as("SELECT * FROM providers ORDER BY name")
                .fetch_all(&mut *self.db)
                .await?
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM providers WHERE id = $1").bind(id).execute(&mut *self.db).await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(provider_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let row: Option<ProviderRow> = sqlx::query_as(
            "UPDATE providers SET
                name = COALESCE($2, name),
                base_url = COALESCE($3, base_url),
                api_key = CASE WHEN $4 THEN $5 ELSE api_key END,
                enabled = COALESCE($6, enabled),
                weight = COALESCE($7, weight),
                max_concurrent = COALESCE($8, max_concurrent),
                extra_headers = COALESCE($9, extra_headers),
                updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.base_url)
        .bind(request.api_key.is_some())
        .bind(request.api_key.clone().flatten())
        .bind(request.enabled)
        .bind(request.weight)
        .bind(request.max_concurrent)
        .bind(&request.extra_headers)
        .fetch_optional(&mut *self.db)
        .await?;
        row.map(Into::into).ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_req(name: &str) -> ProviderCreateDBRequest {
        ProviderCreateDBRequest {
            name: name.to_string(),
            base_url: "http://mock".to_string(),
            api_key: Some("secret".to_string()),
            enabled: true,
            weight: 1,
            max_concurrent: 100,
            extra_headers: serde_json::json!({}),
        }
    }

    #[sqlx::test]
    async fn create_and_fetch_roundtrips(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Providers::new(&mut conn);
        let created = repo.create(&create_req("anthropic")).await.unwrap();
        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "anthropic");
        assert_eq!(fetched.base_url, "http://mock");
    }

    #[sqlx::test]
    async fn list_enabled_only_excludes_disabled(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Providers::new(&mut conn);
        repo.create(&create_req("a")).await.unwrap();
        let mut disabled = create_req("b");
        disabled.enabled = false;
        repo.create(&disabled).await.unwrap();

        let enabled = repo.list(&ProviderFilter { enabled_only: true }).await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "a");
    }

    #[sqlx::test]
    async fn duplicate_name_is_unique_violation(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Providers::new(&mut conn);
        repo.create(&create_req("dup")).await.unwrap();
        let result = repo.create(&create_req("dup")).await;
        assert!(matches!(result, Err(DbError::UniqueViolation { .. })));
    }
}
