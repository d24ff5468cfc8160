//! Repository for the `models` table.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::Repository;
use crate::db::models::model::{ModelCreateDBRequest, ModelDBResponse, ModelUpdateDBRequest};
use crate::types::{abbrev_uuid, ModelId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct ModelFilter {
    pub enabled_only: bool,
    pub role: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
struct ModelRow {
    id: ModelId,
    name: String,
    role: String,
    cost_per_mtoken_in: Decimal,
    cost_per_mtoken_out: Decimal,
    billing_multiplier: Decimal,
    supports_thinking: bool,
    enabled: bool,
    weight: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ModelRow> for ModelDBResponse {
    fn from(r: ModelRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            role: r.role,
            cost_per_mtoken_in: r.cost_per_mtoken_in,
            cost_per_mtoken_out: r.cost_per_mtoken_out,
            billing_multiplier: r.billing_multiplier,
            supports_thinking: r.supports_thinking,
            enabled: r.enabled,
            weight: r.weight,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub struct Models<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Models<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Models<'c> {
    type CreateRequest = ModelCreateDBRequest;
    type UpdateRequest = ModelUpdateDBRequest;
    type Response = ModelDBResponse;
    type Id = ModelId;
    type Filter = ModelFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let row: ModelRow = sqlx::query_as(
            "INSERT INTO models (name, role, cost_per_mtoken_in, cost_per_mtoken_out, billing_multiplier, supports_thinking, enabled, weight)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(&request.name)
        .bind(&request.role)
        .bind(request.cost_per_mtoken_in)
        .bind(request.cost_per_mtoken_out)
        .bind(request.billing_multiplier)
        .bind(request.supports_thinking)
        .bind(request.enabled)
        .bind(request.weight)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(model_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row: Option<ModelRow> = sqlx::query_as("SELECT * FROM models WHERE id = $1")
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
        let rows: Vec<ModelRow> = sqlx::query_as("SELECT * FROM models WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(rows.into_iter().map(|r| (r.id, r.into())).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let rows: Vec<ModelRow> = sqlx::query_as(
            "SELECT * FROM models
             WHERE ($1::bool IS FALSE OR enabled)
               AND ($2::text IS NULL OR role = $2)
             ORDER BY name",
        )
        .bind(filter.enabled_only)
        .bind(&filter.role)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(model_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM models WHERE id = $1").bind(id).execute(&mut *self.db).await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(model_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let row: Option<ModelRow> = sqlx::query_as(
            "UPDATE models SET
                name = COALESCE($2, name),
                role = COALESCE($3, role),
                cost_per_mtoken_in = COALESCE($4, cost_per_mtoken_in),
                cost_per_mtoken_out = COALESCE($5, cost_per_mtoken_out),
                billing_multiplier = COALESCE($6, billing_multiplier),
                supports_thinking = COALESCE($7, supports_thinking),
                enabled = COALESCE($8, enabled),
                weight = COALESCE($9, weight),
                updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.role)
        .bind(request.cost_per_mtoken_in)
        .bind(request.cost_per_mtoken_out)
        .bind(request.billing_multiplier)
        .bind(request.supports_thinking)
        .bind(request.enabled)
        .bind(request.weight)
        .fetch_optional(&mut *self.db)
        .await?;
        row.map(Into::into).ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_req(name: &str) -> ModelCreateDBRequest {
        ModelCreateDBRequest {
            name: name.to_string(),
            role: "default".to_string(),
            cost_per_mtoken_in: Decimal::new(3, 0),
            cost_per_mtoken_out: Decimal::new(15, 0),
            billing_multiplier: Decimal::new(1, 0),
            supports_thinking: false,
            enabled: true,
            weight: 1,
        }
    }

    #[sqlx::test]
    async fn create_and_fetch_roundtrips(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Models::new(&mut conn);
        let created = repo.create(&create_req("claude-sonnet")).await.unwrap();
        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "claude-sonnet");
        assert_eq!(fetched.role, "default");
    }

    #[sqlx::test]
    async fn filter_by_role(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Models::new(&mut conn);
        repo.create(&create_req("simple-model")).await.unwrap();
        let mut complex = create_req("complex-model");
        complex.role = "complex".to_string();
        repo.create(&complex).await.unwrap();

        let found = repo
            .list(&ModelFilter { enabled_only: false, role: Some("complex".to_string()) })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "complex-model");
    }
}
