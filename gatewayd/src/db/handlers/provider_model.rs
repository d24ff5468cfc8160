//! Repository for the `provider_models` association table.
//!
//! This table carries no mutable attributes of its own — a provider/model pair
//! either exists or doesn't — so [`Repository::update`] is a no-op refetch.
//! The interesting read path is [`ProviderModels::list_endpoints`], which joins
//! providers and models into the flat [`EndpointRow`] shape the snapshot
//! builder consumes.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::Repository;
use crate::db::models::provider_model::{EndpointRow, ProviderModelCreateDBRequest, ProviderModelDBResponse};
use crate::types::{abbrev_uuid, ModelId, ProviderId, ProviderModelId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct ProviderModelFilter {
    pub provider_id: Option<ProviderId>,
    pub model_id: Option<ModelId>,
}

#[derive(Debug, Clone, FromRow)]
struct ProviderModelRow {
    id: ProviderModelId,
    provider_id: ProviderId,
    model_id: ModelId,
    created_at: DateTime<Utc>,
}

impl From<ProviderModelRow> for ProviderModelDBResponse {
    fn from(r: ProviderModelRow) -> Self {
        Self { id: r.id, provider_id: r.provider_id, model_id: r.model_id, created_at: r.created_at }
    }
}

pub struct ProviderModels<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ProviderModels<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Every enabled provider/model pair, joined into the flat shape the
    /// endpoint snapshot is built from. Disabled providers or models are
    /// excluded here rather than filtered downstream.
    #[instrument(skip(self), err)]
    pub async fn list_endpoints(&mut self) -> Result<Vec<EndpointRow>> {
        let rows: Vec<EndpointRow> = sqlx::query_as(
            "SELECT
                pm.id, pm.provider_id,
                p.name AS provider_name, p.base_url, p.api_key,
                p.enabled AS provider_enabled, p.weight AS provider_weight,
                p.max_concurrent, p.extra_headers,
                pm.model_id, m.name AS model_name, m.role,
                m.cost_per_mtoken_in, m.cost_per_mtoken_out, m.billing_multiplier,
                m.supports_thinking, m.enabled AS model_enabled, m.weight AS model_weight
             FROM provider_models pm
             JOIN providers p ON p.id = pm.provider_id
             JOIN models m ON m.id = pm.model_id
             WHERE p.enabled AND m.enabled
             ORDER BY m.name, p.name",
        )
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for ProviderModels<'c> {
    type CreateRequest = ProviderModelCreateDBRequest;
    type UpdateRequest = ();
    type Response = ProviderModelDBResponse;
    type Id = ProviderModelId;
    type Filter = ProviderModelFilter;

    #[instrument(skip(self, request), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let row: ProviderModelRow = sqlx::query_as(
            "INSERT INTO provider_models (provider_id, model_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(request.provider_id)
        .bind(request.model_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(provider_model_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row: Option<ProviderModelRow> =
            sqlx::query_as("SELECT * FROM provider_models WHERE id = $1").bind(id).fetch_optional(&mut *self.db).await?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<ProviderModelRow> =
            sqlx::query_as("SELECT * FROM provider_models WHERE id = ANY($1)").bind(&ids).fetch_all(&mut *self.db).await?;
        Ok(rows.into_iter().map(|r| (r.id, r.into())).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let rows: Vec<ProviderModelRow> = sqlx::query_as(
            "SELECT * FROM provider_models
             WHERE ($1::uuid IS NULL OR provider_id = $1)
               AND ($2::uuid IS NULL OR model_id = $2)
             ORDER BY created_at",
        )
        .bind(filter.provider_id)
        .bind(filter.model_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(provider_model_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM provider_models WHERE id = $1").bind(id).execute(&mut *self.db).await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, _request), fields(provider_model_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, _request: &Self::UpdateRequest) -> Result<Self::Response> {
        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::{Models, Providers};
    use crate::db::models::model::ModelCreateDBRequest;
    use crate::db::models::provider::ProviderCreateDBRequest;

    async fn seed(conn: &mut PgConnection) -> (ProviderId, ModelId) {
        let provider = Providers::new(conn)
            .create(&ProviderCreateDBRequest {
                name: "anthropic".to_string(),
                base_url: "http://mock".to_string(),
                api_key: None,
                enabled: true,
                weight: 1,
                max_concurrent: 100,
                extra_headers: serde_json::json!({}),
            })
            .await
            .unwrap();
        let model = Models::new(conn)
            .create(&ModelCreateDBRequest {
                name: "claude-sonnet".to_string(),
                role: "default".to_string(),
                cost_per_mtoken_in: Default::default(),
                cost_per_mtoken_out: Default::default(),
                billing_multiplier: rust_decimal::Decimal::new(1, 0),
                supports_thinking: false,
                enabled: true,
                weight: 1,
            })
            .await
            .unwrap();
        (provider.id, model.id)
    }

    #[sqlx::test]
    async fn list_endpoints_joins_provider_and_model(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let (provider_id, model_id) = seed(&mut conn).await;
        ProviderModels::new(&mut conn)
            .create(&ProviderModelCreateDBRequest { provider_id, model_id })
            .await
            .unwrap();

        let endpoints = ProviderModels::new(&mut conn).list_endpoints().await.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].provider_name, "anthropic");
        assert_eq!(endpoints[0].model_name, "claude-sonnet");
    }

    #[sqlx::test]
    async fn disabled_provider_excluded_from_endpoints(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let (provider_id, model_id) = seed(&mut conn).await;
        ProviderModels::new(&mut conn)
            .create(&ProviderModelCreateDBRequest { provider_id, model_id })
            .await
            .unwrap();
        sqlx::query("UPDATE providers SET enabled = false WHERE id = $1")
            .bind(provider_id)
            .execute(&mut *conn)
            .await
            .unwrap();

        let endpoints = ProviderModels::new(&mut conn).list_endpoints().await.unwrap();
        assert!(endpoints.is_empty());
    }
}
