//! Repository for the `api_keys` table.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::Repository;
use crate::db::models::api_key::{ApiKeyCreateDBRequest, ApiKeyDBResponse, ApiKeyUpdateDBRequest};
use crate::types::{abbrev_uuid, ApiKeyId, UserId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct ApiKeyFilter {
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, FromRow)]
struct ApiKeyRow {
    id: ApiKeyId,
    user_id: UserId,
    name: Option<String>,
    secret_hash: String,
    enabled: bool,
    expires_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ApiKeyRow> for ApiKeyDBResponse {
    fn from(r: ApiKeyRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            secret_hash: r.secret_hash,
            enabled: r.enabled,
            expires_at: r.expires_at,
            revoked_at: r.revoked_at,
            created_at: r.created_at,
        }
    }
}

pub struct ApiKeys<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ApiKeys<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Lookup by the hash of a presented key, the hot path on every proxied
    /// request.
    #[instrument(skip(self, secret_hash), err)]
    pub async fn get_by_secret_hash(&mut self, secret_hash: &str) -> Result<Option<ApiKeyDBResponse>> {
        let row: Option<ApiKeyRow> =
            sqlx::query_as("SELECT * FROM api_keys WHERE secret_hash = $1").bind(secret_hash).fetch_optional(&mut *self.db).await?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), fields(api_key_id = %abbrev_uuid(&id)), err)]
    pub async fn revoke(&mut self, id: ApiKeyId) -> Result<ApiKeyDBResponse> {
        let row: Option<ApiKeyRow> = sqlx::query_as(
            "UPDATE api_keys SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;
        row.map(Into::into).ok_or(DbError::NotFound)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for ApiKeys<'c> {
    type CreateRequest = ApiKeyCreateDBRequest;
    type UpdateRequest = ApiKeyUpdateDBRequest;
    type Response = ApiKeyDBResponse;
    type Id = ApiKeyId;
    type Filter = ApiKeyFilter;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let row: ApiKeyRow = sqlx::query_as(
            "INSERT INTO api_keys (user_id, name, secret_hash, enabled, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(request.user_id)
        .bind(&request.name)
        .bind(&request.secret_hash)
        .bind(request.enabled)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(api_key_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row: Option<ApiKeyRow> = sqlx::query_as("SELECT * FROM api_keys WHERE id = $1").bind(id).fetch_optional(&mut *self.db).await?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<ApiKeyRow> = sqlx::query_as("SELECT * FROM api_keys WHERE id = ANY($1)").bind(&ids).fetch_all(&mut *self.db).await?;
        Ok(rows.into_iter().map(|r| (r.id, r.into())).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let rows: Vec<ApiKeyRow> = sqlx::query_as(
            "SELECT * FROM api_keys WHERE ($1::uuid IS NULL OR user_id = $1) ORDER BY created_at DESC",
        )
        .bind(filter.user_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(api_key_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1").bind(id).execute(&mut *self.db).await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(api_key_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let row: Option<ApiKeyRow> = sqlx::query_as(
            "UPDATE api_keys SET
                name = CASE WHEN $2 THEN $3 ELSE name END,
                enabled = COALESCE($4, enabled),
                expires_at = CASE WHEN $5 THEN $6 ELSE expires_at END,
                revoked_at = CASE WHEN $7 THEN $8 ELSE revoked_at END
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(request.name.is_some())
        .bind(request.name.clone().flatten())
        .bind(request.enabled)
        .bind(request.expires_at.is_some())
        .bind(request.expires_at.flatten())
        .bind(request.revoked_at.is_some())
        .bind(request.revoked_at.flatten())
        .fetch_optional(&mut *self.db)
        .await?;
        row.map(Into::into).ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::Users;
    use crate::db::models::user::UserCreateDBRequest;

    async fn seed_user(conn: &mut PgConnection) -> UserId {
        Users::new(conn)
            .create(&UserCreateDBRequest { username: "alice".to_string(), email: "alice@example.com".to_string(), is_admin: false })
            .await
            .unwrap()
            .id
    }

    #[sqlx::test]
    async fn get_by_secret_hash_finds_active_key(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = seed_user(&mut conn).await;
        let mut repo = ApiKeys::new(&mut conn);
        repo.create(&ApiKeyCreateDBRequest { user_id, name: Some("ci".to_string()), secret_hash: "hash1".to_string(), enabled: true, expires_at: None })
            .await
            .unwrap();

        let found = repo.get_by_secret_hash("hash1").await.unwrap();
        assert!(found.is_some());
        assert!(found.unwrap().is_active(Utc::now()));
    }

    #[sqlx::test]
    async fn revoke_sets_revoked_at_and_deactivates(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = seed_user(&mut conn).await;
        let mut repo = ApiKeys::new(&mut conn);
        let created = repo
            .create(&ApiKeyCreateDBRequest { user_id, name: None, secret_hash: "hash2".to_string(), enabled: true, expires_at: None })
            .await
            .unwrap();

        let revoked = repo.revoke(created.id).await.unwrap();
        assert!(revoked.revoked_at.is_some());
        assert!(!revoked.is_active(Utc::now()));
    }
}
