//! Repository for the `routing_cache` table, which backs both the L2
//! (exact content-hash) and L3 (semantic/embedding) cache tiers.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::Repository;
use crate::db::models::routing_cache::{RoutingCacheCreateDBRequest, RoutingCacheDBResponse};
use crate::types::{RoutingCacheId, TaskType};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct RoutingCacheFilter {
    pub semantic_only: bool,
}

#[derive(Debug, Clone, FromRow)]
struct RoutingCacheRow {
    id: RoutingCacheId,
    content_hash: String,
    content_preview: String,
    embedding: Option<Vec<f64>>,
    task_type: TaskType,
    reason: String,
    hit_count: i64,
    created_at: DateTime<Utc>,
    last_hit_at: DateTime<Utc>,
}

impl From<RoutingCacheRow> for RoutingCacheDBResponse {
    fn from(r: RoutingCacheRow) -> Self {
        Self {
            id: r.id,
            content_hash: r.content_hash,
            content_preview: r.content_preview,
            embedding: r.embedding,
            task_type: r.task_type,
            reason: r.reason,
            hit_count: r.hit_count,
            created_at: r.created_at,
            last_hit_at: r.last_hit_at,
        }
    }
}

pub struct RoutingCache<'c> {
    db: &'c mut PgConnection,
}

impl<'c> RoutingCache<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// L2 lookup: exact content-hash match, regardless of age. Callers apply
    /// their own freshness window on top of `created_at` if desired.
    #[instrument(skip(self), err)]
    pub async fn get_by_content_hash(&mut self, content_hash: &str) -> Result<Option<RoutingCacheDBResponse>> {
        let row: Option<RoutingCacheRow> = sqlx::query_as("SELECT * FROM routing_cache WHERE content_hash = $1")
            .bind(content_hash)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(row.map(Into::into))
    }

    /// L3 candidate set: every row with an embedding, created within `ttl` of
    /// now. Cosine similarity is scored in-process against this set rather
    /// than in SQL, so the candidate pool stays bounded by the TTL window
    /// rather than by table size.
    #[instrument(skip(self), err)]
    pub async fn list_within_ttl(&mut self, ttl: Duration) -> Result<Vec<RoutingCacheDBResponse>> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        let rows: Vec<RoutingCacheRow> = sqlx::query_as(
            "SELECT * FROM routing_cache WHERE embedding IS NOT NULL AND created_at > now() - $1::interval",
        )
        .bind(ttl)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Record a cache hit: bump `hit_count` and refresh `last_hit_at`, but
    /// leave `created_at` untouched so the TTL window is set once at
    /// insertion and does not reset on every hit.
    #[instrument(skip(self), err)]
    pub async fn record_hit(&mut self, id: RoutingCacheId) -> Result<()> {
        sqlx::query("UPDATE routing_cache SET hit_count = hit_count + 1, last_hit_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for RoutingCache<'c> {
    type CreateRequest = RoutingCacheCreateDBRequest;
    type UpdateRequest = ();
    type Response = RoutingCacheDBResponse;
    type Id = RoutingCacheId;
    type Filter = RoutingCacheFilter;

    #[instrument(skip(self, request), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let row: RoutingCacheRow = sqlx::query_as(
            "INSERT INTO routing_cache (content_hash, content_preview, embedding, task_type, reason)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(&request.content_hash)
        .bind(&request.content_preview)
        .bind(&request.embedding)
        .bind(request.task_type)
        .bind(&request.reason)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row.into())
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row: Option<RoutingCacheRow> =
            sqlx::query_as("SELECT * FROM routing_cache WHERE id = $1").bind(id).fetch_optional(&mut *self.db).await?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<RoutingCacheRow> =
            sqlx::query_as("SELECT * FROM routing_cache WHERE id = ANY($1)").bind(&ids).fetch_all(&mut *self.db).await?;
        Ok(rows.into_iter().map(|r| (r.id, r.into())).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let rows: Vec<RoutingCacheRow> = if filter.semantic_only {
            sqlx::query_as("SELECT * FROM routing_cache WHERE embedding IS NOT NULL ORDER BY created_at DESC")
                .fetch_all(&mut *self.db)
                .await?
        } else {
            sqlx::query_as("SELECT * FROM routing_cache ORDER BY created_at DESC")
                .fetch_all(&mut *self.db)
                .await?
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM routing_cache WHERE id = $1").bind(id).execute(&mut *self.db).await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, _request), err)]
    async fn update(&mut self, id: Self::Id, _request: &Self::UpdateRequest) -> Result<Self::Response> {
        self.record_hit(id).await?;
        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_req(hash: &str, embedding: Option<Vec<f64>>) -> RoutingCacheCreateDBRequest {
        RoutingCacheCreateDBRequest {
            content_hash: hash.to_string(),
            content_preview: "what's 2+2".to_string(),
            embedding,
            task_type: TaskType::Simple,
            reason: "L3 match".to_string(),
        }
    }

    #[sqlx::test]
    async fn get_by_content_hash_finds_exact_match(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = RoutingCache::new(&mut conn);
        repo.create(&create_req("abc123", None)).await.unwrap();

        let found = repo.get_by_content_hash("abc123").await.unwrap();
        assert!(found.is_some());
        let missing = repo.get_by_content_hash("nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[sqlx::test]
    async fn list_within_ttl_excludes_rows_without_embedding(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = RoutingCache::new(&mut conn);
        repo.create(&create_req("no-embed", None)).await.unwrap();
        repo.create(&create_req("with-embed", Some(vec![0.1, 0.2, 0.3]))).await.unwrap();

        let rows = repo.list_within_ttl(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content_hash, "with-embed");
    }

    #[sqlx::test]
    async fn record_hit_preserves_created_at(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = RoutingCache::new(&mut conn);
        let created = repo.create(&create_req("stable", None)).await.unwrap();
        repo.record_hit(created.id).await.unwrap();

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.hit_count, 1);
        assert_eq!(fetched.created_at, created.created_at);
    }
}
