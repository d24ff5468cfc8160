//! Read-oriented repository over `worker_registry` for the admin surface.
//!
//! Registration, heartbeat, and the election CAS are operational concerns
//! owned by [`crate::leader`], which talks to this table with raw queries of
//! its own rather than through [`Repository`] — those writes need exact
//! control over CAS semantics and a bare `sqlx::Error` that the leader loop
//! treats as transient, neither of which fits the generic create/update
//! contract here. This repository exists so the admin API can list workers
//! and force-deregister a dead one; `create`/`update` are intentionally
//! unsupported from this side.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::Repository;
use crate::db::models::worker_registry::WorkerRegistryDBResponse;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct WorkerRegistryFilter {
    pub primary_only: bool,
}

#[derive(Debug, Clone, FromRow)]
struct WorkerRegistryRow {
    worker_id: String,
    pid: i32,
    is_primary: bool,
    last_heartbeat: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<WorkerRegistryRow> for WorkerRegistryDBResponse {
    fn from(r: WorkerRegistryRow) -> Self {
        Self { worker_id: r.worker_id, pid: r.pid, is_primary: r.is_primary, last_heartbeat: r.last_heartbeat, created_at: r.created_at }
    }
}

pub struct WorkerRegistry<'c> {
    db: &'c mut PgConnection,
}

impl<'c> WorkerRegistry<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl<'c> Repository for WorkerRegistry<'c> {
    type CreateRequest = ();
    type UpdateRequest = ();
    type Response = WorkerRegistryDBResponse;
    type Id = String;
    type Filter = WorkerRegistryFilter;

    async fn create(&mut self, _request: &Self::CreateRequest) -> Result<Self::Response> {
        Err(DbError::ProtectedEntity {
            entity_type: "worker_registry".to_string(),
            reason: "workers register themselves on startup".to_string(),
        })
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row: Option<WorkerRegistryRow> =
            sqlx::query_as("SELECT * FROM worker_registry WHERE worker_id = $1").bind(id).fetch_optional(&mut *self.db).await?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<WorkerRegistryRow> =
            sqlx::query_as("SELECT * FROM worker_registry WHERE worker_id = ANY($1)").bind(&ids).fetch_all(&mut *self.db).await?;
        Ok(rows.into_iter().map(|r| (r.worker_id.clone(), r.into())).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let rows: Vec<WorkerRegistryRow> = if filter.primary_only {
            sqlx::query_as("SELECT * FROM worker_registry WHERE is_primary").fetch_all(&mut *self.db).await?
        } else {
            sqlx::query_as("SELECT * FROM worker_registry ORDER BY created_at").fetch_all(&mut *self.db).await?
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Force-deregister a worker, e.g. one that crashed without running its
    /// shutdown hook. Distinct from the stale-primary sweep, which only
    /// clears the `is_primary` flag and leaves the row for the worker to
    /// reclaim on restart.
    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM worker_registry WHERE worker_id = $1").bind(id).execute(&mut *self.db).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update(&mut self, _id: Self::Id, _request: &Self::UpdateRequest) -> Result<Self::Response> {
        Err(DbError::ProtectedEntity {
            entity_type: "worker_registry".to_string(),
            reason: "heartbeat and leadership state are owned by the leader election loop".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leader;

    #[sqlx::test]
    async fn list_reflects_registered_workers(pool: sqlx::PgPool) {
        leader::register(&pool, "worker-a", 111).await.unwrap();
        leader::register(&pool, "worker-b", 222).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let workers = WorkerRegistry::new(&mut conn).list(&WorkerRegistryFilter::default()).await.unwrap();
        assert_eq!(workers.len(), 2);
    }

    #[sqlx::test]
    async fn delete_removes_worker(pool: sqlx::PgPool) {
        leader::register(&pool, "worker-a", 111).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let removed = WorkerRegistry::new(&mut conn).delete("worker-a".to_string()).await.unwrap();
        assert!(removed);
        assert!(WorkerRegistry::new(&mut conn).get_by_id("worker-a".to_string()).await.unwrap().is_none());
    }
}
