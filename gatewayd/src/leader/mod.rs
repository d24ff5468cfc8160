//! Worker coordination: leader election, heartbeat, and failover.
//!
//! Exclusive background duties (health probes, cache sweeps) key off
//! [`IsPrimary`]. Leadership is *best-effort*, not consensus: a single-row
//! compare-and-set against `worker_registry` gives at-most-one-winner per
//! contention window, and brief double-leader windows around crashes are
//! tolerable because the duties gated on it are idempotent.
//!
//! Adapted from the interval-driven gain/lose-leadership loop in the
//! Postgres-advisory-lock leader election this crate started from, redirected
//! onto registry CAS + heartbeat + stale sweep instead of a session-held
//! advisory lock (advisory locks don't survive a worker crash cleanly; a
//! heartbeat row does).

use crate::config::Config;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Shared flag consulted by the health checker and cache sweepers.
#[derive(Clone, Default)]
pub struct IsPrimary(pub Arc<AtomicBool>);

impl IsPrimary {
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Register this process in `worker_registry` on startup. Not primary yet.
#[instrument(skip(pool))]
pub async fn register(pool: &PgPool, worker_id: &str, pid: i32) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO worker_registry (worker_id, pid, is_primary, last_heartbeat, created_at)
         VALUES ($1, $2, false, now(), now())
         ON CONFLICT (worker_id) DO UPDATE SET pid = excluded.pid, last_heartbeat = now()",
    )
    .bind(worker_id)
    .bind(pid)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete this process's record. Called on graceful shutdown.
#[instrument(skip(pool))]
pub async fn deregister(pool: &PgPool, worker_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM worker_registry WHERE worker_id = $1")
        .bind(worker_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn heartbeat(pool: &PgPool, worker_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE worker_registry SET last_heartbeat = now() WHERE worker_id = $1")
        .bind(worker_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete every worker (primary or not) whose heartbeat is older than
/// `stale_after`. A heartbeat exactly at the threshold is NOT stale (closed
/// interval): the `<` below, not `<=`, is load-bearing.
async fn sweep_dead_workers(pool: &PgPool, stale_after: Duration) -> Result<u64, sqlx::Error> {
    let seconds = stale_after.as_secs_f64();
    let result = sqlx::query("DELETE FROM worker_registry WHERE last_heartbeat < now() - make_interval(secs => $1)")
        .bind(seconds)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Attempt the CAS that makes this worker primary. Succeeds only if no
/// worker currently holds `is_primary`.
async fn try_become_primary(pool: &PgPool, worker_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE worker_registry SET is_primary = true
         WHERE worker_id = $1 AND NOT EXISTS (SELECT 1 FROM worker_registry WHERE is_primary)",
    )
    .bind(worker_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Background task driving heartbeat + election. Runs every
/// `config.leader.heartbeat_interval` (default 10s, the same cadence used for
/// election attempts), deleting any worker record (dead primary or dead
/// follower) whose heartbeat is older than `config.leader.stale_after`
/// (default 30s) before each election attempt.
#[instrument(skip(pool, config, is_leader, on_gain_leadership, on_lose_leadership, shutdown))]
pub async fn run<F1, F2, Fut1, Fut2>(
    pool: PgPool,
    config: Config,
    worker_id: String,
    is_leader: IsPrimary,
    on_gain_leadership: F1,
    on_lose_leadership: F2,
    shutdown: CancellationToken,
) where
    F1: Fn(PgPool, Config) -> Fut1 + Send + 'static,
    F2: Fn(PgPool, Config) -> Fut2 + Send + 'static,
    Fut1: std::future::Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    Fut2: std::future::Future<Output = Result<(), anyhow::Error>> + Send + 'static,
{
    let heartbeat_interval = config.leader.heartbeat_interval;
    let stale_after = config.leader.stale_after;
    let mut interval = tokio::time::interval(heartbeat_interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => {
                info!("leader election task shutting down");
                let _ = deregister(&pool, &worker_id).await;
                return;
            }
        }

        let currently_primary = is_leader.get();

        if currently_primary {
            if let Err(e) = heartbeat(&pool, &worker_id).await {
                warn!("failed to renew heartbeat, assuming leadership lost: {}", e);
                is_leader.0.store(false, Ordering::Relaxed);
                if let Err(e) = on_lose_leadership(pool.clone(), config.clone()).await {
                    tracing::error!("on_lose_leadership callback failed: {}", e);
                }
            } else {
                debug!("leadership renewed");
            }
            continue;
        }

        match sweep_dead_workers(&pool, stale_after).await {
            Ok(deleted) if deleted > 0 => info!(deleted, "removed dead worker records before election attempt"),
            Ok(_) => {}
            Err(e) => warn!("dead-worker sweep failed: {}", e),
        }

        if let Err(e) = heartbeat(&pool, &worker_id).await {
            warn!("failed to send heartbeat as candidate: {}", e);
        }

        match try_become_primary(&pool, &worker_id).await {
            Ok(true) => {
                info!("gained leadership");
                is_leader.0.store(true, Ordering::Relaxed);
                if let Err(e) = on_gain_leadership(pool.clone(), config.clone()).await {
                    tracing::error!("on_gain_leadership callback failed: {}", e);
                }
            }
            Ok(false) => debug!("following - another worker holds leadership"),
            Err(e) => tracing::error!("leader election CAS failed: {}", e),
        }
    }
}

/// Generate a unique worker id for this process, combining a random suffix
/// with the OS pid for readability in logs.
pub fn new_worker_id() -> String {
    format!("worker-{}-{}", std::process::id(), Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    async fn only_one_worker_can_hold_primary_at_once(pool: sqlx::PgPool) {
        register(&pool, "worker-a", 1).await.unwrap();
        register(&pool, "worker-b", 2).await.unwrap();

        assert!(try_become_primary(&pool, "worker-a").await.unwrap());
        assert!(!try_become_primary(&pool, "worker-b").await.unwrap());

        let primaries: i64 = sqlx::query_scalar("SELECT count(*) FROM worker_registry WHERE is_primary")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(primaries, 1);
    }

    #[sqlx::test]
    async fn losing_worker_can_become_primary_once_incumbent_is_cleared(pool: sqlx::PgPool) {
        register(&pool, "worker-a", 1).await.unwrap();
        register(&pool, "worker-b", 2).await.unwrap();
        assert!(try_become_primary(&pool, "worker-a").await.unwrap());

        sqlx::query("UPDATE worker_registry SET is_primary = false WHERE worker_id = 'worker-a'")
            .execute(&pool)
            .await
            .unwrap();

        assert!(try_become_primary(&pool, "worker-b").await.unwrap());
    }

    #[sqlx::test]
    async fn sweep_dead_workers_deletes_only_expired_heartbeats(pool: sqlx::PgPool) {
        register(&pool, "worker-a", 1).await.unwrap();
        register(&pool, "worker-b", 2).await.unwrap();
        assert!(try_become_primary(&pool, "worker-a").await.unwrap());

        sqlx::query("UPDATE worker_registry SET last_heartbeat = now() - interval '1 hour' WHERE worker_id = 'worker-a'")
            .execute(&pool)
            .await
            .unwrap();

        let deleted = sweep_dead_workers(&pool, Duration::from_secs(30)).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining: Vec<String> = sqlx::query_scalar("SELECT worker_id FROM worker_registry").fetch_all(&pool).await.unwrap();
        assert_eq!(remaining, vec!["worker-b".to_string()]);
    }

    #[sqlx::test]
    async fn sweep_dead_workers_deletes_dead_followers_too(pool: sqlx::PgPool) {
        register(&pool, "worker-a", 1).await.unwrap();
        register(&pool, "worker-b", 2).await.unwrap();
        assert!(try_become_primary(&pool, "worker-a").await.unwrap());

        sqlx::query("UPDATE worker_registry SET last_heartbeat = now() - interval '1 hour' WHERE worker_id = 'worker-b'")
            .execute(&pool)
            .await
            .unwrap();

        let deleted = sweep_dead_workers(&pool, Duration::from_secs(30)).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining: Vec<String> = sqlx::query_scalar("SELECT worker_id FROM worker_registry").fetch_all(&pool).await.unwrap();
        assert_eq!(remaining, vec!["worker-a".to_string()]);
    }

    #[sqlx::test]
    async fn deregister_removes_the_worker_row(pool: sqlx::PgPool) {
        register(&pool, "worker-a", 1).await.unwrap();
        deregister(&pool, "worker-a").await.unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT count(*) FROM worker_registry WHERE worker_id = 'worker-a'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
