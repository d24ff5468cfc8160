//! L2: durable exact content-hash cache. One row in `routing_cache` per
//! distinct fingerprint; the embedding column is populated only when the
//! semantic cache wrote (or later backfilled) it, so L2 and L3 share one
//! table.

use sqlx::PgConnection;

use crate::db::errors::Result;
use crate::db::handlers::repository::Repository;
use crate::db::handlers::routing_cache::RoutingCache;
use crate::db::models::routing_cache::RoutingCacheCreateDBRequest;
use crate::routing::Decision;
use crate::types::DecisionSource;

/// Exact lookup by `content_hash`, honouring the L2 TTL: a row older than
/// `ttl` is treated as a miss (and not bumped), not deleted.
pub async fn lookup(conn: &mut PgConnection, content_hash: &str, ttl: chrono::Duration) -> Result<Option<Decision>> {
    let mut repo = RoutingCache::new(conn);
    let Some(row) = repo.get_by_content_hash(content_hash).await? else {
        return Ok(None);
    };
    if chrono::Utc::now() - row.created_at > ttl {
        return Ok(None);
    }
    repo.record_hit(row.id).await?;
    Ok(Some(Decision {
        task_type: row.task_type,
        reason: row.reason,
        source: DecisionSource::L2,
        matched_rule_id: None,
        matched_rule_name: None,
        model_used: None,
        from_cache: true,
        latency_ms: 0,
        all_matches: Vec::new(),
    }))
}

/// Insert (or, on a fingerprint collision, leave the existing row be - the
/// `content_hash` column is unique so a duplicate insert is a no-op from the
/// caller's perspective, reported as a `DbError::UniqueViolation` that
/// routing treats as "already cached").
pub async fn insert(
    conn: &mut PgConnection,
    content_hash: String,
    content_preview: String,
    embedding: Option<Vec<f64>>,
    decision: &Decision,
) -> Result<()> {
    let mut repo = RoutingCache::new(conn);
    let request = RoutingCacheCreateDBRequest {
        content_hash,
        content_preview,
        embedding,
        task_type: decision.task_type,
        reason: decision.reason.clone(),
    };
    match repo.create(&request).await {
        Ok(_) => Ok(()),
        Err(crate::db::errors::DbError::UniqueViolation { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}
