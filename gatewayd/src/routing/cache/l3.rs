//! L3: durable semantic cache. Brute-force cosine similarity scan over the
//! set of L2 rows with an embedding, within the configured L3 TTL window -
//! acceptable at the expected scale of up to roughly 10^4 rows.

use std::time::Duration;

use crate::db::errors::Result;
use crate::db::handlers::repository::Repository;
use crate::db::handlers::routing_cache::RoutingCache;
use crate::db::models::routing_cache::RoutingCacheDBResponse;
use crate::routing::Decision;
use crate::types::DecisionSource;

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Find the candidate row with the highest cosine similarity to
/// `query_embedding`. A similarity exactly equal to `threshold` is a hit
/// (closed interval).
pub async fn semantic_lookup(
    conn: &mut sqlx::PgConnection,
    query_embedding: &[f64],
    ttl: Duration,
    threshold: f64,
) -> Result<Option<(RoutingCacheDBResponse, f64)>> {
    let mut repo = RoutingCache::new(conn);
    let candidates = repo.list_within_ttl(ttl).await?;

    let mut best: Option<(RoutingCacheDBResponse, f64)> = None;
    for row in candidates {
        let Some(embedding) = &row.embedding else { continue };
        let similarity = cosine_similarity(query_embedding, embedding);
        if best.as_ref().map(|(_, s)| similarity > *s).unwrap_or(true) {
            best = Some((row, similarity));
        }
    }

    match best {
        Some((row, similarity)) if similarity >= threshold => {
            repo.record_hit(row.id).await?;
            Ok(Some((row, similarity)))
        }
        _ => Ok(None),
    }
}

pub fn to_decision(row: &RoutingCacheDBResponse, source_reason_prefix: &str) -> Decision {
    Decision {
        task_type: row.task_type,
        reason: format!("{source_reason_prefix}{}", row.reason),
        source: DecisionSource::L3,
        matched_rule_id: None,
        matched_rule_name: None,
        model_used: None,
        from_cache: true,
        latency_ms: 0,
        all_matches: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![0.6, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-9);
    }

    #[test]
    fn mismatched_dimensions_are_zero_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }
}
