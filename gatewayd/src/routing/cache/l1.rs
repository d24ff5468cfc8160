//! L1: in-process LRU map from request fingerprint to routing decision.
//!
//! Built on `moka::sync::Cache` (`Cache::builder().max_capacity(..)
//! .time_to_live(..)`) rather than `moka::future`, since L1 lookups sit on
//! a hot, non-blocking path.

use std::time::Duration;

use moka::sync::Cache;

use crate::routing::Decision;

/// Fixed-capacity, TTL-bounded, LRU-evicted map `fingerprint -> Decision`.
/// Expired entries are dropped lazily on access.
#[derive(Clone)]
pub struct L1Cache {
    inner: Cache<String, Decision>,
}

impl L1Cache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self { inner: Cache::builder().max_capacity(capacity).time_to_live(ttl).build() }
    }

    pub fn get(&self, fingerprint: &str) -> Option<Decision> {
        self.inner.get(fingerprint)
    }

    pub fn put(&self, fingerprint: String, decision: Decision) {
        self.inner.insert(fingerprint, decision);
    }

    /// Entry count after running moka's pending maintenance tasks, i.e. the
    /// true current size rather than an eventually-consistent estimate.
    /// Invariant I5 (`L1 size <= configured maximum`) is checked against
    /// this.
    pub fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecisionSource, TaskType};

    fn decision() -> Decision {
        Decision {
            task_type: TaskType::Simple,
            reason: "test".to_string(),
            source: DecisionSource::L1,
            matched_rule_id: None,
            matched_rule_name: None,
            model_used: None,
            from_cache: true,
            latency_ms: 0,
            all_matches: Vec::new(),
        }
    }

    #[test]
    fn put_then_get_roundtrips() {
        let cache = L1Cache::new(100, Duration::from_secs(60));
        cache.put("fp1".to_string(), decision());
        let got = cache.get("fp1").unwrap();
        assert_eq!(got.task_type, TaskType::Simple);
    }

    #[test]
    fn miss_returns_none() {
        let cache = L1Cache::new(100, Duration::from_secs(60));
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn size_never_exceeds_configured_capacity() {
        let cache = L1Cache::new(10, Duration::from_secs(60));
        for i in 0..1000 {
            cache.put(format!("fp{i}"), decision());
        }
        assert!(cache.len() <= 10);
    }
}
