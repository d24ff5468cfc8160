//! Endpoint selector: turns a task type plus the current snapshot into one
//! concrete endpoint.
//!
//! The per-task-type atomic cursor and tie-break-by-weight style mirror the
//! counter-per-deployment idiom common to weighted load balancers.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::health::HealthRegistry;
use crate::snapshot::{Endpoint, Snapshot};
use crate::types::{HealthStatus, LoadBalanceStrategy, TaskType};

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("no healthy endpoint for task type {0}")]
    NoHealthyEndpoint(TaskType),
}

/// Per-task-type round-robin cursor. Reset whenever the snapshot generation
/// it was last used against changes, so a reload never replays stale
/// indices against a different endpoint ordering.
#[derive(Default)]
struct Cursor {
    index: AtomicU64,
    generation: AtomicU64,
}

/// Holds the mutable selection state (round-robin cursors) across calls;
/// everything else is derived fresh from the snapshot and health registry on
/// every `select` call.
pub struct Selector {
    cursors: DashMap<TaskType, Cursor>,
}

impl Default for Selector {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector {
    pub fn new() -> Self {
        Self { cursors: DashMap::new() }
    }

    pub fn select<'a>(
        &self,
        task_type: TaskType,
        strategy: LoadBalanceStrategy,
        conversation_key: &str,
        snapshot: &'a Snapshot,
        health: &HealthRegistry,
    ) -> Result<&'a Endpoint, SelectionError> {
        let candidates = self.filter(task_type, snapshot, health)?;

        let chosen = match strategy {
            LoadBalanceStrategy::RoundRobin => self.round_robin(task_type, snapshot.generation, &candidates),
            LoadBalanceStrategy::Weighted => weighted(&candidates),
            LoadBalanceStrategy::LeastConnections => least_connections(&candidates, health),
            LoadBalanceStrategy::ConversationHash => conversation_hash(conversation_key, &candidates),
        };

        chosen.ok_or(SelectionError::NoHealthyEndpoint(task_type))
    }

    /// Base filter: role match, health not unhealthy, concurrency headroom.
    /// Relaxes in stages: admit degraded, then admit unknown, then cross
    /// over to the `default` role, then fail.
    fn filter<'a>(&self, task_type: TaskType, snapshot: &'a Snapshot, health: &HealthRegistry) -> Result<Vec<&'a Endpoint>, SelectionError> {
        let role = task_type.to_string();
        let with_headroom = |e: &&Endpoint| health.get(&e.name()).map(|s| s.current_connections() < e.max_concurrent as i64).unwrap_or(true);

        let base: Vec<&Endpoint> = snapshot.by_role(&role).filter(with_headroom).filter(|e| status_of(health, e) == HealthStatus::Healthy).collect();
        if !base.is_empty() {
            return Ok(base);
        }

        let degraded: Vec<&Endpoint> =
            snapshot.by_role(&role).filter(with_headroom).filter(|e| status_of(health, e) == HealthStatus::Degraded).collect();
        if !degraded.is_empty() {
            return Ok(degraded);
        }

        let not_unhealthy: Vec<&Endpoint> =
            snapshot.by_role(&role).filter(with_headroom).filter(|e| status_of(health, e) != HealthStatus::Unhealthy).collect();
        if !not_unhealthy.is_empty() {
            return Ok(not_unhealthy);
        }

        if role != "default" {
            let default_role: Vec<&Endpoint> =
                snapshot.by_role("default").filter(with_headroom).filter(|e| status_of(health, e) != HealthStatus::Unhealthy).collect();
            if !default_role.is_empty() {
                return Ok(default_role);
            }
        }

        Err(SelectionError::NoHealthyEndpoint(task_type))
    }

    fn round_robin<'a>(&self, task_type: TaskType, generation: u64, candidates: &[&'a Endpoint]) -> Option<&'a Endpoint> {
        if candidates.is_empty() {
            return None;
        }
        let cursor = self.cursors.entry(task_type).or_default();
        if cursor.generation.swap(generation, Ordering::Relaxed) != generation {
            cursor.index.store(0, Ordering::Relaxed);
        }
        let index = cursor.index.fetch_add(1, Ordering::Relaxed) as usize % candidates.len();
        Some(candidates[index])
    }
}

fn status_of(health: &HealthRegistry, endpoint: &Endpoint) -> HealthStatus {
    health.get(&endpoint.name()).map(|s| s.status()).unwrap_or(HealthStatus::Unknown)
}

fn combined_weight(e: &Endpoint) -> u64 {
    (e.provider_weight.max(1) as u64) * (e.model_weight.max(1) as u64)
}

/// Weighted random by `provider.weight * model.weight`. Selection draws
/// from the process RNG rather than a seeded sequence, with a fixed
/// first-candidate tie-break only among endpoints sharing the top weight.
fn weighted<'a>(candidates: &[&'a Endpoint]) -> Option<&'a Endpoint> {
    if candidates.is_empty() {
        return None;
    }
    let max_weight = candidates.iter().map(|e| combined_weight(e)).max().unwrap_or(1);
    let tied: Vec<&&Endpoint> = candidates.iter().filter(|e| combined_weight(e) == max_weight).collect();
    let total: u64 = candidates.iter().map(|e| combined_weight(e)).sum();
    if total == 0 {
        return candidates.first().copied();
    }

    let mut target = rand::random::<u64>() % total;
    for endpoint in candidates {
        let w = combined_weight(endpoint);
        if target < w {
            // Tie-break within the top weight tier round-robins by picking
            // the first tied candidate in snapshot order rather than
            // re-rolling, which keeps this function side-effect free.
            if tied.len() > 1 && combined_weight(endpoint) == max_weight {
                return Some(*tied[0]);
            }
            return Some(*endpoint);
        }
        target = target.saturating_sub(w);
    }
    candidates.last().copied()
}

fn least_connections<'a>(candidates: &[&'a Endpoint], health: &HealthRegistry) -> Option<&'a Endpoint> {
    candidates
        .iter()
        .min_by_key(|e| {
            let connections = health.get(&e.name()).map(|s| s.current_connections()).unwrap_or(0);
            (connections, std::cmp::Reverse(combined_weight(e)))
        })
        .copied()
}

fn conversation_hash<'a>(conversation_key: &str, candidates: &[&'a Endpoint]) -> Option<&'a Endpoint> {
    if candidates.is_empty() {
        return None;
    }
    let mut hasher = DefaultHasher::new();
    conversation_key.hash(&mut hasher);
    let index = (hasher.finish() as usize) % candidates.len();
    Some(candidates[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModelId, ProviderId, ProviderModelId};

    fn endpoint(role: &str, weight: i32) -> Endpoint {
        Endpoint {
            id: ProviderModelId::new_v4(),
            provider_id: ProviderId::new_v4(),
            provider_name: "anthropic".to_string(),
            base_url: "http://mock".to_string(),
            api_key: None,
            provider_weight: 1,
            max_concurrent: 10,
            extra_headers: serde_json::json!({}),
            model_id: ModelId::new_v4(),
            model_name: format!("model-{weight}"),
            role: role.to_string(),
            cost_per_mtoken_in: rust_decimal::Decimal::ONE,
            cost_per_mtoken_out: rust_decimal::Decimal::ONE,
            billing_multiplier: rust_decimal::Decimal::ONE,
            supports_thinking: false,
            model_weight: weight,
        }
    }

    fn healthy_registry(names: &[&str]) -> HealthRegistry {
        let registry = HealthRegistry::new();
        for name in names {
            let state = registry.get_or_create(name);
            state.record_probe(true, None, 3, 0);
        }
        registry
    }

    #[test]
    fn round_robin_cycles_through_all_candidates() {
        let selector = Selector::new();
        let endpoints = vec![endpoint("simple", 1), endpoint("simple", 2)];
        let snapshot = Snapshot { endpoints, generation: 1 };
        let health = healthy_registry(&["anthropic/model-1", "anthropic/model-2"]);

        let first = selector.select(TaskType::Simple, LoadBalanceStrategy::RoundRobin, "", &snapshot, &health).unwrap().model_name.clone();
        let second = selector.select(TaskType::Simple, LoadBalanceStrategy::RoundRobin, "", &snapshot, &health).unwrap().model_name.clone();
        assert_ne!(first, second);
    }

    #[test]
    fn round_robin_resets_cursor_on_generation_change() {
        let selector = Selector::new();
        let endpoints = vec![endpoint("simple", 1), endpoint("simple", 2)];
        let health = healthy_registry(&["anthropic/model-1", "anthropic/model-2"]);

        let snapshot_a = Snapshot { endpoints: endpoints.clone(), generation: 1 };
        selector.select(TaskType::Simple, LoadBalanceStrategy::RoundRobin, "", &snapshot_a, &health).unwrap();

        let snapshot_b = Snapshot { endpoints, generation: 2 };
        let picked = selector.select(TaskType::Simple, LoadBalanceStrategy::RoundRobin, "", &snapshot_b, &health);
        assert!(picked.is_ok());
    }

    #[test]
    fn filter_relaxes_to_degraded_when_no_healthy_endpoint() {
        let selector = Selector::new();
        let endpoints = vec![endpoint("simple", 1)];
        let snapshot = Snapshot { endpoints, generation: 1 };
        let health = HealthRegistry::new();
        let state = health.get_or_create("anthropic/model-1");
        state.record_probe(true, None, 1, 0);
        state.record_probe(false, None, 1, 1);
        assert_eq!(state.status(), HealthStatus::Degraded);

        let picked = selector.select(TaskType::Simple, LoadBalanceStrategy::RoundRobin, "", &snapshot, &health);
        assert!(picked.is_ok());
    }

    #[test]
    fn filter_crosses_to_default_role_as_last_resort() {
        let selector = Selector::new();
        let mut default_endpoint = endpoint("default", 1);
        default_endpoint.model_name = "fallback-model".to_string();
        let snapshot = Snapshot { endpoints: vec![default_endpoint], generation: 1 };
        let health = healthy_registry(&["anthropic/fallback-model"]);

        let picked = selector.select(TaskType::Complex, LoadBalanceStrategy::RoundRobin, "", &snapshot, &health).unwrap();
        assert_eq!(picked.model_name, "fallback-model");
    }

    #[test]
    fn fails_when_no_endpoint_survives_relaxation() {
        let selector = Selector::new();
        let snapshot = Snapshot { endpoints: vec![], generation: 1 };
        let health = HealthRegistry::new();
        let result = selector.select(TaskType::Simple, LoadBalanceStrategy::RoundRobin, "", &snapshot, &health);
        assert!(result.is_err());
    }

    #[test]
    fn conversation_hash_is_stable_for_the_same_key() {
        let endpoints = vec![endpoint("simple", 1), endpoint("simple", 1), endpoint("simple", 1)];
        let refs: Vec<&Endpoint> = endpoints.iter().collect();
        let a = conversation_hash("conversation-42", &refs).unwrap().model_name.clone();
        let b = conversation_hash("conversation-42", &refs).unwrap().model_name.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn least_connections_prefers_the_least_loaded_endpoint() {
        let endpoints = vec![endpoint("simple", 1), endpoint("simple", 1)];
        let health = HealthRegistry::new();
        health.update_connections(&endpoints[0].name(), 5);
        health.update_connections(&endpoints[1].name(), 1);
        let refs: Vec<&Endpoint> = endpoints.iter().collect();
        let picked = least_connections(&refs, &health).unwrap();
        assert_eq!(picked.model_name, endpoints[1].model_name);
    }
}
