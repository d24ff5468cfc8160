//! Background health checker: per-endpoint state machine and live counters.
//!
//! Grounded in `probes/scheduler.rs`'s per-item background task shape
//! (resync against the latest endpoint list, `CancellationToken` shutdown)
//! and `probes/executor.rs`'s minimal-compatibility-request probe style,
//! generalised from per-probe-row polling to per-endpoint-in-snapshot
//! polling.

pub mod state;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::Client;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::leader::IsPrimary;
use crate::snapshot::EndpointStore;
pub use state::EndpointState;

/// Registry of per-endpoint health state, keyed by endpoint name
/// (`provider/model`). Shared between the background checker, the proxy
/// handler (`UpdateConnections`/`UpdateResponseTime`), and the selector
/// (status reads).
#[derive(Clone, Default)]
pub struct HealthRegistry {
    inner: Arc<DashMap<String, Arc<EndpointState>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state for `name`, creating it (as `unknown`) if this is
    /// the first time the endpoint has been observed.
    pub fn get_or_create(&self, name: &str) -> Arc<EndpointState> {
        self.inner.entry(name.to_string()).or_default().clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<EndpointState>> {
        self.inner.get(name).map(|e| e.clone())
    }

    pub fn update_connections(&self, name: &str, delta: i64) {
        self.get_or_create(name).update_connections(delta);
    }

    pub fn update_response_time(&self, name: &str, ms: u64, ok: bool) {
        self.get_or_create(name).update_response_time(ms, ok);
    }

    /// Reconcile the registry against the endpoint names currently present
    /// in the snapshot: mark each as seen, and evict any not seen across two
    /// consecutive calls (the resync happens once per probe interval).
    fn reconcile(&self, present: &[String]) {
        let present_set: std::collections::HashSet<&str> = present.iter().map(|s| s.as_str()).collect();
        for name in present {
            self.get_or_create(name).mark_seen();
        }
        let mut to_remove = Vec::new();
        for entry in self.inner.iter() {
            if !present_set.contains(entry.key().as_str()) && entry.value().mark_missing_and_should_evict() {
                to_remove.push(entry.key().clone());
            }
        }
        for name in to_remove {
            self.inner.remove(&name);
            debug!(endpoint = %name, "evicted health state: absent from two consecutive snapshots");
        }
    }

    pub fn snapshot_counts(&self) -> (usize, usize) {
        let mut healthy = 0;
        let mut unhealthy = 0;
        for entry in self.inner.iter() {
            match entry.value().status() {
                crate::types::HealthStatus::Unhealthy => unhealthy += 1,
                crate::types::HealthStatus::Healthy | crate::types::HealthStatus::Degraded | crate::types::HealthStatus::Unknown => {
                    healthy += 1
                }
            }
        }
        (healthy, unhealthy)
    }

    /// Per-endpoint status list for the health endpoint, in no particular order.
    pub fn snapshot(&self) -> Vec<(String, crate::types::HealthStatus)> {
        self.inner.iter().map(|entry| (entry.key().clone(), entry.value().status())).collect()
    }
}

/// Background probe loop. Only probes while `is_leader.get()` is true;
/// non-primary workers keep the registry around (still updated by their own
/// proxied traffic via `UpdateResponseTime`) but skip the network calls.
pub struct HealthChecker {
    registry: HealthRegistry,
    endpoint_store: Arc<EndpointStore>,
    is_leader: IsPrimary,
    config: Config,
    client: Client,
}

impl HealthChecker {
    pub fn new(registry: HealthRegistry, endpoint_store: Arc<EndpointStore>, is_leader: IsPrimary, config: Config) -> Self {
        let client = Client::builder().timeout(config.health_check.timeout).build().unwrap_or_else(|_| Client::new());
        Self { registry, endpoint_store, is_leader, config, client }
    }

    pub fn registry(&self) -> HealthRegistry {
        self.registry.clone()
    }

    /// Force an immediate probe pass regardless of the interval timer, used
    /// by admin `CheckNow` triggers.
    pub async fn check_now(&self) {
        self.run_once().await;
    }

    async fn run_once(&self) {
        if !self.is_leader.get() {
            return;
        }
        let snapshot = self.endpoint_store.get_endpoints();
        let names: Vec<String> = snapshot.endpoints.iter().map(|e| e.name()).collect();
        self.registry.reconcile(&names);

        // Endpoints are probed concurrently; a slow or wedged endpoint must
        // not delay the rest of the cycle. If the snapshot mutates mid-scan
        // we simply finish this pass with the list we started with and
        // resync on the next tick.
        let mut handles = Vec::with_capacity(snapshot.endpoints.len());
        for endpoint in &snapshot.endpoints {
            let client = self.client.clone();
            let base_url = endpoint.base_url.clone();
            let api_key = endpoint.api_key.clone();
            let model_name = endpoint.model_name.clone();
            let name = endpoint.name();
            let state = self.registry.get_or_create(&name);
            let unhealthy_after_failures = self.config.health_check.unhealthy_after_failures;
            handles.push(tokio::spawn(async move {
                let (ok, reason) = probe(&client, &base_url, api_key.as_deref(), &model_name).await;
                let now_ms = chrono::Utc::now().timestamp_millis();
                state.record_probe(ok, reason, unhealthy_after_failures, now_ms);
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Background task entry point: run an initial pass, then probe every
    /// `config.health_check.interval` until cancelled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self, shutdown: CancellationToken) {
        if !self.config.health_check.enabled {
            info!("health checker disabled by configuration");
            return;
        }
        let mut ticker = tokio::time::interval(self.config.health_check.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_once().await,
                _ = shutdown.cancelled() => {
                    info!("health checker shutting down");
                    return;
                }
            }
        }
    }
}

/// Issue a minimal upstream compatibility request. Never propagates an
/// error to the caller - a probe failure is a health-state transition, not
/// an exception.
async fn probe(client: &Client, base_url: &str, api_key: Option<&str>, model_name: &str) -> (bool, Option<String>) {
    let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));
    let body = json!({
        "model": model_name,
        "max_tokens": 1,
        "messages": [{"role": "user", "content": "ping"}],
    });

    let mut request = client.post(&url).json(&body);
    if let Some(key) = api_key {
        request = request.header("x-api-key", key);
    }

    match request.send().await {
        Ok(resp) if resp.status().is_success() => (true, None),
        Ok(resp) => (false, Some(format!("HTTP {}", resp.status()))),
        Err(e) => (false, Some(e.to_string())),
    }
}

/// Overall health summary for `GET /api/health`: unhealthy iff there are no
/// healthy/degraded/unknown endpoints and at least one unhealthy one;
/// degraded iff unhealthy outnumbers healthy; else healthy.
pub fn summarize(healthy: usize, unhealthy: usize) -> &'static str {
    if healthy == 0 && unhealthy > 0 {
        "unhealthy"
    } else if unhealthy > healthy {
        "degraded"
    } else {
        "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_evicts_after_two_absences() {
        let registry = HealthRegistry::new();
        registry.get_or_create("a/b");
        registry.reconcile(&[]);
        assert!(registry.get("a/b").is_some());
        registry.reconcile(&[]);
        assert!(registry.get("a/b").is_none());
    }

    #[test]
    fn reconcile_keeps_endpoints_present_in_snapshot() {
        let registry = HealthRegistry::new();
        registry.get_or_create("a/b");
        registry.reconcile(&["a/b".to_string()]);
        registry.reconcile(&["a/b".to_string()]);
        assert!(registry.get("a/b").is_some());
    }

    #[test]
    fn summarize_applies_healthy_degraded_unhealthy_thresholds() {
        assert_eq!(summarize(0, 0), "healthy");
        assert_eq!(summarize(2, 0), "healthy");
        assert_eq!(summarize(0, 1), "unhealthy");
        assert_eq!(summarize(1, 2), "degraded");
        assert_eq!(summarize(2, 2), "healthy");
    }
}
