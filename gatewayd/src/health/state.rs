//! Per-endpoint health state: a lock-free counter bundle plus a small
//! mutex-guarded failure reason, updated both by the background prober and
//! by every proxied request.
//!
//! Adapted from the atomic `DeploymentState` in
//! `other_examples/.../litellm-rs__.../deployment.rs`: routing can tolerate
//! slightly stale counters, so every field uses `Relaxed` ordering and no
//! cross-field invariant is maintained atomically.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use crate::types::HealthStatus;

fn status_to_u8(s: HealthStatus) -> u8 {
    match s {
        HealthStatus::Unknown => 0,
        HealthStatus::Healthy => 1,
        HealthStatus::Degraded => 2,
        HealthStatus::Unhealthy => 3,
    }
}

fn status_from_u8(v: u8) -> HealthStatus {
    match v {
        1 => HealthStatus::Healthy,
        2 => HealthStatus::Degraded,
        3 => HealthStatus::Unhealthy,
        _ => HealthStatus::Unknown,
    }
}

#[derive(Debug)]
pub struct EndpointState {
    status: AtomicU8,
    current_connections: AtomicI64,
    total_requests: AtomicU64,
    error_count: AtomicU64,
    /// EMA of response time in milliseconds (alpha = 0.2, matching the
    /// averaging style in `deployment.rs::record_success`).
    avg_response_time_ms: AtomicU64,
    last_check_epoch_ms: AtomicI64,
    consecutive_failures: AtomicU32,
    /// Snapshots in a row this endpoint has been absent from; reaching 2
    /// means the checker's registry drops it.
    missing_snapshots: AtomicU32,
    last_failure_reason: Mutex<Option<String>>,
}

impl Default for EndpointState {
    fn default() -> Self {
        Self {
            status: AtomicU8::new(status_to_u8(HealthStatus::Unknown)),
            current_connections: AtomicI64::new(0),
            total_requests: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            avg_response_time_ms: AtomicU64::new(0),
            last_check_epoch_ms: AtomicI64::new(0),
            consecutive_failures: AtomicU32::new(0),
            missing_snapshots: AtomicU32::new(0),
            last_failure_reason: Mutex::new(None),
        }
    }
}

impl EndpointState {
    pub fn status(&self) -> HealthStatus {
        status_from_u8(self.status.load(Ordering::Relaxed))
    }

    pub fn current_connections(&self) -> i64 {
        self.current_connections.load(Ordering::Relaxed)
    }

    pub fn avg_response_time_ms(&self) -> u64 {
        self.avg_response_time_ms.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn last_failure_reason(&self) -> Option<String> {
        self.last_failure_reason.lock().unwrap().clone()
    }

    /// `UpdateConnections(+1/-1)`: invariant I3 requires the count never go
    /// negative, so a decrement below zero is clamped rather than wrapping.
    pub fn update_connections(&self, delta: i64) {
        if delta >= 0 {
            self.current_connections.fetch_add(delta, Ordering::Relaxed);
        } else {
            let mut cur = self.current_connections.load(Ordering::Relaxed);
            loop {
                let next = (cur + delta).max(0);
                match self.current_connections.compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed) {
                    Ok(_) => break,
                    Err(observed) => cur = observed,
                }
            }
        }
    }

    /// `UpdateResponseTime(ms, ok)`, called after every proxied request
    /// regardless of which process is primary.
    pub fn update_response_time(&self, ms: u64, ok: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        let current_avg = self.avg_response_time_ms.load(Ordering::Relaxed);
        let new_avg = if current_avg == 0 { ms } else { (ms + 4 * current_avg) / 5 };
        self.avg_response_time_ms.store(new_avg, Ordering::Relaxed);
    }

    /// Apply the outcome of a probe (or of a live proxied request, which the
    /// handler also feeds through this same transition so health reacts to
    /// real traffic even on non-primary workers). `unhealthy_after_failures`
    /// is the configured threshold for degraded -> unhealthy.
    ///
    /// Invariant 7: a single failure from `healthy` always lands on
    /// `degraded`, never `unhealthy`, even if the threshold is 1 - the
    /// transition is two separate stores, not one.
    pub fn record_probe(&self, ok: bool, reason: Option<String>, unhealthy_after_failures: u32, now_epoch_ms: i64) {
        self.last_check_epoch_ms.store(now_epoch_ms, Ordering::Relaxed);
        if ok {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            self.status.store(status_to_u8(HealthStatus::Healthy), Ordering::Relaxed);
            *self.last_failure_reason.lock().unwrap() = None;
            return;
        }

        *self.last_failure_reason.lock().unwrap() = reason;
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let current = self.status();
        let next = match current {
            HealthStatus::Healthy | HealthStatus::Unknown => HealthStatus::Degraded,
            HealthStatus::Degraded => {
                if failures >= unhealthy_after_failures {
                    HealthStatus::Unhealthy
                } else {
                    HealthStatus::Degraded
                }
            }
            HealthStatus::Unhealthy => HealthStatus::Unhealthy,
        };
        self.status.store(status_to_u8(next), Ordering::Relaxed);
    }

    pub fn mark_seen(&self) {
        self.missing_snapshots.store(0, Ordering::Relaxed);
    }

    /// Returns true once this endpoint has been absent from two consecutive
    /// snapshots.
    pub fn mark_missing_and_should_evict(&self) -> bool {
        self.missing_snapshots.fetch_add(1, Ordering::Relaxed) + 1 >= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_from_healthy_lands_on_degraded_not_unhealthy() {
        let s = EndpointState::default();
        s.record_probe(true, None, 1, 0);
        assert_eq!(s.status(), HealthStatus::Healthy);
        s.record_probe(false, Some("timeout".to_string()), 1, 1);
        assert_eq!(s.status(), HealthStatus::Degraded);
    }

    #[test]
    fn reaches_unhealthy_after_configured_consecutive_failures() {
        let s = EndpointState::default();
        s.record_probe(true, None, 3, 0);
        s.record_probe(false, None, 3, 1);
        assert_eq!(s.status(), HealthStatus::Degraded);
        s.record_probe(false, None, 3, 2);
        assert_eq!(s.status(), HealthStatus::Degraded);
        s.record_probe(false, None, 3, 3);
        assert_eq!(s.status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn success_recovers_directly_to_healthy() {
        let s = EndpointState::default();
        s.record_probe(false, None, 1, 0);
        s.record_probe(false, None, 1, 1);
        assert_eq!(s.status(), HealthStatus::Unhealthy);
        s.record_probe(true, None, 1, 2);
        assert_eq!(s.status(), HealthStatus::Healthy);
    }

    #[test]
    fn current_connections_never_goes_negative() {
        let s = EndpointState::default();
        s.update_connections(-5);
        assert_eq!(s.current_connections(), 0);
        s.update_connections(3);
        s.update_connections(-1);
        assert_eq!(s.current_connections(), 2);
    }

    #[test]
    fn evicted_only_after_two_consecutive_absences() {
        let s = EndpointState::default();
        assert!(!s.mark_missing_and_should_evict());
        assert!(s.mark_missing_and_should_evict());
    }
}
