//! Endpoint store: materialises the `{provider x model}` cross product into
//! an immutable [`Snapshot`] and publishes it for lock-free reads.
//!
//! Adapted from the `watch::channel`-based publication in
//! `sync/onwards_config.rs` (`OnwardsConfigSync`), simplified from its
//! LISTEN/NOTIFY-driven reconciliation loop to an explicit `reload()` called
//! by admin mutation handlers, plus an `ArcSwap` for the O(1) hot-path read
//! the onwards sync only approximated with a `watch::Receiver::borrow()`.

use std::sync::Arc;

use arc_swap::ArcSwap;
use sqlx::PgPool;
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::db::handlers::provider_model::ProviderModels;
use crate::db::models::provider_model::EndpointRow;
use crate::types::{ModelId, ProviderId, ProviderModelId};

/// One `{provider x model}` pairing as the routing and health layers see it.
/// Immutable: a new snapshot is built wholesale rather than mutating this in
/// place.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: ProviderModelId,
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub provider_weight: i32,
    pub max_concurrent: i32,
    pub extra_headers: serde_json::Value,
    pub model_id: ModelId,
    pub model_name: String,
    pub role: String,
    pub cost_per_mtoken_in: rust_decimal::Decimal,
    pub cost_per_mtoken_out: rust_decimal::Decimal,
    pub billing_multiplier: rust_decimal::Decimal,
    pub supports_thinking: bool,
    pub model_weight: i32,
}

impl Endpoint {
    /// `"<provider>/<model>"`, an endpoint's identity string.
    pub fn name(&self) -> String {
        format!("{}/{}", self.provider_name, self.model_name)
    }
}

impl From<EndpointRow> for Endpoint {
    fn from(r: EndpointRow) -> Self {
        Self {
            id: r.id,
            provider_id: r.provider_id,
            provider_name: r.provider_name,
            base_url: r.base_url,
            api_key: r.api_key,
            provider_weight: r.provider_weight,
            max_concurrent: r.max_concurrent,
            extra_headers: r.extra_headers,
            model_id: r.model_id,
            model_name: r.model_name,
            role: r.role,
            cost_per_mtoken_in: r.cost_per_mtoken_in,
            cost_per_mtoken_out: r.cost_per_mtoken_out,
            billing_multiplier: r.billing_multiplier,
            supports_thinking: r.supports_thinking,
            model_weight: r.model_weight,
        }
    }
}

/// An immutable, point-in-time view of every enabled endpoint. Readers hold
/// an `Arc<Snapshot>` for the lifetime of one request; a reload never
/// mutates an existing snapshot, it builds and swaps in a new one.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub endpoints: Vec<Endpoint>,
    /// Monotonic generation counter, bumped on every reload. Used by
    /// [`crate::routing::selector`] to detect a swap and reset its cursors.
    pub generation: u64,
}

impl Snapshot {
    pub fn by_role<'a>(&'a self, role: &str) -> impl Iterator<Item = &'a Endpoint> {
        self.endpoints.iter().filter(move |e| e.role == role)
    }
}

/// Publishes immutable endpoint snapshots and notifies subscribers on swap.
///
/// `GetEndpoints` is a cheap `ArcSwap::load_full`; `Subscribe` hands out a
/// `watch::Receiver` whose `changed()` resolves on every reload and whose
/// `borrow()` always returns the current generation, satisfying "late
/// subscribers must still observe the current snapshot immediately."
pub struct EndpointStore {
    current: ArcSwap<Snapshot>,
    notify_tx: watch::Sender<u64>,
    notify_rx: watch::Receiver<u64>,
}

impl EndpointStore {
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = watch::channel(0);
        Self {
            current: ArcSwap::from_pointee(Snapshot::default()),
            notify_tx,
            notify_rx,
        }
    }

    /// O(1) reference to the current snapshot. Never blocks on a reload in
    /// progress: the swap is atomic, so a reader either sees the old or the
    /// new snapshot in full, never a partially built one.
    pub fn get_endpoints(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// A receiver whose `changed()` resolves once per swap. Cloning this
    /// store's receiver rather than subscribing to the sender directly means
    /// a subscriber that arrives after several reloads still sees the
    /// latest generation on its first `borrow()`.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify_rx.clone()
    }

    /// Read all enabled providers and models, build the cross product of
    /// their associations, and atomically swap in the new snapshot.
    #[instrument(skip(self, pool))]
    pub async fn reload(&self, pool: &PgPool) -> Result<usize, anyhow::Error> {
        let mut conn = pool.acquire().await?;
        let rows = ProviderModels::new(&mut conn).list_endpoints().await?;
        let count = rows.len();
        let generation = self.current.load().generation + 1;
        let snapshot = Snapshot {
            endpoints: rows.into_iter().map(Endpoint::from).collect(),
            generation,
        };
        self.current.store(Arc::new(snapshot));
        self.notify_tx.send_replace(generation);
        info!(endpoint_count = count, generation, "endpoint snapshot reloaded");
        Ok(count)
    }

    /// Fire-and-forget reload for admin mutation handlers: request latency
    /// must not wait on a store scan, so callers spawn this rather than
    /// awaiting it inline.
    pub fn reload_and_notify(self: &Arc<Self>, pool: PgPool) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = store.reload(&pool).await {
                tracing::error!("endpoint snapshot reload failed: {:#}", e);
            }
        });
    }
}

impl Default for EndpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl EndpointStore {
    /// Builds a store pre-loaded with a fixed endpoint list, bypassing
    /// `reload`'s database round trip for tests that only need a stable
    /// snapshot to select against.
    pub fn new_with_endpoints(endpoints: Vec<Endpoint>) -> Self {
        let store = Self::new();
        store.current.store(Arc::new(Snapshot { endpoints, generation: 1 }));
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(role: &str) -> Endpoint {
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
            model_name: "claude-3-haiku".to_string(),
            role: role.to_string(),
            cost_per_mtoken_in: rust_decimal::Decimal::ONE,
            cost_per_mtoken_out: rust_decimal::Decimal::ONE,
            billing_multiplier: rust_decimal::Decimal::ONE,
            supports_thinking: false,
            model_weight: 1,
        }
    }

    #[test]
    fn endpoint_name_is_provider_slash_model() {
        assert_eq!(endpoint("simple").name(), "anthropic/claude-3-haiku");
    }

    #[tokio::test]
    async fn late_subscriber_observes_current_generation_immediately() {
        let store = EndpointStore::new();
        store.current.store(Arc::new(Snapshot { endpoints: vec![endpoint("simple")], generation: 7 }));
        store.notify_tx.send_replace(7);

        let rx = store.subscribe();
        assert_eq!(*rx.borrow(), 7);
    }

    #[test]
    fn get_endpoints_returns_empty_snapshot_before_first_reload() {
        let store = EndpointStore::new();
        let snapshot = store.get_endpoints();
        assert!(snapshot.endpoints.is_empty());
        assert_eq!(snapshot.generation, 0);
    }
}
