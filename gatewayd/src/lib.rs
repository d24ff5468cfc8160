//! # gatewayd: reverse proxy for Anthropic Messages-format chat APIs
//!
//! `gatewayd` sits in front of one or more Anthropic-compatible inference
//! providers and exposes a single `POST /v1/messages` endpoint. Every
//! request is classified into a task type (simple/default/complex/
//! background/think/web_search), routed to a healthy endpoint for that
//! type, and logged asynchronously for analytics.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer and PostgreSQL for persistence: the endpoint catalog,
//! routing rules, the durable tiers of the routing cache, request logs, and
//! the leader-election registry all live in one database.
//!
//! ### Request flow
//!
//! A request to `POST /v1/messages` is authenticated against the
//! `api_keys` table ([`auth::current_user::ApiKeyUser`]), classified by
//! [`routing::llm_router::LlmRouter`] into a task type, handed to
//! [`routing::selector::Selector`] to pick a concrete, healthy endpoint from
//! the current [`snapshot::EndpointStore`] snapshot, and forwarded
//! ([`proxy::handler`]) either buffered or as a streamed SSE passthrough.
//! The outcome is pushed onto a bounded channel and written in batches by
//! [`request_logging::RequestLogWriter`]; logging never blocks the request
//! path.
//!
//! A background [`health::HealthChecker`] probes every endpoint on an
//! interval and only one worker in a multi-process deployment does so,
//! gated by [`leader::IsPrimary`], itself driven by a Postgres
//! compare-and-set against `worker_registry`.
//!
//! ### Admin surface
//!
//! `/admin/api/v1/*` exposes CRUD over users, proxy API keys, providers,
//! models, provider/model associations, routing rules, and the persisted
//! config sections ([`api`]). It is gated by a single static bearer token
//! ([`auth::current_user::AdminUser`]), not by the per-request proxy key.
//!
//! ## Quick start
//!
//! ```no_run
//! use clap::Parser;
//! use gatewayd::config::Args;
//! use gatewayd::Application;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = Args::parse();
//!     gatewayd::telemetry::init_telemetry()?;
//!     let app = Application::new(args).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
//!     })
//!     .await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod errors;
pub mod health;
pub mod leader;
pub mod proxy;
pub mod request_logging;
pub mod routing;
pub mod snapshot;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{header, Method};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use bon::Builder;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

pub use config::{Args, Config};

use crate::db::handlers::{Repository, SharedState};
use crate::health::{HealthChecker, HealthRegistry};
use crate::leader::IsPrimary;
use crate::request_logging::{RequestLogSender, RequestLogWriter};
use crate::routing::embedding::{DeterministicEmbeddingBackend, EmbeddingBackend, HttpEmbeddingBackend};
use crate::routing::llm_router::LlmRouter;
use crate::routing::selector::Selector;
use crate::snapshot::EndpointStore;

pub use types::{ApiKeyId, ModelId, ProviderId, ProviderModelId, UserId};

/// Shared state handed to every request handler.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub endpoint_store: Arc<EndpointStore>,
    pub health: HealthRegistry,
    pub selector: Arc<Selector>,
    pub router: Arc<LlmRouter>,
    pub log_sender: RequestLogSender,
    pub http: reqwest::Client,
    pub is_leader: IsPrimary,
    pub shutdown: CancellationToken,
}

/// A running (or about-to-run) instance: owns the pool and the background
/// tasks' shutdown handle, separately from [`AppState`] so tests can clone
/// the state without cloning ownership of the shutdown sequence.
pub struct Application {
    pool: PgPool,
    app_state: AppState,
    shutdown: CancellationToken,
    worker_id: String,
}

/// Reads every persisted config section row into one merged JSON object,
/// ready to layer into [`Config::with_persisted`].
async fn load_persisted_config(pool: &PgPool) -> anyhow::Result<serde_json::Value> {
    let mut conn = pool.acquire().await?;
    let rows = SharedState::new(&mut conn).list(&Default::default()).await?;
    let mut merged = serde_json::Map::new();
    for row in rows {
        match serde_json::from_str(&row.value) {
            Ok(value) => {
                merged.insert(row.key, value);
            }
            Err(e) => {
                tracing::warn!(key = %row.key, error = %e, "skipping unparseable persisted config row");
            }
        }
    }
    Ok(serde_json::Value::Object(merged))
}

impl Application {
    /// Production entry point: bootstraps configuration from env/CLI args,
    /// connects to the database, runs migrations, layers in any persisted
    /// config sections, and wires up every background task.
    pub async fn new(args: Args) -> anyhow::Result<Self> {
        let bootstrap_config = Config::bootstrap(&args).context("failed to load configuration")?;

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(&bootstrap_config.database_url)
            .await
            .context("failed to connect to database")?;

        db::run_migrations(&pool).await.context("failed to run database migrations")?;

        let persisted = load_persisted_config(&pool).await.context("failed to load persisted configuration")?;
        let config = Config::with_persisted(&args, persisted).context("failed to merge persisted configuration")?;

        Self::new_with_pool(config, pool).await
    }

    /// Test/embedding entry point: takes an already-resolved [`Config`] and
    /// an already-connected pool, skipping the bootstrap/persisted-config
    /// dance. Still runs migrations and wires up every background task.
    pub async fn new_with_pool(config: Config, pool: PgPool) -> anyhow::Result<Self> {
        db::run_migrations(&pool).await.context("failed to run database migrations")?;

        let endpoint_store = Arc::new(EndpointStore::new());
        endpoint_store.reload(&pool).await.context("initial endpoint snapshot reload failed")?;

        let health = HealthRegistry::new();
        let is_leader = IsPrimary(Arc::new(AtomicBool::new(false)));
        let shutdown = CancellationToken::new();

        let health_checker = HealthChecker::new(health.clone(), Arc::clone(&endpoint_store), is_leader.clone(), config.clone());
        tokio::spawn(health_checker.run(shutdown.clone()));

        let selector = Arc::new(Selector::new());

        let embedding: Arc<dyn EmbeddingBackend> = match &config.routing.embedding_endpoint_url {
            Some(url) => Arc::new(HttpEmbeddingBackend::new(url.clone())),
            None => Arc::new(DeterministicEmbeddingBackend::new(config.routing.embedding_dimension)),
        };
        let router = Arc::new(LlmRouter::new(config.routing.clone(), config.routing_llm.clone(), pool.clone(), embedding, Arc::clone(&endpoint_store)));

        let (log_writer, log_sender) = RequestLogWriter::new(
            pool.clone(),
            config.request_log.batch_size,
            config.request_log.max_retries,
            Duration::from_millis(config.request_log.retry_base_delay_ms),
        );
        tokio::spawn(log_writer.run(shutdown.clone()));

        let worker_id = leader::new_worker_id();
        leader::register(&pool, &worker_id, std::process::id() as i32).await.context("failed to register worker")?;

        tokio::spawn(leader::run(
            pool.clone(),
            config.clone(),
            worker_id.clone(),
            is_leader.clone(),
            |_pool, _config| async { Ok::<(), anyhow::Error>(()) },
            |_pool, _config| async { Ok::<(), anyhow::Error>(()) },
            shutdown.clone(),
        ));

        let http = reqwest::Client::builder().timeout(config.proxy.upstream_timeout).build().context("failed to build http client")?;

        let app_state = AppState::builder()
            .db(pool.clone())
            .config(config)
            .endpoint_store(endpoint_store)
            .health(health)
            .selector(selector)
            .router(router)
            .log_sender(log_sender)
            .http(http)
            .is_leader(is_leader)
            .shutdown(shutdown.clone())
            .build();

        Ok(Self { pool, app_state, shutdown, worker_id })
    }

    pub fn state(&self) -> &AppState {
        &self.app_state
    }

    /// Build the full router without binding a socket, for use in tests
    /// (`axum_test::TestServer`) or embedding in a larger service.
    pub fn into_router(&self) -> Router {
        build_router(self.app_state.clone())
    }

    /// Bind and serve until `shutdown_signal` resolves, then drain
    /// background tasks and deregister from leader election.
    #[tracing::instrument(skip(self, shutdown_signal))]
    pub async fn serve<F>(self, shutdown_signal: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_address = self.app_state.config.bind_address();
        let listener = TcpListener::bind(&bind_address).await.with_context(|| format!("failed to bind {bind_address}"))?;
        info!(address = %bind_address, "gatewayd listening");

        let app = build_router(self.app_state.clone());
        axum::serve(listener, app.into_make_service()).with_graceful_shutdown(shutdown_signal).await?;

        self.shutdown.cancel();
        if let Err(e) = leader::deregister(&self.pool, &self.worker_id).await {
            tracing::warn!(error = %e, "failed to deregister worker on shutdown");
        }
        self.pool.close().await;

        Ok(())
    }
}

fn build_router(app_state: AppState) -> Router {
    let (prometheus_layer, metric_handle) = axum_prometheus::PrometheusMetricLayer::pair();

    let admin_routes = Router::new()
        .route("/users", get(api::handlers::users::list_users).post(api::handlers::users::create_user))
        .route(
            "/users/{id}",
            get(api::handlers::users::get_user).patch(api::handlers::users::update_user).delete(api::handlers::users::delete_user),
        )
        .route("/api-keys", get(api::handlers::api_keys::list_api_keys).post(api::handlers::api_keys::create_api_key))
        .route(
            "/api-keys/{id}",
            get(api::handlers::api_keys::get_api_key).patch(api::handlers::api_keys::update_api_key).delete(api::handlers::api_keys::delete_api_key),
        )
        .route("/api-keys/{id}/revoke", post(api::handlers::api_keys::revoke_api_key))
        .route("/providers", get(api::handlers::providers::list_providers).post(api::handlers::providers::create_provider))
        .route(
            "/providers/{id}",
            get(api::handlers::providers::get_provider).patch(api::handlers::providers::update_provider).delete(api::handlers::providers::delete_provider),
        )
        .route("/models", get(api::handlers::models::list_models).post(api::handlers::models::create_model))
        .route(
            "/models/{id}",
            get(api::handlers::models::get_model).patch(api::handlers::models::update_model).delete(api::handlers::models::delete_model),
        )
        .route(
            "/provider-models",
            get(api::handlers::provider_models::list_provider_models).post(api::handlers::provider_models::create_provider_model),
        )
        .route("/provider-models/{id}", delete(api::handlers::provider_models::delete_provider_model))
        .route(
            "/routing-rules",
            get(api::handlers::routing_rules::list_routing_rules).post(api::handlers::routing_rules::create_routing_rule),
        )
        .route(
            "/routing-rules/{id}",
            get(api::handlers::routing_rules::get_routing_rule)
                .patch(api::handlers::routing_rules::update_routing_rule)
                .delete(api::handlers::routing_rules::delete_routing_rule),
        )
        .route("/config", get(api::handlers::config::get_config))
        .route("/config/{section}", patch(api::handlers::config::update_config_section));

    Router::new()
        .route("/v1/messages", post(proxy::proxy_messages))
        .route("/api/health", get(health))
        .nest("/admin/api/v1", admin_routes)
        .route("/internal/metrics", get(move || std::future::ready(metric_handle.render())))
        .layer(prometheus_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::HeaderName::from_static("x-api-key")]),
        )
        .with_state(app_state)
}

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> axum::Json<serde_json::Value> {
    let (healthy, unhealthy) = state.health.snapshot_counts();
    let endpoints: Vec<serde_json::Value> =
        state.health.snapshot().into_iter().map(|(name, status)| serde_json::json!({"name": name, "status": status.to_string()})).collect();
    axum::Json(serde_json::json!({
        "status": health::summarize(healthy, unhealthy),
        "version": env!("CARGO_PKG_VERSION"),
        "healthy": healthy,
        "unhealthy": unhealthy,
        "endpoints": endpoints,
    }))
}
