//! Test fixtures for integration tests.

use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::config::{Args, Config};
use crate::crypto::{generate_api_key, hash_api_key};
use crate::db::handlers::{ApiKeys, Models, ProviderModels, Providers, Repository, RoutingRules, Users};
use crate::db::models::api_key::{ApiKeyCreateDBRequest, ApiKeyDBResponse};
use crate::db::models::model::{ModelCreateDBRequest, ModelDBResponse};
use crate::db::models::provider::{ProviderCreateDBRequest, ProviderDBResponse};
use crate::db::models::provider_model::{ProviderModelCreateDBRequest, ProviderModelDBResponse};
use crate::db::models::routing_rule::{RoutingRuleCreateDBRequest, RoutingRuleDBResponse};
use crate::db::models::user::{UserCreateDBRequest, UserDBResponse};
use crate::types::{ModelId, ProviderId, TaskType, UserId};

/// A config tuned for tests: an unused bind address (the test server never
/// actually binds a socket) and a fixed admin token so handlers can be
/// exercised without going through [`Config::bootstrap`].
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.proxy.host = "127.0.0.1".to_string();
    config.proxy.port = 0;
    config.admin_token = "test-admin-token".to_string();
    config.health_check.enabled = false;
    config.leader.heartbeat_interval = std::time::Duration::from_secs(3600);
    config
}

/// Builds an [`crate::Application`] on top of an already-migrated pool and
/// returns an [`axum_test::TestServer`] driving its router directly, with no
/// socket bound.
pub async fn create_test_app(pool: PgPool) -> axum_test::TestServer {
    let config = create_test_config();
    let app = crate::Application::new_with_pool(config, pool)
        .await
        .expect("failed to build test application");
    axum_test::TestServer::new(app.into_router()).expect("failed to build test server")
}

pub fn admin_auth_header(config: &Config) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", config.admin_token))
}

/// CLI args pointing at a config file that does not exist, so [`Config::bootstrap`]
/// falls back entirely to compiled defaults plus the environment.
pub fn test_args() -> Args {
    Args {
        config: "nonexistent-test-config.yaml".to_string(),
        validate: false,
    }
}

pub async fn create_test_user(pool: &PgPool, is_admin: bool) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("failed to acquire connection");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            username: format!("testuser_{suffix}"),
            email: format!("testuser_{suffix}@example.com"),
            is_admin,
        })
        .await
        .expect("failed to create test user")
}

pub async fn create_test_provider(pool: &PgPool, name: &str, base_url: &str) -> ProviderDBResponse {
    let mut conn = pool.acquire().await.expect("failed to acquire connection");
    Providers::new(&mut conn)
        .create(&ProviderCreateDBRequest {
            name: name.to_string(),
            base_url: base_url.to_string(),
            api_key: None,
            enabled: true,
            weight: 1,
            max_concurrent: 100,
            extra_headers: serde_json::json!({}),
        })
        .await
        .expect("failed to create test provider")
}

pub async fn create_test_model(pool: &PgPool, name: &str, role: &str) -> ModelDBResponse {
    let mut conn = pool.acquire().await.expect("failed to acquire connection");
    Models::new(&mut conn)
        .create(&ModelCreateDBRequest {
            name: name.to_string(),
            role: role.to_string(),
            cost_per_mtoken_in: Decimal::new(300, 2),
            cost_per_mtoken_out: Decimal::new(1500, 2),
            billing_multiplier: Decimal::ONE,
            supports_thinking: false,
            enabled: true,
            weight: 1,
        })
        .await
        .expect("failed to create test model")
}

pub async fn create_test_provider_model(pool: &PgPool, provider_id: ProviderId, model_id: ModelId) -> ProviderModelDBResponse {
    let mut conn = pool.acquire().await.expect("failed to acquire connection");
    ProviderModels::new(&mut conn)
        .create(&ProviderModelCreateDBRequest { provider_id, model_id })
        .await
        .expect("failed to create test provider/model association")
}

/// Wires a fully-routable endpoint: a provider, a model, and the association
/// between them, returning their ids for further fixture setup.
pub async fn create_test_endpoint(pool: &PgPool, provider_name: &str, base_url: &str, model_name: &str, role: &str) -> (ProviderId, ModelId) {
    let provider = create_test_provider(pool, provider_name, base_url).await;
    let model = create_test_model(pool, model_name, role).await;
    create_test_provider_model(pool, provider.id, model.id).await;
    (provider.id, model.id)
}

pub async fn create_test_routing_rule(pool: &PgPool, name: &str, keywords: Vec<String>, task_type: TaskType, priority: i32) -> RoutingRuleDBResponse {
    let mut conn = pool.acquire().await.expect("failed to acquire connection");
    RoutingRules::new(&mut conn)
        .create(&RoutingRuleCreateDBRequest {
            name: name.to_string(),
            description: None,
            keywords,
            regex: None,
            condition: None,
            task_type,
            priority,
            is_builtin: false,
            enabled: true,
        })
        .await
        .expect("failed to create test routing rule")
}

/// Creates an API key for `user_id` and returns both the stored record and
/// the plaintext secret (which, outside tests, is only ever returned once
/// from the creation endpoint).
pub async fn create_test_api_key(pool: &PgPool, user_id: UserId) -> (ApiKeyDBResponse, String) {
    let mut conn = pool.acquire().await.expect("failed to acquire connection");
    let secret = generate_api_key();
    let record = ApiKeys::new(&mut conn)
        .create(&ApiKeyCreateDBRequest {
            user_id,
            name: Some("test key".to_string()),
            secret_hash: hash_api_key(&secret),
            enabled: true,
            expires_at: None,
        })
        .await
        .expect("failed to create test api key");
    (record, secret)
}
