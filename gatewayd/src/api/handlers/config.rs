//! HTTP handlers for `/admin/api/v1/config`, the admin surface over the
//! persisted singleton config sections.
//!
//! A `PATCH` to one section validates the merged value against that
//! section's typed shape before persisting, so a malformed update is
//! rejected rather than silently poisoning the next [`crate::config::Config`]
//! re-extraction.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::models::config::{ConfigResponse, ConfigSection, ConfigSectionUpdate};
use crate::auth::current_user::AdminUser;
use crate::config::{HealthCheckConfig, LoadBalanceConfig, ProxyConfig, RoutingConfig, RoutingLlmConfig, UiConfig};
use crate::db::handlers::{shared_state::SharedStateSetRequest, Repository, SharedState};
use crate::errors::{Error, Result};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/admin/api/v1/config",
    tag = "config",
    responses((status = 200, description = "Current effective configuration", body = ConfigResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn get_config(State(state): State<AppState>, _admin: AdminUser) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        proxy: state.config.proxy.clone(),
        health_check: state.config.health_check.clone(),
        load_balance: state.config.load_balance.clone(),
        routing: state.config.routing.clone(),
        routing_llm: state.config.routing_llm.clone(),
        ui: state.config.ui.clone(),
    })
}

#[utoipa::path(
    patch,
    path = "/admin/api/v1/config/{section}",
    tag = "config",
    request_body = ConfigSectionUpdate,
    responses((status = 204, description = "Section persisted")),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin, body))]
pub async fn update_config_section(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(section): Path<ConfigSection>,
    Json(body): Json<ConfigSectionUpdate>,
) -> Result<axum::http::StatusCode> {
    let canonical = validate_section(section, body.value)?;

    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    SharedState::new(&mut conn)
        .set(&SharedStateSetRequest { key: section.key().to_string(), value: canonical.to_string(), updated_by: None })
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Parses `value` against the section's typed shape, then re-serializes it
/// so every persisted row carries every field of its section, not just the
/// ones the caller sent.
fn validate_section(section: ConfigSection, value: serde_json::Value) -> Result<serde_json::Value> {
    let invalid = |e: serde_json::Error| Error::InvalidRequest { message: format!("invalid {} config: {e}", section.key()) };
    let canonical = match section {
        ConfigSection::Proxy => serde_json::to_value(serde_json::from_value::<ProxyConfig>(value).map_err(invalid)?),
        ConfigSection::HealthCheck => serde_json::to_value(serde_json::from_value::<HealthCheckConfig>(value).map_err(invalid)?),
        ConfigSection::LoadBalance => serde_json::to_value(serde_json::from_value::<LoadBalanceConfig>(value).map_err(invalid)?),
        ConfigSection::Routing => serde_json::to_value(serde_json::from_value::<RoutingConfig>(value).map_err(invalid)?),
        ConfigSection::RoutingLlm => serde_json::to_value(serde_json::from_value::<RoutingLlmConfig>(value).map_err(invalid)?),
        ConfigSection::Ui => serde_json::to_value(serde_json::from_value::<UiConfig>(value).map_err(invalid)?),
    };
    canonical.map_err(|e| Error::Internal { message: format!("failed to serialize {} config: {e}", section.key()) })
}
