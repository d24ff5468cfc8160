//! HTTP handlers for `/admin/api/v1/providers`.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::models::pagination::Pagination;
use crate::api::models::providers::{ProviderCreate, ProviderResponse, ProviderUpdate};
use crate::auth::current_user::AdminUser;
use crate::db::handlers::{provider::ProviderFilter, Providers, Repository};
use crate::errors::{Error, Result};
use crate::types::ProviderId;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/admin/api/v1/providers",
    tag = "providers",
    request_body = ProviderCreate,
    responses((status = 200, description = "Provider created", body = ProviderResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn create_provider(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<ProviderCreate>,
) -> Result<Json<ProviderResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let created = Providers::new(&mut conn).create(&body.into()).await?;
    Ok(Json(created.into()))
}

#[utoipa::path(
    get,
    path = "/admin/api/v1/providers",
    tag = "providers",
    params(Pagination),
    responses((status = 200, description = "List providers", body = [ProviderResponse])),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn list_providers(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<ProviderResponse>>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let all = Providers::new(&mut conn).list(&ProviderFilter { enabled_only: false }).await?;
    let page = all
        .into_iter()
        .skip(pagination.skip() as usize)
        .take(pagination.limit() as usize)
        .map(Into::into)
        .collect();
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/admin/api/v1/providers/{id}",
    tag = "providers",
    responses((status = 200, description = "Get provider", body = ProviderResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn get_provider(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<ProviderId>) -> Result<Json<ProviderResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let found = Providers::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound { resource: "provider".to_string(), id: id.to_string() })?;
    Ok(Json(found.into()))
}

#[utoipa::path(
    patch,
    path = "/admin/api/v1/providers/{id}",
    tag = "providers",
    request_body = ProviderUpdate,
    responses((status = 200, description = "Provider updated", body = ProviderResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn update_provider(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<ProviderId>,
    Json(body): Json<ProviderUpdate>,
) -> Result<Json<ProviderResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let updated = Providers::new(&mut conn).update(id, &body.into()).await?;
    Ok(Json(updated.into()))
}

#[utoipa::path(
    delete,
    path = "/admin/api/v1/providers/{id}",
    tag = "providers",
    responses((status = 204, description = "Provider deleted")),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn delete_provider(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<ProviderId>) -> Result<axum::http::StatusCode> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let deleted = Providers::new(&mut conn).delete(id).await?;
    if !deleted {
        return Err(Error::NotFound { resource: "provider".to_string(), id: id.to_string() });
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::models::providers::ProviderResponse;
    use crate::test_utils::{admin_auth_header, create_test_app, create_test_config};

    #[sqlx::test]
    async fn create_provider_never_echoes_the_api_key(pool: sqlx::PgPool) {
        let config = create_test_config();
        let server = create_test_app(pool.clone()).await;
        let (name, value) = admin_auth_header(&config);

        let response = server
            .post("/admin/api/v1/providers")
            .add_header(name, value)
            .json(&json!({"name": "anthropic", "base_url": "https://api.anthropic.com", "api_key": "sk-super-secret"}))
            .await;

        response.assert_status(StatusCode::OK);
        let body = response.text();
        assert!(!body.contains("sk-super-secret"));
        let created: ProviderResponse = response.json();
        assert!(created.has_api_key);
    }

    #[sqlx::test]
    async fn list_providers_rejects_requests_without_admin_auth(pool: sqlx::PgPool) {
        let server = create_test_app(pool.clone()).await;
        let response = server.get("/admin/api/v1/providers").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    async fn get_provider_returns_not_found_for_an_unknown_id(pool: sqlx::PgPool) {
        let config = create_test_config();
        let server = create_test_app(pool.clone()).await;
        let (name, value) = admin_auth_header(&config);

        let response = server.get(&format!("/admin/api/v1/providers/{}", uuid::Uuid::new_v4())).add_header(name, value).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    async fn update_then_delete_round_trips(pool: sqlx::PgPool) {
        let config = create_test_config();
        let server = create_test_app(pool.clone()).await;
        let (name, value) = admin_auth_header(&config);

        let created: ProviderResponse = server
            .post("/admin/api/v1/providers")
            .add_header(name, value.clone())
            .json(&json!({"name": "anthropic", "base_url": "https://api.anthropic.com"}))
            .await
            .json();
        assert!(!created.has_api_key);

        let updated = server
            .patch(&format!("/admin/api/v1/providers/{}", created.id))
            .add_header(name, value.clone())
            .json(&json!({"weight": 5}))
            .await;
        updated.assert_status(StatusCode::OK);
        let updated: ProviderResponse = updated.json();
        assert_eq!(updated.weight, 5);

        let deleted = server.delete(&format!("/admin/api/v1/providers/{}", created.id)).add_header(name, value).await;
        deleted.assert_status(StatusCode::NO_CONTENT);
    }
}
