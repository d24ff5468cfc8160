//! HTTP handlers for `/admin/api/v1/api-keys`.
//!
//! Creation generates the plaintext secret server-side, stores only its
//! hash, and returns the plaintext exactly once in the create response.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::models::api_keys::{ApiKeyCreate, ApiKeyCreated, ApiKeyResponse, ApiKeyUpdate};
use crate::api::models::pagination::Pagination;
use crate::auth::current_user::AdminUser;
use crate::crypto::{generate_api_key, hash_api_key};
use crate::db::handlers::{api_key::ApiKeyFilter, ApiKeys, Repository};
use crate::db::models::api_key::ApiKeyCreateDBRequest;
use crate::errors::{Error, Result};
use crate::types::ApiKeyId;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/admin/api/v1/api-keys",
    tag = "api-keys",
    request_body = ApiKeyCreate,
    responses((status = 200, description = "API key created; secret is returned once", body = ApiKeyCreated)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn create_api_key(State(state): State<AppState>, _admin: AdminUser, Json(body): Json<ApiKeyCreate>) -> Result<Json<ApiKeyCreated>> {
    let secret = generate_api_key();
    let db_request = ApiKeyCreateDBRequest {
        user_id: body.user_id,
        name: body.name,
        secret_hash: hash_api_key(&secret),
        enabled: body.enabled,
        expires_at: body.expires_at,
    };

    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let created = ApiKeys::new(&mut conn).create(&db_request).await?;
    Ok(Json(ApiKeyCreated { key: created.into(), secret }))
}

#[utoipa::path(
    get,
    path = "/admin/api/v1/api-keys",
    tag = "api-keys",
    params(Pagination),
    responses((status = 200, description = "List API keys", body = [ApiKeyResponse])),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn list_api_keys(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<ApiKeyResponse>>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let all = ApiKeys::new(&mut conn).list(&ApiKeyFilter { user_id: None }).await?;
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
    path = "/admin/api/v1/api-keys/{id}",
    tag = "api-keys",
    responses((status = 200, description = "Get API key", body = ApiKeyResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn get_api_key(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<ApiKeyId>) -> Result<Json<ApiKeyResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let found = ApiKeys::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound { resource: "api_key".to_string(), id: id.to_string() })?;
    Ok(Json(found.into()))
}

#[utoipa::path(
    patch,
    path = "/admin/api/v1/api-keys/{id}",
    tag = "api-keys",
    request_body = ApiKeyUpdate,
    responses((status = 200, description = "API key updated", body = ApiKeyResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn update_api_key(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<ApiKeyId>,
    Json(body): Json<ApiKeyUpdate>,
) -> Result<Json<ApiKeyResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let updated = ApiKeys::new(&mut conn).update(id, &body.into()).await?;
    Ok(Json(updated.into()))
}

/// Revokes the key rather than deleting the row, preserving it for any
/// request logs that reference it via `matched_rule_id`-style foreign keys.
#[utoipa::path(
    post,
    path = "/admin/api/v1/api-keys/{id}/revoke",
    tag = "api-keys",
    responses((status = 200, description = "API key revoked", body = ApiKeyResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn revoke_api_key(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<ApiKeyId>) -> Result<Json<ApiKeyResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let revoked = ApiKeys::new(&mut conn).revoke(id).await?;
    Ok(Json(revoked.into()))
}

#[utoipa::path(
    delete,
    path = "/admin/api/v1/api-keys/{id}",
    tag = "api-keys",
    responses((status = 204, description = "API key deleted")),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn delete_api_key(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<ApiKeyId>) -> Result<axum::http::StatusCode> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let deleted = ApiKeys::new(&mut conn).delete(id).await?;
    if !deleted {
        return Err(Error::NotFound { resource: "api_key".to_string(), id: id.to_string() });
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::models::api_keys::{ApiKeyCreated, ApiKeyResponse};
    use crate::test_utils::{admin_auth_header, create_test_app, create_test_config, create_test_user};

    #[sqlx::test]
    async fn create_returns_the_secret_once_and_list_never_does(pool: sqlx::PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, false).await;
        let server = create_test_app(pool.clone()).await;
        let (name, value) = admin_auth_header(&config);

        let create_response =
            server.post("/admin/api/v1/api-keys").add_header(name, value.clone()).json(&json!({"user_id": user.id})).await;
        create_response.assert_status(StatusCode::OK);
        let created: ApiKeyCreated = create_response.json();
        assert!(created.secret.starts_with("sk-proxy-"));

        let list_response = server.get("/admin/api/v1/api-keys").add_header(name, value).await;
        let body = list_response.text();
        assert!(!body.contains(&created.secret));
        let keys: Vec<ApiKeyResponse> = list_response.json();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].id, created.key.id);
    }

    #[sqlx::test]
    async fn revoke_marks_the_key_disabled_for_the_proxy(pool: sqlx::PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, false).await;
        let server = create_test_app(pool.clone()).await;
        let (name, value) = admin_auth_header(&config);

        let created: ApiKeyCreated = server
            .post("/admin/api/v1/api-keys")
            .add_header(name, value.clone())
            .json(&json!({"user_id": user.id}))
            .await
            .json();

        let revoked = server.post(&format!("/admin/api/v1/api-keys/{}/revoke", created.key.id)).add_header(name, value).await;
        revoked.assert_status(StatusCode::OK);
        let revoked: ApiKeyResponse = revoked.json();
        assert!(revoked.revoked_at.is_some());
    }
}
