//! HTTP handlers for `/admin/api/v1/models`.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::models::models::{ModelCreate, ModelResponse, ModelUpdate};
use crate::api::models::pagination::Pagination;
use crate::auth::current_user::AdminUser;
use crate::db::handlers::{model::ModelFilter, Models, Repository};
use crate::errors::{Error, Result};
use crate::types::ModelId;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/admin/api/v1/models",
    tag = "models",
    request_body = ModelCreate,
    responses((status = 200, description = "Model created", body = ModelResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn create_model(State(state): State<AppState>, _admin: AdminUser, Json(body): Json<ModelCreate>) -> Result<Json<ModelResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let created = Models::new(&mut conn).create(&body.into()).await?;
    Ok(Json(created.into()))
}

#[utoipa::path(
    get,
    path = "/admin/api/v1/models",
    tag = "models",
    params(Pagination),
    responses((status = 200, description = "List models", body = [ModelResponse])),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn list_models(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<ModelResponse>>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let all = Models::new(&mut conn).list(&ModelFilter { enabled_only: false, role: None }).await?;
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
    path = "/admin/api/v1/models/{id}",
    tag = "models",
    responses((status = 200, description = "Get model", body = ModelResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn get_model(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<ModelId>) -> Result<Json<ModelResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let found = Models::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound { resource: "model".to_string(), id: id.to_string() })?;
    Ok(Json(found.into()))
}

#[utoipa::path(
    patch,
    path = "/admin/api/v1/models/{id}",
    tag = "models",
    request_body = ModelUpdate,
    responses((status = 200, description = "Model updated", body = ModelResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn update_model(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<ModelId>,
    Json(body): Json<ModelUpdate>,
) -> Result<Json<ModelResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let updated = Models::new(&mut conn).update(id, &body.into()).await?;
    Ok(Json(updated.into()))
}

#[utoipa::path(
    delete,
    path = "/admin/api/v1/models/{id}",
    tag = "models",
    responses((status = 204, description = "Model deleted")),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn delete_model(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<ModelId>) -> Result<axum::http::StatusCode> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let deleted = Models::new(&mut conn).delete(id).await?;
    if !deleted {
        return Err(Error::NotFound { resource: "model".to_string(), id: id.to_string() });
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}
