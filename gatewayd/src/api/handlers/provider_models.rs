//! HTTP handlers for `/admin/api/v1/provider-models`, the association
//! records that turn a (provider, model) pair into a routable endpoint.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::models::pagination::Pagination;
use crate::api::models::provider_models::{ProviderModelCreate, ProviderModelResponse};
use crate::auth::current_user::AdminUser;
use crate::db::handlers::{provider_model::ProviderModelFilter, ProviderModels, Repository};
use crate::errors::{Error, Result};
use crate::types::ProviderModelId;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/admin/api/v1/provider-models",
    tag = "provider-models",
    request_body = ProviderModelCreate,
    responses((status = 200, description = "Provider/model association created", body = ProviderModelResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn create_provider_model(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<ProviderModelCreate>,
) -> Result<Json<ProviderModelResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let created = ProviderModels::new(&mut conn).create(&body.into()).await?;
    Ok(Json(created.into()))
}

#[utoipa::path(
    get,
    path = "/admin/api/v1/provider-models",
    tag = "provider-models",
    params(Pagination),
    responses((status = 200, description = "List provider/model associations", body = [ProviderModelResponse])),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn list_provider_models(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<ProviderModelResponse>>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let all = ProviderModels::new(&mut conn)
        .list(&ProviderModelFilter { provider_id: None, model_id: None })
        .await?;
    let page = all
        .into_iter()
        .skip(pagination.skip() as usize)
        .take(pagination.limit() as usize)
        .map(Into::into)
        .collect();
    Ok(Json(page))
}

#[utoipa::path(
    delete,
    path = "/admin/api/v1/provider-models/{id}",
    tag = "provider-models",
    responses((status = 204, description = "Association deleted")),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn delete_provider_model(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<ProviderModelId>) -> Result<axum::http::StatusCode> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let deleted = ProviderModels::new(&mut conn).delete(id).await?;
    if !deleted {
        return Err(Error::NotFound { resource: "provider_model".to_string(), id: id.to_string() });
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}
