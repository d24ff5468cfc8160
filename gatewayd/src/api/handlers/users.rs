//! HTTP handlers for `/admin/api/v1/users`.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::models::pagination::Pagination;
use crate::api::models::users::{UserCreate, UserResponse, UserUpdate};
use crate::auth::current_user::AdminUser;
use crate::db::handlers::{user::UserFilter, Repository, Users};
use crate::errors::{Error, Result};
use crate::types::UserId;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/admin/api/v1/users",
    tag = "users",
    request_body = UserCreate,
    responses((status = 200, description = "User created", body = UserResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn create_user(State(state): State<AppState>, _admin: AdminUser, Json(body): Json<UserCreate>) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let created = Users::new(&mut conn).create(&body.into()).await?;
    Ok(Json(created.into()))
}

#[utoipa::path(
    get,
    path = "/admin/api/v1/users",
    tag = "users",
    params(Pagination),
    responses((status = 200, description = "List users", body = [UserResponse])),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<UserResponse>>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let all = Users::new(&mut conn).list(&UserFilter { admins_only: false }).await?;
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
    path = "/admin/api/v1/users/{id}",
    tag = "users",
    responses((status = 200, description = "Get user", body = UserResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn get_user(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<UserId>) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let found = Users::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound { resource: "user".to_string(), id: id.to_string() })?;
    Ok(Json(found.into()))
}

#[utoipa::path(
    patch,
    path = "/admin/api/v1/users/{id}",
    tag = "users",
    request_body = UserUpdate,
    responses((status = 200, description = "User updated", body = UserResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<UserId>,
    Json(body): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let updated = Users::new(&mut conn).update(id, &body.into()).await?;
    Ok(Json(updated.into()))
}

#[utoipa::path(
    delete,
    path = "/admin/api/v1/users/{id}",
    tag = "users",
    responses((status = 204, description = "User deleted")),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn delete_user(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<UserId>) -> Result<axum::http::StatusCode> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let deleted = Users::new(&mut conn).delete(id).await?;
    if !deleted {
        return Err(Error::NotFound { resource: "user".to_string(), id: id.to_string() });
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}
