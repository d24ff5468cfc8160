//! HTTP handlers for `/admin/api/v1/routing-rules`.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::models::pagination::Pagination;
use crate::api::models::routing_rules::{RoutingRuleCreate, RoutingRuleResponse, RoutingRuleUpdate};
use crate::auth::current_user::AdminUser;
use crate::db::handlers::{routing_rule::RoutingRuleFilter, Repository, RoutingRules};
use crate::errors::{Error, Result};
use crate::types::RoutingRuleId;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/admin/api/v1/routing-rules",
    tag = "routing-rules",
    request_body = RoutingRuleCreate,
    responses((status = 200, description = "Routing rule created", body = RoutingRuleResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn create_routing_rule(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<RoutingRuleCreate>,
) -> Result<Json<RoutingRuleResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let created = RoutingRules::new(&mut conn).create(&body.into()).await?;
    Ok(Json(created.into()))
}

#[utoipa::path(
    get,
    path = "/admin/api/v1/routing-rules",
    tag = "routing-rules",
    params(Pagination),
    responses((status = 200, description = "List routing rules", body = [RoutingRuleResponse])),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn list_routing_rules(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<RoutingRuleResponse>>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let all = RoutingRules::new(&mut conn).list(&RoutingRuleFilter { enabled_only: false }).await?;
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
    path = "/admin/api/v1/routing-rules/{id}",
    tag = "routing-rules",
    responses((status = 200, description = "Get routing rule", body = RoutingRuleResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn get_routing_rule(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<RoutingRuleId>) -> Result<Json<RoutingRuleResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let found = RoutingRules::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound { resource: "routing_rule".to_string(), id: id.to_string() })?;
    Ok(Json(found.into()))
}

#[utoipa::path(
    patch,
    path = "/admin/api/v1/routing-rules/{id}",
    tag = "routing-rules",
    request_body = RoutingRuleUpdate,
    responses((status = 200, description = "Routing rule updated", body = RoutingRuleResponse)),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn update_routing_rule(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<RoutingRuleId>,
    Json(body): Json<RoutingRuleUpdate>,
) -> Result<Json<RoutingRuleResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let updated = RoutingRules::new(&mut conn).update(id, &body.into()).await?;
    Ok(Json(updated.into()))
}

/// Refuses to delete builtin rules (surfaced by the repository as `DbError::ProtectedEntity`).
#[utoipa::path(
    delete,
    path = "/admin/api/v1/routing-rules/{id}",
    tag = "routing-rules",
    responses((status = 204, description = "Routing rule deleted")),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state, _admin))]
pub async fn delete_routing_rule(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<RoutingRuleId>) -> Result<axum::http::StatusCode> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let deleted = RoutingRules::new(&mut conn).delete(id).await?;
    if !deleted {
        return Err(Error::NotFound { resource: "routing_rule".to_string(), id: id.to_string() });
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::models::routing_rules::RoutingRuleResponse;
    use crate::test_utils::{admin_auth_header, create_test_app, create_test_config};

    #[sqlx::test]
    async fn create_list_and_update_a_routing_rule(pool: sqlx::PgPool) {
        let config = create_test_config();
        let server = create_test_app(pool.clone()).await;
        let (name, value) = admin_auth_header(&config);

        let created = server
            .post("/admin/api/v1/routing-rules")
            .add_header(name, value.clone())
            .json(&json!({"name": "billing-keywords", "keywords": ["invoice", "refund"], "task_type": "complex", "priority": 5}))
            .await;
        created.assert_status(StatusCode::OK);
        let created: RoutingRuleResponse = created.json();
        assert_eq!(created.priority, 5);

        let listed: Vec<RoutingRuleResponse> = server.get("/admin/api/v1/routing-rules").add_header(name, value.clone()).await.json();
        assert_eq!(listed.len(), 1);

        let updated = server
            .patch(&format!("/admin/api/v1/routing-rules/{}", created.id))
            .add_header(name, value)
            .json(&json!({"enabled": false}))
            .await;
        updated.assert_status(StatusCode::OK);
        let updated: RoutingRuleResponse = updated.json();
        assert!(!updated.enabled);
    }

    #[sqlx::test]
    async fn delete_returns_not_found_for_an_unknown_id(pool: sqlx::PgPool) {
        let config = create_test_config();
        let server = create_test_app(pool.clone()).await;
        let (name, value) = admin_auth_header(&config);

        let response = server.delete(&format!("/admin/api/v1/routing-rules/{}", uuid::Uuid::new_v4())).add_header(name, value).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }
}
