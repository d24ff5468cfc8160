//! Request authentication extractors.
//!
//! Two independent surfaces, two independent extractors: [`ApiKeyUser`]
//! guards the proxy (`x-api-key` / `Authorization: Bearer sk-proxy-...`
//! against the `api_keys` table), [`AdminUser`] guards the admin API (a
//! single static bearer token). Neither tries the other's scheme.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::instrument;

use crate::crypto::hash_api_key;
use crate::db::handlers::{ApiKeys, Repository};
use crate::errors::{Error, Result};
use crate::types::{ApiKeyId, UserId};
use crate::AppState;

/// An authenticated proxy caller, resolved from a hashed API key lookup.
#[derive(Debug, Clone, Copy)]
pub struct ApiKeyUser {
    pub user_id: UserId,
    pub api_key_id: ApiKeyId,
}

fn presented_key(parts: &Parts) -> Option<&str> {
    if let Some(value) = parts.headers.get("x-api-key").and_then(|h| h.to_str().ok()) {
        return Some(value);
    }
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|key| key.starts_with("sk-proxy-"))
}

impl FromRequestParts<AppState> for ApiKeyUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let key = presented_key(parts).ok_or_else(|| Error::Authentication { message: "missing API key".to_string() })?;

        let hash = hash_api_key(key);
        let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
        let record = ApiKeys::new(&mut conn)
            .get_by_secret_hash(&hash)
            .await?
            .ok_or_else(|| Error::Authentication { message: "invalid API key".to_string() })?;

        if !record.is_active(chrono::Utc::now()) {
            return Err(Error::Authentication { message: "API key is disabled, expired, or revoked".to_string() });
        }

        Ok(ApiKeyUser { user_id: record.user_id, api_key_id: record.id })
    }
}

/// An authenticated admin caller: possession of the static admin bearer
/// token is the entire credential, there is no per-admin identity.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser;

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let presented = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| Error::Authentication { message: "missing admin token".to_string() })?;

        if presented != state.config.admin_token {
            return Err(Error::Authentication { message: "invalid admin token".to_string() });
        }
        Ok(AdminUser)
    }
}
