//! Request/response shapes for `/admin/api/v1/api-keys`.
//!
//! Creation is special: the plaintext secret is generated server-side and
//! returned exactly once in [`ApiKeyCreated`]. Every other response only
//! ever carries the hash's existence, never the secret itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::api_key::{ApiKeyDBResponse, ApiKeyUpdateDBRequest};
use crate::types::{ApiKeyId, UserId};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApiKeyCreate {
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ApiKeyUpdate {
    pub name: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub revoked_at: Option<Option<DateTime<Utc>>>,
}

impl From<ApiKeyUpdate> for ApiKeyUpdateDBRequest {
    fn from(u: ApiKeyUpdate) -> Self {
        Self {
            name: u.name,
            enabled: u.enabled,
            expires_at: u.expires_at,
            revoked_at: u.revoked_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyResponse {
    #[schema(value_type = String)]
    pub id: ApiKeyId,
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub name: Option<String>,
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl From<ApiKeyDBResponse> for ApiKeyResponse {
    fn from(r: ApiKeyDBResponse) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            enabled: r.enabled,
            expires_at: r.expires_at,
            revoked_at: r.revoked_at,
            created_at: r.created_at,
        }
    }
}

/// Returned only from the create endpoint, carrying the one-time plaintext key.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyCreated {
    #[serde(flatten)]
    pub key: ApiKeyResponse,
    pub secret: String,
}
