//! Request/response shapes for `/admin/api/v1/providers`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use crate::db::models::provider::{ProviderCreateDBRequest, ProviderDBResponse, ProviderUpdateDBRequest};
use crate::types::ProviderId;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProviderCreate {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_weight")]
    pub weight: i32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: i32,
    #[serde(default)]
    pub extra_headers: JsonValue,
}

fn default_true() -> bool {
    true
}

fn default_weight() -> i32 {
    1
}

fn default_max_concurrent() -> i32 {
    100
}

impl From<ProviderCreate> for ProviderCreateDBRequest {
    fn from(c: ProviderCreate) -> Self {
        Self {
            name: c.name,
            base_url: c.base_url,
            api_key: c.api_key,
            enabled: c.enabled,
            weight: c.weight,
            max_concurrent: c.max_concurrent,
            extra_headers: if c.extra_headers.is_null() { serde_json::json!({}) } else { c.extra_headers },
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProviderUpdate {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub weight: Option<i32>,
    pub max_concurrent: Option<i32>,
    pub extra_headers: Option<JsonValue>,
}

impl From<ProviderUpdate> for ProviderUpdateDBRequest {
    fn from(u: ProviderUpdate) -> Self {
        Self {
            name: u.name,
            base_url: u.base_url,
            api_key: u.api_key,
            enabled: u.enabled,
            weight: u.weight,
            max_concurrent: u.max_concurrent,
            extra_headers: u.extra_headers,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProviderResponse {
    #[schema(value_type = String)]
    pub id: ProviderId,
    pub name: String,
    pub base_url: String,
    /// Never echoes the stored credential; `true` iff one is configured.
    pub has_api_key: bool,
    pub enabled: bool,
    pub weight: i32,
    pub max_concurrent: i32,
    pub extra_headers: JsonValue,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl From<ProviderDBResponse> for ProviderResponse {
    fn from(r: ProviderDBResponse) -> Self {
        Self {
            id: r.id,
            name: r.name,
            base_url: r.base_url,
            has_api_key: r.api_key.is_some(),
            enabled: r.enabled,
            weight: r.weight,
            max_concurrent: r.max_concurrent,
            extra_headers: r.extra_headers,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
