use crate::types::ProviderId;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone)]
pub struct ProviderCreateDBRequest {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub enabled: bool,
    pub weight: i32,
    pub max_concurrent: i32,
    pub extra_headers: JsonValue,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderUpdateDBRequest {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub weight: Option<i32>,
    pub max_concurrent: Option<i32>,
    pub extra_headers: Option<JsonValue>,
}

#[derive(Debug, Clone)]
pub struct ProviderDBResponse {
    pub id: ProviderId,
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub enabled: bool,
    pub weight: i32,
    pub max_concurrent: i32,
    pub extra_headers: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
