use crate::types::{ModelId, ProviderId, ProviderModelId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ProviderModelCreateDBRequest {
    pub provider_id: ProviderId,
    pub model_id: ModelId,
}

#[derive(Debug, Clone)]
pub struct ProviderModelDBResponse {
    pub id: ProviderModelId,
    pub provider_id: ProviderId,
    pub model_id: ModelId,
    pub created_at: DateTime<Utc>,
}

/// A provider/model pairing joined with the attributes needed to route and
/// health-check it, i.e. an endpoint as the routing and health layers see it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EndpointRow {
    pub id: ProviderModelId,
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub provider_enabled: bool,
    pub provider_weight: i32,
    pub max_concurrent: i32,
    pub extra_headers: serde_json::Value,
    pub model_id: ModelId,
    pub model_name: String,
    pub role: String,
    pub cost_per_mtoken_in: rust_decimal::Decimal,
    pub cost_per_mtoken_out: rust_decimal::Decimal,
    pub billing_multiplier: rust_decimal::Decimal,
    pub supports_thinking: bool,
    pub model_enabled: bool,
    pub model_weight: i32,
}
