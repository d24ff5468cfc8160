//! Request/response shapes for `/admin/api/v1/models`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::model::{ModelCreateDBRequest, ModelDBResponse, ModelUpdateDBRequest};
use crate::types::ModelId;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModelCreate {
    pub name: String,
    pub role: String,
    #[serde(default)]
    #[schema(value_type = String)]
    pub cost_per_mtoken_in: Decimal,
    #[serde(default)]
    #[schema(value_type = String)]
    pub cost_per_mtoken_out: Decimal,
    #[serde(default = "default_multiplier")]
    #[schema(value_type = String)]
    pub billing_multiplier: Decimal,
    #[serde(default)]
    pub supports_thinking: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_weight")]
    pub weight: i32,
}

fn default_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_true() -> bool {
    true
}

fn default_weight() -> i32 {
    1
}

impl From<ModelCreate> for ModelCreateDBRequest {
    fn from(c: ModelCreate) -> Self {
        Self {
            name: c.name,
            role: c.role,
            cost_per_mtoken_in: c.cost_per_mtoken_in,
            cost_per_mtoken_out: c.cost_per_mtoken_out,
            billing_multiplier: c.billing_multiplier,
            supports_thinking: c.supports_thinking,
            enabled: c.enabled,
            weight: c.weight,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ModelUpdate {
    pub name: Option<String>,
    pub role: Option<String>,
    #[schema(value_type = Option<String>)]
    pub cost_per_mtoken_in: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub cost_per_mtoken_out: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub billing_multiplier: Option<Decimal>,
    pub supports_thinking: Option<bool>,
    pub enabled: Option<bool>,
    pub weight: Option<i32>,
}

impl From<ModelUpdate> for ModelUpdateDBRequest {
    fn from(u: ModelUpdate) -> Self {
        Self {
            name: u.name,
            role: u.role,
            cost_per_mtoken_in: u.cost_per_mtoken_in,
            cost_per_mtoken_out: u.cost_per_mtoken_out,
            billing_multiplier: u.billing_multiplier,
            supports_thinking: u.supports_thinking,
            enabled: u.enabled,
            weight: u.weight,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModelResponse {
    #[schema(value_type = String)]
    pub id: ModelId,
    pub name: String,
    pub role: String,
    #[schema(value_type = String)]
    pub cost_per_mtoken_in: Decimal,
    #[schema(value_type = String)]
    pub cost_per_mtoken_out: Decimal,
    #[schema(value_type = String)]
    pub billing_multiplier: Decimal,
    pub supports_thinking: bool,
    pub enabled: bool,
    pub weight: i32,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl From<ModelDBResponse> for ModelResponse {
    fn from(r: ModelDBResponse) -> Self {
        Self {
            id: r.id,
            name: r.name,
            role: r.role,
            cost_per_mtoken_in: r.cost_per_mtoken_in,
            cost_per_mtoken_out: r.cost_per_mtoken_out,
            billing_multiplier: r.billing_multiplier,
            supports_thinking: r.supports_thinking,
            enabled: r.enabled,
            weight: r.weight,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
