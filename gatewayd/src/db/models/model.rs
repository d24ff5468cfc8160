use crate::types::ModelId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct ModelCreateDBRequest {
    pub name: String,
    pub role: String,
    pub cost_per_mtoken_in: Decimal,
    pub cost_per_mtoken_out: Decimal,
    pub billing_multiplier: Decimal,
    pub supports_thinking: bool,
    pub enabled: bool,
    pub weight: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ModelUpdateDBRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub cost_per_mtoken_in: Option<Decimal>,
    pub cost_per_mtoken_out: Option<Decimal>,
    pub billing_multiplier: Option<Decimal>,
    pub supports_thinking: Option<bool>,
    pub enabled: Option<bool>,
    pub weight: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ModelDBResponse {
    pub id: ModelId,
    pub name: String,
    pub role: String,
    pub cost_per_mtoken_in: Decimal,
    pub cost_per_mtoken_out: Decimal,
    pub billing_multiplier: Decimal,
    pub supports_thinking: bool,
    pub enabled: bool,
    pub weight: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
