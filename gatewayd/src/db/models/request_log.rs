use crate::types::{ApiKeyId, RequestLogId, RoutingRuleId, TaskType, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// One completed (or failed) proxy request, ready for batch insertion.
#[derive(Debug, Clone)]
pub struct RequestLogCreateDBRequest {
    pub request_id: Uuid,
    pub user_id: UserId,
    pub api_key_id: Option<ApiKeyId>,
    pub model_name: String,
    pub endpoint_name: String,
    pub task_type: TaskType,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub latency_ms: i64,
    pub cost: Decimal,
    pub status_code: i32,
    pub success: bool,
    pub stream: bool,
    pub message_preview: Option<String>,
    pub routing_method: String,
    pub routing_reason: Option<String>,
    pub matched_rule_id: Option<RoutingRuleId>,
    pub matched_rule_name: Option<String>,
    pub all_matches: JsonValue,
    pub is_inaccurate: bool,
    pub request_body: Option<JsonValue>,
    pub response_body: Option<JsonValue>,
}

#[derive(Debug, Clone)]
pub struct RequestLogDBResponse {
    pub id: RequestLogId,
    pub request_id: Uuid,
    pub user_id: UserId,
    pub api_key_id: Option<ApiKeyId>,
    pub model_name: String,
    pub endpoint_name: String,
    pub task_type: TaskType,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub latency_ms: i64,
    pub cost: Decimal,
    pub status_code: i32,
    pub success: bool,
    pub stream: bool,
    pub message_preview: Option<String>,
    pub routing_method: String,
    pub routing_reason: Option<String>,
    pub matched_rule_id: Option<RoutingRuleId>,
    pub matched_rule_name: Option<String>,
    pub all_matches: JsonValue,
    pub is_inaccurate: bool,
    pub created_at: DateTime<Utc>,
}
