//! Common type definitions shared across the crate.
//!
//! - Type aliases for entity ids.
//! - [`TaskType`]: the routing codomain (model role / routing decision target).
//! - [`LoadBalanceStrategy`]: the endpoint-selector strategy enum.
//! - [`abbrev_uuid`]: shortens a UUID for log lines.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

pub type UserId = Uuid;
pub type ApiKeyId = Uuid;
pub type ProviderId = Uuid;
pub type ModelId = Uuid;
pub type ProviderModelId = Uuid;
pub type RoutingRuleId = i64;
pub type RoutingCacheId = Uuid;
pub type RequestLogId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs.
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// The coarse class a request is routed to; the codomain of routing decisions
/// and the domain of model roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Simple,
    Default,
    Complex,
    Background,
    Think,
    WebSearch,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::Simple => "simple",
            TaskType::Default => "default",
            TaskType::Complex => "complex",
            TaskType::Background => "background",
            TaskType::Think => "think",
            TaskType::WebSearch => "web_search",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(TaskType::Simple),
            "default" => Ok(TaskType::Default),
            "complex" => Ok(TaskType::Complex),
            "background" => Ok(TaskType::Background),
            "think" => Ok(TaskType::Think),
            "web_search" => Ok(TaskType::WebSearch),
            other => Err(anyhow::anyhow!("unknown task type: {other}")),
        }
    }
}

/// Endpoint-selector load-balance strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    RoundRobin,
    Weighted,
    LeastConnections,
    ConversationHash,
}

impl Default for LoadBalanceStrategy {
    fn default() -> Self {
        LoadBalanceStrategy::RoundRobin
    }
}

impl std::str::FromStr for LoadBalanceStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" => Ok(LoadBalanceStrategy::RoundRobin),
            "weighted" => Ok(LoadBalanceStrategy::Weighted),
            "least_connections" => Ok(LoadBalanceStrategy::LeastConnections),
            "conversation_hash" => Ok(LoadBalanceStrategy::ConversationHash),
            other => Err(anyhow::anyhow!("unknown load balance strategy: {other}")),
        }
    }
}

/// Where a routing decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Rule,
    L1,
    L2,
    L3,
    Llm,
    Default,
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionSource::Rule => "rule",
            DecisionSource::L1 => "l1",
            DecisionSource::L2 => "l2",
            DecisionSource::L3 => "l3",
            DecisionSource::Llm => "llm",
            DecisionSource::Default => "default",
        };
        write!(f, "{s}")
    }
}

/// The fallback strategy applied when no routing rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFallbackStrategy {
    FixedTaskType,
    FallbackModel,
    DefaultRole,
    Llm,
}

/// Per-endpoint health status (unknown -> healthy -> degraded -> unhealthy -> healthy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        write!(f, "{s}")
    }
}
