//! Request/response shapes for `/admin/api/v1/routing-rules`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::routing_rule::{RoutingRuleCreateDBRequest, RoutingRuleDBResponse, RoutingRuleUpdateDBRequest};
use crate::types::{RoutingRuleId, TaskType};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoutingRuleCreate {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub regex: Option<String>,
    pub condition: Option<String>,
    pub task_type: TaskType,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl From<RoutingRuleCreate> for RoutingRuleCreateDBRequest {
    fn from(c: RoutingRuleCreate) -> Self {
        Self {
            name: c.name,
            description: c.description,
            keywords: c.keywords,
            regex: c.regex,
            condition: c.condition,
            task_type: c.task_type,
            priority: c.priority,
            is_builtin: false,
            enabled: c.enabled,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RoutingRuleUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub keywords: Option<Vec<String>>,
    pub regex: Option<Option<String>>,
    pub condition: Option<Option<String>>,
    pub task_type: Option<TaskType>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

impl From<RoutingRuleUpdate> for RoutingRuleUpdateDBRequest {
    fn from(u: RoutingRuleUpdate) -> Self {
        Self {
            name: u.name,
            description: u.description,
            keywords: u.keywords,
            regex: u.regex,
            condition: u.condition,
            task_type: u.task_type,
            priority: u.priority,
            enabled: u.enabled,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoutingRuleResponse {
    pub id: RoutingRuleId,
    pub name: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub regex: Option<String>,
    pub condition: Option<String>,
    pub task_type: TaskType,
    pub priority: i32,
    pub is_builtin: bool,
    pub enabled: bool,
    pub hit_count: i64,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl From<RoutingRuleDBResponse> for RoutingRuleResponse {
    fn from(r: RoutingRuleDBResponse) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            keywords: r.keywords,
            regex: r.regex,
            condition: r.condition,
            task_type: r.task_type,
            priority: r.priority,
            is_builtin: r.is_builtin,
            enabled: r.enabled,
            hit_count: r.hit_count,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
