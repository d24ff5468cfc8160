use crate::types::{RoutingRuleId, TaskType};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct RoutingRuleCreateDBRequest {
    pub name: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub regex: Option<String>,
    pub condition: Option<String>,
    pub task_type: TaskType,
    pub priority: i32,
    pub is_builtin: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RoutingRuleUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub keywords: Option<Vec<String>>,
    pub regex: Option<Option<String>>,
    pub condition: Option<Option<String>>,
    pub task_type: Option<TaskType>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct RoutingRuleDBResponse {
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
