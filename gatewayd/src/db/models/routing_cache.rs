use crate::types::{RoutingCacheId, TaskType};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct RoutingCacheCreateDBRequest {
    pub content_hash: String,
    pub content_preview: String,
    pub embedding: Option<Vec<f64>>,
    pub task_type: TaskType,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct RoutingCacheDBResponse {
    pub id: RoutingCacheId,
    pub content_hash: String,
    pub content_preview: String,
    pub embedding: Option<Vec<f64>>,
    pub task_type: TaskType,
    pub reason: String,
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_hit_at: DateTime<Utc>,
}
