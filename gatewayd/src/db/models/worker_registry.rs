use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct WorkerRegistryDBResponse {
    pub worker_id: String,
    pub pid: i32,
    pub is_primary: bool,
    pub last_heartbeat: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
