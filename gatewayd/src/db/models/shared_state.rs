use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct SharedStateDBResponse {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}
