use crate::types::{ApiKeyId, UserId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ApiKeyCreateDBRequest {
    pub user_id: UserId,
    pub name: Option<String>,
    pub secret_hash: String,
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeyUpdateDBRequest {
    pub name: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub revoked_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone)]
pub struct ApiKeyDBResponse {
    pub id: ApiKeyId,
    pub user_id: UserId,
    pub name: Option<String>,
    pub secret_hash: String,
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyDBResponse {
    /// Usable for authentication: enabled, not revoked, and not past its
    /// expiry (if it has one).
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.revoked_at.is_none() && self.expires_at.map(|exp| now < exp).unwrap_or(true)
    }
}
