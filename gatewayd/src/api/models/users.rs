//! Request/response shapes for `/admin/api/v1/users`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::user::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest};
use crate::types::UserId;

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserCreate {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl From<UserCreate> for UserCreateDBRequest {
    fn from(c: UserCreate) -> Self {
        Self {
            username: c.username,
            email: c.email,
            is_admin: c.is_admin,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_admin: Option<bool>,
}

impl From<UserUpdate> for UserUpdateDBRequest {
    fn from(u: UserUpdate) -> Self {
        Self {
            username: u.username,
            email: u.email,
            is_admin: u.is_admin,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String)]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(r: UserDBResponse) -> Self {
        Self {
            id: r.id,
            username: r.username,
            email: r.email,
            is_admin: r.is_admin,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
