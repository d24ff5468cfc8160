//! Repository for the `users` table.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::Repository;
use crate::db::models::user::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest};
use crate::types::{abbrev_uuid, UserId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub admins_only: bool,
}

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: UserId,
    username: String,
    email: String,
    is_admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for UserDBResponse {
    fn from(r: UserRow) -> Self {
        Self { id: r.id, username: r.username, email: r.email, is_admin: r.is_admin, created_at: r.created_at, updated_at: r.updated_at }
    }
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (username, email, is_admin) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&request.username)
        .bind(&request.email)
        .bind(request.is_admin)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(id).fetch_optional(&mut *self.db).await?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = ANY($1)").bind(&ids).fetch_all(&mut *self.db).await?;
        Ok(rows.into_iter().map(|r| (r.id, r.into())).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let rows: Vec<UserRow> = if filter.admins_only {
            sqlx::query_as("SELECT * FROM users WHERE is_admin ORDER BY username").fetch_all(&mut *self.db).await?
        } else {
            sqlx::query_as("SELECT * FROM users ORDER BY username").fetch_all(&mut *self.db).await?
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&mut *self.db).await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let row: Option<UserRow> = sqlx::query_as(
            "UPDATE users SET
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                is_admin = COALESCE($4, is_admin),
                updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&request.username)
        .bind(&request.email)
        .bind(request.is_admin)
        .fetch_optional(&mut *self.db)
        .await?;
        row.map(Into::into).ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    async fn create_and_fetch_roundtrips(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let created = repo
            .create(&UserCreateDBRequest { username: "alice".to_string(), email: "alice@example.com".to_string(), is_admin: true })
            .await
            .unwrap();
        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.username, "alice");
        assert!(fetched.is_admin);
    }

    #[sqlx::test]
    async fn duplicate_email_is_unique_violation(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        repo.create(&UserCreateDBRequest { username: "a".to_string(), email: "dup@example.com".to_string(), is_admin: false })
            .await
            .unwrap();
        let result = repo
            .create(&UserCreateDBRequest { username: "b".to_string(), email: "dup@example.com".to_string(), is_admin: false })
            .await;
        assert!(matches!(result, Err(DbError::UniqueViolation { .. })));
    }
}
