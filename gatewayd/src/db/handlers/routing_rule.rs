//! Repository for the `routing_rules` table.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::Repository;
use crate::db::models::routing_rule::{RoutingRuleCreateDBRequest, RoutingRuleDBResponse, RoutingRuleUpdateDBRequest};
use crate::types::{RoutingRuleId, TaskType};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct RoutingRuleFilter {
    pub enabled_only: bool,
}

#[derive(Debug, Clone, FromRow)]
struct RoutingRuleRow {
    id: RoutingRuleId,
    name: String,
    description: Option<String>,
    keywords: Vec<String>,
    regex: Option<String>,
    condition: Option<String>,
    task_type: TaskType,
    priority: i32,
    is_builtin: bool,
    enabled: bool,
    hit_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RoutingRuleRow> for RoutingRuleDBResponse {
    fn from(r: RoutingRuleRow) -> Self {
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

pub struct RoutingRules<'c> {
    db: &'c mut PgConnection,
}

impl<'c> RoutingRules<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// All enabled rules, ordered the way the classifier evaluates them:
    /// highest priority first, ties broken by insertion order.
    #[instrument(skip(self), err)]
    pub async fn list_enabled_ordered(&mut self) -> Result<Vec<RoutingRuleDBResponse>> {
        let rows: Vec<RoutingRuleRow> = sqlx::query_as(
            "SELECT * FROM routing_rules WHERE enabled ORDER BY priority DESC, id",
        )
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(rule_id = id), err)]
    pub async fn record_hit(&mut self, id: RoutingRuleId) -> Result<()> {
        sqlx::query("UPDATE routing_rules SET hit_count = hit_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for RoutingRules<'c> {
    type CreateRequest = RoutingRuleCreateDBRequest;
    type UpdateRequest = RoutingRuleUpdateDBRequest;
    type Response = RoutingRuleDBResponse;
    type Id = RoutingRuleId;
    type Filter = RoutingRuleFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let row: RoutingRuleRow = sqlx::query_as(
            "INSERT INTO routing_rules (name, description, keywords, regex, condition, task_type, priority, is_builtin, enabled)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING *",
        )
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.keywords)
        .bind(&request.regex)
        .bind(&request.condition)
        .bind(request.task_type)
        .bind(request.priority)
        .bind(request.is_builtin)
        .bind(request.enabled)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(rule_id = id), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row: Option<RoutingRuleRow> =
            sqlx::query_as("SELECT * FROM routing_rules WHERE id = $1").bind(id).fetch_optional(&mut *self.db).await?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<RoutingRuleRow> =
            sqlx::query_as("SELECT * FROM routing_rules WHERE id = ANY($1)").bind(&ids).fetch_all(&mut *self.db).await?;
        Ok(rows.into_iter().map(|r| (r.id, r.into())).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let rows: Vec<RoutingRuleRow> = if filter.enabled_only {
            sqlx::query_as("SELECT * FROM routing_rules WHERE enabled ORDER BY priority DESC, id")
                .fetch_all(&mut *self.db)
                .await?
        } else {
            sqlx::query_as("SELECT * FROM routing_rules ORDER BY priority DESC, id")
                .fetch_all(&mut *self.db)
                .await?
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(rule_id = id), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let is_builtin: Option<bool> = sqlx::query_scalar("SELECT is_builtin FROM routing_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        match is_builtin {
            None => Ok(false),
            Some(true) => Err(DbError::ProtectedEntity {
                entity_type: "routing_rule".to_string(),
                reason: "builtin rules cannot be deleted".to_string(),
            }),
            Some(false) => {
                let result = sqlx::query("DELETE FROM routing_rules WHERE id = $1").bind(id).execute(&mut *self.db).await?;
                Ok(result.rows_affected() > 0)
            }
        }
    }

    #[instrument(skip(self, request), fields(rule_id = id), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let row: Option<RoutingRuleRow> = sqlx::query_as(
            "UPDATE routing_rules SET
                name = COALESCE($2, name),
                description = CASE WHEN $3 THEN $4 ELSE description END,
                keywords = COALESCE($5, keywords),
                regex = CASE WHEN $6 THEN $7 ELSE regex END,
                condition = CASE WHEN $8 THEN $9 ELSE condition END,
                task_type = COALESCE($10, task_type),
                priority = COALESCE($11, priority),
                enabled = COALESCE($12, enabled),
                updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&request.name)
        .bind(request.description.is_some())
        .bind(request.description.clone().flatten())
        .bind(&request.keywords)
        .bind(request.regex.is_some())
        .bind(request.regex.clone().flatten())
        .bind(request.condition.is_some())
        .bind(request.condition.clone().flatten())
        .bind(request.task_type)
        .bind(request.priority)
        .bind(request.enabled)
        .fetch_optional(&mut *self.db)
        .await?;
        row.map(Into::into).ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_req(name: &str) -> RoutingRuleCreateDBRequest {
        RoutingRuleCreateDBRequest {
            name: name.to_string(),
            description: None,
            keywords: vec!["code".to_string()],
            regex: None,
            condition: None,
            task_type: TaskType::Complex,
            priority: 10,
            is_builtin: false,
            enabled: true,
        }
    }

    #[sqlx::test]
    async fn create_and_list_ordered_by_priority(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = RoutingRules::new(&mut conn);
        let mut low = create_req("low");
        low.priority = 1;
        repo.create(&low).await.unwrap();
        let mut high = create_req("high");
        high.priority = 100;
        repo.create(&high).await.unwrap();

        let rules = repo.list_enabled_ordered().await.unwrap();
        assert_eq!(rules[0].name, "high");
        assert_eq!(rules[1].name, "low");
    }

    #[sqlx::test]
    async fn builtin_rule_cannot_be_deleted(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = RoutingRules::new(&mut conn);
        let mut builtin = create_req("builtin-default");
        builtin.is_builtin = true;
        let created = repo.create(&builtin).await.unwrap();

        let result = repo.delete(created.id).await;
        assert!(matches!(result, Err(DbError::ProtectedEntity { .. })));
    }

    #[sqlx::test]
    async fn record_hit_increments_counter(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = RoutingRules::new(&mut conn);
        let created = repo.create(&create_req("hit-me")).await.unwrap();
        repo.record_hit(created.id).await.unwrap();
        repo.record_hit(created.id).await.unwrap();

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.hit_count, 2);
    }
}
