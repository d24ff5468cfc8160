//! Repository for the `request_logs` table.
//!
//! [`RequestLogs::insert_batch`] is the hot path, called by the batched
//! request-log writer: one `UNNEST`-based multi-row insert per flush instead
//! of one round trip per request.

use crate::db::errors::Result;
use crate::db::handlers::repository::Repository;
use crate::db::models::request_log::{RequestLogCreateDBRequest, RequestLogDBResponse};
use crate::types::{abbrev_uuid, ApiKeyId, RequestLogId, RoutingRuleId, TaskType, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct RequestLogFilter {
    pub user_id: Option<UserId>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, FromRow)]
struct RequestLogRow {
    id: RequestLogId,
    request_id: Uuid,
    user_id: UserId,
    api_key_id: Option<ApiKeyId>,
    model_name: String,
    endpoint_name: String,
    task_type: TaskType,
    input_tokens: i64,
    output_tokens: i64,
    latency_ms: i64,
    cost: Decimal,
    status_code: i32,
    success: bool,
    stream: bool,
    message_preview: Option<String>,
    routing_method: String,
    routing_reason: Option<String>,
    matched_rule_id: Option<RoutingRuleId>,
    matched_rule_name: Option<String>,
    all_matches: JsonValue,
    is_inaccurate: bool,
    created_at: DateTime<Utc>,
}

impl From<RequestLogRow> for RequestLogDBResponse {
    fn from(r: RequestLogRow) -> Self {
        Self {
            id: r.id,
            request_id: r.request_id,
            user_id: r.user_id,
            api_key_id: r.api_key_id,
            model_name: r.model_name,
            endpoint_name: r.endpoint_name,
            task_type: r.task_type,
            input_tokens: r.input_tokens,
            output_tokens: r.output_tokens,
            latency_ms: r.latency_ms,
            cost: r.cost,
            status_code: r.status_code,
            success: r.success,
            stream: r.stream,
            message_preview: r.message_preview,
            routing_method: r.routing_method,
            routing_reason: r.routing_reason,
            matched_rule_id: r.matched_rule_id,
            matched_rule_name: r.matched_rule_name,
            all_matches: r.all_matches,
            is_inaccurate: r.is_inaccurate,
            created_at: r.created_at,
        }
    }
}

pub struct RequestLogs<'c> {
    db: &'c mut PgConnection,
}

impl<'c> RequestLogs<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a batch of request log entries in one round trip via `UNNEST`.
    /// Called by the batched writer on each flush; a no-op on an empty batch.
    #[instrument(skip(self, entries), fields(count = entries.len()), err)]
    pub async fn insert_batch(&mut self, entries: &[RequestLogCreateDBRequest]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let request_ids: Vec<Uuid> = entries.iter().map(|e| e.request_id).collect();
        let user_ids: Vec<UserId> = entries.iter().map(|e| e.user_id).collect();
        let api_key_ids: Vec<Option<ApiKeyId>> = entries.iter().map(|e| e.api_key_id).collect();
        let model_names: Vec<String> = entries.iter().map(|e| e.model_name.clone()).collect();
        let endpoint_names: Vec<String> = entries.iter().map(|e| e.endpoint_name.clone()).collect();
        let task_types: Vec<TaskType> = entries.iter().map(|e| e.task_type).collect();
        let input_tokens: Vec<i64> = entries.iter().map(|e| e.input_tokens).collect();
        let output_tokens: Vec<i64> = entries.iter().map(|e| e.output_tokens).collect();
        let latency_ms: Vec<i64> = entries.iter().map(|e| e.latency_ms).collect();
        let cost: Vec<Decimal> = entries.iter().map(|e| e.cost).collect();
        let status_codes: Vec<i32> = entries.iter().map(|e| e.status_code).collect();
        let success: Vec<bool> = entries.iter().map(|e| e.success).collect();
        let stream: Vec<bool> = entries.iter().map(|e| e.stream).collect();
        let message_previews: Vec<Option<String>> = entries.iter().map(|e| e.message_preview.clone()).collect();
        let routing_methods: Vec<String> = entries.iter().map(|e| e.routing_method.clone()).collect();
        let routing_reasons: Vec<Option<String>> = entries.iter().map(|e| e.routing_reason.clone()).collect();
        let matched_rule_ids: Vec<Option<RoutingRuleId>> = entries.iter().map(|e| e.matched_rule_id).collect();
        let matched_rule_names: Vec<Option<String>> = entries.iter().map(|e| e.matched_rule_name.clone()).collect();
        let all_matches: Vec<JsonValue> = entries.iter().map(|e| e.all_matches.clone()).collect();
        let is_inaccurate: Vec<bool> = entries.iter().map(|e| e.is_inaccurate).collect();
        let request_bodies: Vec<Option<JsonValue>> = entries.iter().map(|e| e.request_body.clone()).collect();
        let response_bodies: Vec<Option<JsonValue>> = entries.iter().map(|e| e.response_body.clone()).collect();

        let result = sqlx::query(
            "INSERT INTO request_logs (
                request_id, user_id, api_key_id, model_name, endpoint_name, task_type,
                input_tokens, output_tokens, latency_ms, cost, status_code, success, stream,
                message_preview, routing_method, routing_reason, matched_rule_id, matched_rule_name,
                all_matches, is_inaccurate, request_body, response_body
             )
             SELECT * FROM UNNEST(
                $1::uuid[], $2::uuid[], $3::uuid[], $4::text[], $5::text[], $6::text[],
                $7::bigint[], $8::bigint[], $9::bigint[], $10::numeric[], $11::int[], $12::bool[], $13::bool[],
                $14::text[], $15::text[], $16::text[], $17::bigint[], $18::text[],
                $19::jsonb[], $20::bool[], $21::jsonb[], $22::jsonb[]
             )",
        )
        .bind(&request_ids)
        .bind(&user_ids)
        .bind(&api_key_ids)
        .bind(&model_names)
        .bind(&endpoint_names)
        .bind(&task_types)
        .bind(&input_tokens)
        .bind(&output_tokens)
        .bind(&latency_ms)
        .bind(&cost)
        .bind(&status_codes)
        .bind(&success)
        .bind(&stream)
        .bind(&message_previews)
        .bind(&routing_methods)
        .bind(&routing_reasons)
        .bind(&matched_rule_ids)
        .bind(&matched_rule_names)
        .bind(&all_matches)
        .bind(&is_inaccurate)
        .bind(&request_bodies)
        .bind(&response_bodies)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for RequestLogs<'c> {
    type CreateRequest = RequestLogCreateDBRequest;
    type UpdateRequest = ();
    type Response = RequestLogDBResponse;
    type Id = RequestLogId;
    type Filter = RequestLogFilter;

    #[instrument(skip(self, request), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        self.insert_batch(std::slice::from_ref(request)).await?;
        let row: RequestLogRow = sqlx::query_as("SELECT * FROM request_logs WHERE request_id = $1 ORDER BY created_at DESC LIMIT 1")
            .bind(request.request_id)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(request_log_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row: Option<RequestLogRow> =
            sqlx::query_as("SELECT * FROM request_logs WHERE id = $1").bind(id).fetch_optional(&mut *self.db).await?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<RequestLogRow> =
            sqlx::query_as("SELECT * FROM request_logs WHERE id = ANY($1)").bind(&ids).fetch_all(&mut *self.db).await?;
        Ok(rows.into_iter().map(|r| (r.id, r.into())).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let limit = if filter.limit > 0 { filter.limit } else { 100 };
        let rows: Vec<RequestLogRow> = sqlx::query_as(
            "SELECT * FROM request_logs
             WHERE ($1::uuid IS NULL OR user_id = $1)
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(filter.user_id)
        .bind(limit)
        .bind(filter.offset)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(request_log_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM request_logs WHERE id = $1").bind(id).execute(&mut *self.db).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Request log rows are append-only; nothing is ever mutated post-write.
    async fn update(&mut self, id: Self::Id, _request: &Self::UpdateRequest) -> Result<Self::Response> {
        self.get_by_id(id).await?.ok_or(crate::db::errors::DbError::ProtectedEntity {
            entity_type: "request_log".to_string(),
            reason: "request logs are append-only".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::Users;
    use crate::db::models::user::UserCreateDBRequest;

    fn sample_entry(user_id: UserId, request_id: Uuid) -> RequestLogCreateDBRequest {
        RequestLogCreateDBRequest {
            request_id,
            user_id,
            api_key_id: None,
            model_name: "claude-sonnet".to_string(),
            endpoint_name: "anthropic-1".to_string(),
            task_type: TaskType::Default,
            input_tokens: 100,
            output_tokens: 50,
            latency_ms: 230,
            cost: Decimal::new(15, 3),
            status_code: 200,
            success: true,
            stream: false,
            message_preview: Some("hello".to_string()),
            routing_method: "rule".to_string(),
            routing_reason: Some("keyword match".to_string()),
            matched_rule_id: None,
            matched_rule_name: None,
            all_matches: serde_json::json!([]),
            is_inaccurate: false,
            request_body: None,
            response_body: None,
        }
    }

    #[sqlx::test]
    async fn insert_batch_writes_all_rows(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = Users::new(&mut conn)
            .create(&UserCreateDBRequest { username: "a".to_string(), email: "a@example.com".to_string(), is_admin: false })
            .await
            .unwrap()
            .id;

        let entries = vec![sample_entry(user_id, Uuid::new_v4()), sample_entry(user_id, Uuid::new_v4())];
        let mut repo = RequestLogs::new(&mut conn);
        let inserted = repo.insert_batch(&entries).await.unwrap();
        assert_eq!(inserted, 2);

        let logs = repo.list(&RequestLogFilter { user_id: Some(user_id), limit: 10, offset: 0 }).await.unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[sqlx::test]
    async fn insert_batch_of_empty_slice_is_noop(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = RequestLogs::new(&mut conn);
        let inserted = repo.insert_batch(&[]).await.unwrap();
        assert_eq!(inserted, 0);
    }
}
