//! `POST /v1/messages`: the Anthropic Messages-compatible reverse proxy.
//!
//! Grounded in `probes/executor.rs`'s "build the request, time the call,
//! never let the network layer panic the caller" idiom for the buffered
//! path; the streaming path's reader-task-plus-bounded-channel shape is
//! grounded in `sync/onwards_config.rs`'s background task/channel pairing.

use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::auth::current_user::ApiKeyUser;
use crate::db::models::request_log::RequestLogCreateDBRequest;
use crate::errors::{Error, Result};
use crate::routing::{Decision, RequestFeatures};
use crate::snapshot::Endpoint;
use crate::AppState;

use super::wire::{Message, MessagesRequest, MessagesResponse};

/// Headers copied verbatim onto the upstream request; everything else is
/// stripped, and `Authorization`/`x-api-key` are always replaced with the
/// provider credential.
const FORWARDED_HEADERS: &[&str] = &["content-type", "accept", "anthropic-version", "anthropic-beta"];

#[instrument(skip(state, headers, body), fields(user_id = %user.user_id))]
pub async fn proxy_messages(State(state): State<AppState>, user: ApiKeyUser, headers: HeaderMap, body: Bytes) -> Result<Response> {
    let started = Instant::now();
    let request_id = Uuid::new_v4();

    let request: MessagesRequest =
        serde_json::from_slice(&body).map_err(|e| Error::InvalidRequest { message: format!("invalid request body: {e}") })?;
    let stream = request.stream.unwrap_or(false);

    let features = request_features(&request);
    let decision = state.router.route(&features).await;

    let snapshot = state.endpoint_store.get_endpoints();
    let endpoint = state
        .selector
        .select(decision.task_type, state.config.load_balance.strategy, &features.last_user_message, &snapshot, &state.health)
        .map_err(|_| Error::NoEndpoint { task_type: decision.task_type.to_string() })?
        .clone();

    state.health.update_connections(&endpoint.name(), 1);

    let upstream_request = build_upstream_request(&request, &endpoint);
    let upstream_body = serde_json::to_vec(&upstream_request).map_err(|e| Error::Internal { message: e.to_string() })?;

    let url = format!("{}/v1/messages", endpoint.base_url.trim_end_matches('/'));
    let mut outbound = state.http.post(&url).timeout(state.config.proxy.upstream_timeout).body(upstream_body);
    for name in FORWARDED_HEADERS {
        if let Some(value) = headers.get(*name) {
            outbound = outbound.header(*name, value.clone());
        }
    }
    if let Some(key) = &endpoint.api_key {
        outbound = outbound.header("x-api-key", key);
    }

    // Every return path below this point is responsible for exactly one
    // matching `update_connections(-1)`.
    if stream {
        proxy_streaming(state, outbound, &endpoint, &decision, user, request_id, started).await
    } else {
        proxy_buffered(state, outbound, &endpoint, &decision, user, request_id, started).await
    }
}

fn request_features(request: &MessagesRequest) -> RequestFeatures {
    let last_user_message = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_routing_text())
        .unwrap_or_default();
    let system_prompt = request.system.as_ref().map(|s| s.as_routing_text());
    let has_tool = request.messages.iter().any(|m: &Message| m.content.has_tool_use());
    let has_image = request.messages.iter().any(|m: &Message| m.content.has_image());
    RequestFeatures { last_user_message, system_prompt, model: request.model.clone(), has_tool, has_image }
}

/// Rewrites `model` to the concrete upstream model name the endpoint
/// represents. The client's alias only ever selects a task type; the
/// endpoint the selector picked is what determines which model the
/// provider actually receives.
fn build_upstream_request(request: &MessagesRequest, endpoint: &Endpoint) -> MessagesRequest {
    let mut upstream = request.clone();
    upstream.model = endpoint.model_name.clone();
    upstream
}

fn compute_cost(endpoint: &Endpoint, input_tokens: u64, output_tokens: u64) -> Decimal {
    (Decimal::from(input_tokens) * endpoint.cost_per_mtoken_in + Decimal::from(output_tokens) * endpoint.cost_per_mtoken_out)
        * endpoint.billing_multiplier
        * Decimal::new(1, 6)
}

/// `X-Proxy-Request-Id/Model/Endpoint/Task-Type`: known the moment an
/// endpoint is selected, so emitted on both the buffered and the first
/// streaming response.
fn identity_headers(request_id: Uuid, endpoint: &Endpoint, decision: &Decision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let encoded_endpoint: String = url::form_urlencoded::byte_serialize(endpoint.name().as_bytes()).collect();
    headers.insert("x-proxy-request-id", HeaderValue::from_str(&request_id.to_string()).unwrap());
    headers.insert("x-proxy-model", HeaderValue::from_str(&endpoint.model_name).unwrap_or(HeaderValue::from_static("")));
    headers.insert("x-proxy-endpoint", HeaderValue::from_str(&encoded_endpoint).unwrap_or(HeaderValue::from_static("")));
    headers.insert("x-proxy-task-type", HeaderValue::from_str(&decision.task_type.to_string()).unwrap());
    headers
}

/// `X-Proxy-Latency-Ms/Cost/Input-Tokens/Output-Tokens`: only known once
/// the call has completed, so only attached to the buffered response.
fn outcome_headers(latency_ms: u64, cost: Decimal, input_tokens: u64, output_tokens: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-proxy-latency-ms", HeaderValue::from_str(&latency_ms.to_string()).unwrap());
    headers.insert("x-proxy-cost", HeaderValue::from_str(&cost.to_string()).unwrap_or(HeaderValue::from_static("0")));
    headers.insert("x-proxy-input-tokens", HeaderValue::from_str(&input_tokens.to_string()).unwrap());
    headers.insert("x-proxy-output-tokens", HeaderValue::from_str(&output_tokens.to_string()).unwrap());
    headers
}

fn log_entry(
    request_id: Uuid,
    user: ApiKeyUser,
    endpoint: &Endpoint,
    decision: &Decision,
    input_tokens: u64,
    output_tokens: u64,
    cost: Decimal,
    latency_ms: u64,
    status_code: u16,
    success: bool,
    stream: bool,
    message_preview: Option<String>,
) -> RequestLogCreateDBRequest {
    RequestLogCreateDBRequest {
        request_id,
        user_id: user.user_id,
        api_key_id: Some(user.api_key_id),
        model_name: endpoint.model_name.clone(),
        endpoint_name: endpoint.name(),
        task_type: decision.task_type,
        input_tokens: input_tokens as i64,
        output_tokens: output_tokens as i64,
        latency_ms: latency_ms as i64,
        cost,
        status_code: status_code as i32,
        success,
        stream,
        message_preview,
        routing_method: decision.source.to_string(),
        routing_reason: Some(decision.reason.clone()),
        matched_rule_id: decision.matched_rule_id,
        matched_rule_name: decision.matched_rule_name.clone(),
        all_matches: serde_json::to_value(&decision.all_matches).unwrap_or(serde_json::json!([])),
        is_inaccurate: false,
        request_body: None,
        response_body: None,
    }
}

async fn proxy_buffered(
    state: AppState,
    outbound: reqwest::RequestBuilder,
    endpoint: &Endpoint,
    decision: &Decision,
    user: ApiKeyUser,
    request_id: Uuid,
    started: Instant,
) -> Result<Response> {
    let response = match outbound.send().await {
        Ok(response) => response,
        Err(e) => {
            state.health.update_connections(&endpoint.name(), -1);
            state.health.update_response_time(&endpoint.name(), started.elapsed().as_millis() as u64, false);
            return Err(Error::UpstreamTransport { message: e.to_string() });
        }
    };
    let status = response.status();

    if !status.is_success() {
        let body = response.bytes().await.unwrap_or_default();
        state.health.update_connections(&endpoint.name(), -1);
        state.health.update_response_time(&endpoint.name(), started.elapsed().as_millis() as u64, false);
        let entry = log_entry(request_id, user, endpoint, decision, 0, 0, Decimal::ZERO, started.elapsed().as_millis() as u64, status.as_u16(), false, false, None);
        state.log_sender.submit(entry);
        return Err(Error::UpstreamStatus { status, body });
    }

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            state.health.update_connections(&endpoint.name(), -1);
            state.health.update_response_time(&endpoint.name(), started.elapsed().as_millis() as u64, false);
            return Err(Error::UpstreamTransport { message: e.to_string() });
        }
    };
    let parsed: MessagesResponse = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            state.health.update_connections(&endpoint.name(), -1);
            state.health.update_response_time(&endpoint.name(), started.elapsed().as_millis() as u64, false);
            return Err(Error::UpstreamTransport { message: format!("malformed upstream response: {e}") });
        }
    };

    let latency_ms = started.elapsed().as_millis() as u64;
    state.health.update_connections(&endpoint.name(), -1);
    state.health.update_response_time(&endpoint.name(), latency_ms, true);

    let cost = compute_cost(endpoint, parsed.usage.input_tokens, parsed.usage.output_tokens);
    let preview: Option<String> = parsed.content.iter().find_map(|block| match block {
        super::wire::ContentBlock::Text { text } => Some(text.chars().take(200).collect()),
        _ => None,
    });

    let entry = log_entry(
        request_id,
        user,
        endpoint,
        decision,
        parsed.usage.input_tokens,
        parsed.usage.output_tokens,
        cost,
        latency_ms,
        status.as_u16(),
        true,
        false,
        preview,
    );
    state.log_sender.submit(entry);

    let input_tokens = parsed.usage.input_tokens;
    let output_tokens = parsed.usage.output_tokens;
    let mut http_response = (StatusCode::OK, axum::response::Json(parsed)).into_response();
    http_response.headers_mut().extend(identity_headers(request_id, endpoint, decision));
    http_response
        .headers_mut()
        .extend(outcome_headers(latency_ms, cost, input_tokens, output_tokens));
    Ok(http_response)
}

#[derive(Default)]
struct StreamMeta {
    output_tokens: u64,
    saw_usage: bool,
    delta_chars: u64,
}

impl StreamMeta {
    /// `message_delta.usage.output_tokens` is authoritative when present;
    /// otherwise fall back to a rough delta-character count rather than
    /// reporting zero tokens for a response that clearly produced output.
    fn resolved_output_tokens(&self) -> u64 {
        if self.saw_usage {
            self.output_tokens
        } else {
            self.delta_chars / 4
        }
    }
}

async fn proxy_streaming(
    state: AppState,
    outbound: reqwest::RequestBuilder,
    endpoint: &Endpoint,
    decision: &Decision,
    user: ApiKeyUser,
    request_id: Uuid,
    started: Instant,
) -> Result<Response> {
    let response = match outbound.send().await {
        Ok(response) => response,
        Err(e) => {
            state.health.update_connections(&endpoint.name(), -1);
            return Err(Error::UpstreamTransport { message: e.to_string() });
        }
    };
    let status = response.status();

    if !status.is_success() {
        let body = response.bytes().await.unwrap_or_default();
        state.health.update_connections(&endpoint.name(), -1);
        let entry = log_entry(request_id, user, endpoint, decision, 0, 0, Decimal::ZERO, started.elapsed().as_millis() as u64, status.as_u16(), false, true, None);
        state.log_sender.submit(entry);
        return Err(Error::UpstreamStatus { status, body });
    }

    let response_headers = identity_headers(request_id, endpoint, decision);
    let (tx, rx) = mpsc::channel::<std::result::Result<Bytes, std::io::Error>>(64);
    let endpoint = endpoint.clone();
    let decision = decision.clone();

    tokio::spawn(async move {
        let mut upstream = response.bytes_stream();
        let mut meta = StreamMeta::default();
        let mut line_buffer = Vec::new();
        let mut ok = true;

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => {
                    break;
                }
                chunk = upstream.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            line_buffer.extend_from_slice(&bytes);
                            consume_sse_lines(&mut line_buffer, &mut meta);
                            if tx.send(Ok(bytes)).await.is_err() {
                                // client disconnected; stop reading upstream promptly
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "upstream stream read failed");
                            ok = false;
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        state.health.update_connections(&endpoint.name(), -1);
        state.health.update_response_time(&endpoint.name(), latency_ms, ok);

        let output_tokens = meta.resolved_output_tokens();
        let cost = compute_cost(&endpoint, 0, output_tokens);
        let entry = log_entry(request_id, user, &endpoint, &decision, 0, output_tokens, cost, latency_ms, status.as_u16(), ok, true, None);
        state.log_sender.submit(entry);
    });

    let body = Body::from_stream(ReceiverStream::new(rx));
    let mut http_response = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive")
        .header("x-accel-buffering", "no")
        .body(body)
        .map_err(|e| Error::Internal { message: e.to_string() })?;
    http_response.headers_mut().extend(response_headers);

    Ok(http_response)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::db::handlers::{Repository, RequestLogs};
    use crate::db::handlers::request_log::RequestLogFilter;
    use crate::test_utils::{create_test_api_key, create_test_endpoint, create_test_routing_rule, create_test_user};
    use crate::types::TaskType;

    /// Polls `request_logs` until the row for `user_id` shows up (the batched
    /// writer flushes on its own schedule) or gives up after ~1s.
    async fn wait_for_log(pool: &sqlx::PgPool, user_id: crate::types::UserId) -> crate::db::models::request_log::RequestLogDBResponse {
        for _ in 0..50 {
            let mut conn = pool.acquire().await.unwrap();
            let logs = RequestLogs::new(&mut conn)
                .list(&RequestLogFilter { user_id: Some(user_id), limit: 1, offset: 0 })
                .await
                .unwrap();
            if let Some(log) = logs.into_iter().next() {
                return log;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("no request log row appeared for user {user_id}");
    }

    #[sqlx::test]
    async fn basic_proxy_routes_by_keyword_and_logs_cost(pool: sqlx::PgPool) {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "hi there"}],
                "model": "claude-3-haiku",
                "usage": {"input_tokens": 3, "output_tokens": 4},
            })))
            .mount(&upstream)
            .await;

        create_test_endpoint(&pool, "anthropic", &upstream.uri(), "claude-3-haiku", "simple").await;
        create_test_routing_rule(&pool, "hello-rule", vec!["hello".to_string()], TaskType::Simple, 10).await;
        let user = create_test_user(&pool, false).await;
        let (_key, secret) = create_test_api_key(&pool, user.id).await;

        let server = crate::test_utils::create_test_app(pool.clone()).await;
        let response = server
            .post("/v1/messages")
            .add_header("x-api-key", &secret)
            .json(&serde_json::json!({
                "model": "claude-3-haiku",
                "max_tokens": 16,
                "messages": [{"role": "user", "content": "hello"}],
            }))
            .await;

        response.assert_status(StatusCode::OK);
        assert_eq!(response.header("x-proxy-task-type"), "simple");

        let log = wait_for_log(&pool, user.id).await;
        assert!(log.success);
        assert_eq!(log.matched_rule_name.as_deref(), Some("hello-rule"));
        assert_eq!(log.input_tokens, 3);
        assert_eq!(log.output_tokens, 4);
        assert!(log.cost > rust_decimal::Decimal::ZERO);
    }

    #[sqlx::test]
    async fn streaming_request_forwards_bytes_and_logs_output_tokens(pool: sqlx::PgPool) {
        let upstream = MockServer::start().await;
        let sse_body = concat!(
            "event: content_block_delta\ndata: {\"delta\":{\"text\":\"hi\"}}\n\n",
            "event: content_block_delta\ndata: {\"delta\":{\"text\":\" there\"}}\n\n",
            "event: content_block_delta\ndata: {\"delta\":{\"text\":\"!\"}}\n\n",
            "event: message_delta\ndata: {\"delta\":{\"usage\":{\"output_tokens\":5}}}\n\n",
            "event: message_stop\ndata: {}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
            .mount(&upstream)
            .await;

        create_test_endpoint(&pool, "anthropic", &upstream.uri(), "claude-3-haiku", "simple").await;
        create_test_routing_rule(&pool, "hello-rule", vec!["hello".to_string()], TaskType::Simple, 10).await;
        let user = create_test_user(&pool, false).await;
        let (_key, secret) = create_test_api_key(&pool, user.id).await;

        let server = crate::test_utils::create_test_app(pool.clone()).await;
        let response = server
            .post("/v1/messages")
            .add_header("x-api-key", &secret)
            .json(&serde_json::json!({
                "model": "claude-3-haiku",
                "max_tokens": 16,
                "messages": [{"role": "user", "content": "hello"}],
                "stream": true,
            }))
            .await;

        response.assert_status(StatusCode::OK);
        assert_eq!(response.header("content-type"), "text/event-stream");
        assert_eq!(response.text(), sse_body);

        let log = wait_for_log(&pool, user.id).await;
        assert!(log.stream);
        assert_eq!(log.output_tokens, 5);
    }
}

/// Parses whatever complete `data: {...}` SSE lines are present in
/// `buffer`, updating `meta` from `message_delta.usage.output_tokens`
/// (authoritative) and leaving any trailing partial line buffered for the
/// next chunk.
fn consume_sse_lines(buffer: &mut Vec<u8>, meta: &mut StreamMeta) {
    loop {
        let Some(newline) = buffer.iter().position(|&b| b == b'\n') else { break };
        let line: Vec<u8> = buffer.drain(..=newline).collect();
        let line = String::from_utf8_lossy(&line);
        let line = line.trim();
        let Some(payload) = line.strip_prefix("data:") else { continue };
        let payload = payload.trim();
        let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else { continue };

        if let Some(output_tokens) = value.pointer("/delta/usage/output_tokens").or_else(|| value.pointer("/usage/output_tokens")) {
            if let Some(tokens) = output_tokens.as_u64() {
                meta.output_tokens = tokens;
                meta.saw_usage = true;
            }
        }
        if let Some(text) = value.pointer("/delta/text").and_then(|t| t.as_str()) {
            meta.delta_chars += text.len() as u64;
        }
    }
}
