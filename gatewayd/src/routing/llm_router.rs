//! LLM router: the full decision pipeline - L1 -> L2 -> rules -> L3 ->
//! LLM fallback - with single-flight coalescing of concurrent LLM
//! classification calls sharing a fingerprint.
//!
//! Single-flight coordination uses a `dashmap` map from fingerprint to an
//! in-flight notify, generalised from a per-model capacity-limit map to
//! "in-flight classification per fingerprint."

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sqlx::{PgConnection, PgPool};
use tokio::sync::Notify;
use tracing::{instrument, warn};

use crate::config::{RoutingConfig, RoutingLlmConfig};
use crate::db::handlers::routing_rule::RoutingRules;
use crate::routing::cache::l1::L1Cache;
use crate::routing::cache::{l2, l3};
use crate::routing::classifier;
use crate::routing::embedding::EmbeddingBackend;
use crate::routing::{content_hash, fingerprint, Decision, RequestFeatures};
use crate::snapshot::EndpointStore;
use crate::types::{DecisionSource, RuleFallbackStrategy, TaskType};

pub struct LlmRouter {
    config: RoutingConfig,
    llm_config: RoutingLlmConfig,
    default_role: TaskType,
    l1: L1Cache,
    pool: PgPool,
    embedding: Arc<dyn EmbeddingBackend>,
    endpoints: Arc<EndpointStore>,
    http: reqwest::Client,
    inflight: DashMap<String, Arc<Notify>>,
}

impl LlmRouter {
    pub fn new(
        config: RoutingConfig,
        llm_config: RoutingLlmConfig,
        pool: PgPool,
        embedding: Arc<dyn EmbeddingBackend>,
        endpoints: Arc<EndpointStore>,
    ) -> Self {
        let default_role = config.default_role.parse().unwrap_or(TaskType::Default);
        let l1 = L1Cache::new(config.l1_capacity, config.l1_ttl);
        Self {
            config,
            llm_config,
            default_role,
            l1,
            pool,
            embedding,
            endpoints,
            http: reqwest::Client::new(),
            inflight: DashMap::new(),
        }
    }

    #[instrument(skip(self, features), fields(model = %features.model))]
    pub async fn route(&self, features: &RequestFeatures) -> Decision {
        let fp = fingerprint(features);
        let ch = content_hash(&fp);

        if let Some(decision) = self.l1.get(&fp) {
            return Decision { from_cache: true, source: DecisionSource::L1, ..decision };
        }

        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("routing pool acquire failed, falling back to default: {e}");
                return Decision::default_role(self.default_role, "db_unavailable");
            }
        };

        let l2_ttl = chrono::Duration::from_std(self.config.l2_ttl).unwrap_or(chrono::Duration::zero());
        match l2::lookup(&mut conn, &ch, l2_ttl).await {
            Ok(Some(decision)) => {
                self.l1.put(fp.clone(), decision.clone());
                return decision;
            }
            Ok(None) => {}
            Err(e) => warn!("L2 lookup failed: {e}"),
        }

        if self.config.rule_based_routing_enabled {
            if let Some(decision) = self.run_rules(&mut conn, &fp, &ch, features).await {
                return decision;
            }
        }

        if self.config.semantic_cache_enabled {
            if let Some(decision) = self.run_semantic_cache(&mut conn, &fp, &ch, features).await {
                return decision;
            }
        }

        self.llm_fallback(&mut conn, &fp, &ch, features).await
    }

    /// Runs the rule-based classifier and, on no match, applies
    /// `rule_fallback_strategy`. Returns `Some(decision)` for every strategy
    /// except `llm`, which falls through to the caller's semantic-cache/LLM
    /// stages.
    async fn run_rules(&self, conn: &mut PgConnection, fp: &str, ch: &str, features: &RequestFeatures) -> Option<Decision> {
        let result = match classifier::classify(conn, features).await {
            Ok(r) => r,
            Err(e) => {
                warn!("rule classification failed: {e}");
                return None;
            }
        };

        if let Some(rule) = &result.matched {
            let decision = classifier::matched_rule_to_decision(&result, self.default_role);
            if let Err(e) = RoutingRules::new(conn).record_hit(rule.id).await {
                warn!("failed to record rule hit: {e}");
            }
            self.populate_l1_l2(conn, fp, ch, &decision, None).await;
            return Some(decision);
        }

        match self.rule_fallback_strategy() {
            RuleFallbackStrategy::Llm => None,
            RuleFallbackStrategy::FixedTaskType => {
                let task_type = self.config.fixed_task_type.as_deref().and_then(|s| s.parse().ok()).unwrap_or(self.default_role);
                let decision = Decision::default_role(task_type, "rule_fallback:fixed_task_type");
                self.populate_l1_l2(conn, fp, ch, &decision, None).await;
                Some(decision)
            }
            RuleFallbackStrategy::FallbackModel => {
                let model_used = self
                    .llm_config
                    .fallback_model_id
                    .and_then(|id| self.endpoints.get_endpoints().endpoints.iter().find(|e| e.model_id == id).map(|e| e.model_name.clone()));
                let decision = Decision {
                    model_used,
                    ..Decision::default_role(self.default_role, "rule_fallback:fallback_model")
                };
                self.populate_l1_l2(conn, fp, ch, &decision, None).await;
                Some(decision)
            }
            RuleFallbackStrategy::DefaultRole => {
                let decision = Decision::default_role(self.default_role, "rule_fallback:default_role");
                self.populate_l1_l2(conn, fp, ch, &decision, None).await;
                Some(decision)
            }
        }
    }

    fn rule_fallback_strategy(&self) -> RuleFallbackStrategy {
        match self.config.rule_fallback_strategy.as_str() {
            "fixed_task_type" => RuleFallbackStrategy::FixedTaskType,
            "fallback_model" => RuleFallbackStrategy::FallbackModel,
            "default_role" => RuleFallbackStrategy::DefaultRole,
            _ => RuleFallbackStrategy::Llm,
        }
    }

    async fn run_semantic_cache(&self, conn: &mut PgConnection, fp: &str, ch: &str, features: &RequestFeatures) -> Option<Decision> {
        let text = format!("{}\n{}", features.system_prompt.as_deref().unwrap_or_default(), features.last_user_message);
        let embedding = match self.embedding.embed(&text).await {
            Ok(e) => e,
            Err(e) => {
                warn!("embedding computation failed: {e}");
                return None;
            }
        };

        match l3::semantic_lookup(conn, &embedding, self.config.l3_ttl, self.config.l3_similarity_threshold).await {
            Ok(Some((row, _similarity))) => {
                let decision = l3::to_decision(&row, "");
                self.populate_l1_l2(conn, fp, ch, &decision, Some(embedding)).await;
                Some(decision)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("L3 semantic lookup failed: {e}");
                None
            }
        }
    }

    async fn populate_l1_l2(&self, conn: &mut PgConnection, fp: &str, ch: &str, decision: &Decision, embedding: Option<Vec<f64>>) {
        self.l1.put(fp.to_string(), decision.clone());
        if let Err(e) = l2::insert(conn, ch.to_string(), preview(fp), embedding, decision).await {
            warn!("failed to populate L2 cache: {e}");
        }
    }

    /// Single-flight LLM classification: the first caller for a fingerprint
    /// performs the call and notifies waiters; everyone else waits, bounded
    /// by `timeout_seconds`, then independently falls back to default.
    async fn llm_fallback(&self, conn: &mut PgConnection, fp: &str, ch: &str, features: &RequestFeatures) -> Decision {
        if let Some(notify) = self.inflight.get(fp).map(|n| n.clone()) {
            let bound = Duration::from_secs(self.llm_config.timeout_seconds);
            if tokio::time::timeout(bound, notify.notified()).await.is_ok() {
                if let Some(decision) = self.l1.get(fp) {
                    return decision;
                }
            }
            return Decision::default_role(self.default_role, "llm_single_flight_timeout");
        }

        let notify = Arc::new(Notify::new());
        self.inflight.insert(fp.to_string(), notify.clone());
        let decision = self.call_llm_with_retry(features).await;
        self.inflight.remove(fp);
        notify.notify_waiters();

        if decision.source != DecisionSource::Default {
            self.populate_l1_l2(conn, fp, ch, &decision, None).await;
        } else {
            // Even a terminal failure is worth a short L1 entry so a burst of
            // identical requests doesn't each pay the full retry budget.
            self.l1.put(fp.to_string(), decision.clone());
        }
        decision
    }

    async fn call_llm_with_retry(&self, features: &RequestFeatures) -> Decision {
        if let Some(primary) = self.llm_config.primary_model_id {
            for attempt in 0..=self.llm_config.retry_count {
                match self.call_llm(primary, features).await {
                    Ok(decision) => return decision,
                    Err(e) => warn!(attempt, "primary classifier call failed: {e}"),
                }
            }
        }

        if let Some(fallback) = self.llm_config.fallback_model_id {
            match self.call_llm(fallback, features).await {
                Ok(decision) => return decision,
                Err(e) => warn!("fallback classifier call failed: {e}"),
            }
        }

        Decision::default_role(self.default_role, "llm_error")
    }

    async fn call_llm(&self, model_id: crate::types::ModelId, features: &RequestFeatures) -> anyhow::Result<Decision> {
        let snapshot = self.endpoints.get_endpoints();
        let endpoint = snapshot.endpoints.iter().find(|e| e.model_id == model_id).ok_or_else(|| anyhow::anyhow!("classifier model not found in snapshot"))?;

        let body = serde_json::json!({
            "model": endpoint.model_name,
            "max_tokens": 200,
            "system": CLASSIFIER_SYSTEM_PROMPT,
            "messages": [{"role": "user", "content": features.last_user_message}],
        });

        let mut request = self.http.post(format!("{}/v1/messages", endpoint.base_url)).json(&body).timeout(Duration::from_secs(self.llm_config.timeout_seconds));
        if let Some(key) = &endpoint.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("classifier endpoint returned {}", response.status());
        }

        let parsed: serde_json::Value = response.json().await?;
        let text = parsed
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|blocks| blocks.iter().find_map(|b| b.get("text").and_then(|t| t.as_str())))
            .ok_or_else(|| anyhow::anyhow!("classifier response had no text content block"))?;

        let classification = parse_classification(text)?;
        Ok(Decision {
            task_type: classification.task_type,
            reason: classification.reason,
            source: DecisionSource::Llm,
            matched_rule_id: None,
            matched_rule_name: None,
            model_used: None,
            from_cache: false,
            latency_ms: 0,
            all_matches: Vec::new(),
        })
    }
}

const CLASSIFIER_SYSTEM_PROMPT: &str = "Classify the following user message into exactly one task type: \
simple, default, complex, background, think, web_search. Respond with only a JSON object of the shape \
{\"task_type\": \"...\", \"reason\": \"...\"} and nothing else.";

#[derive(serde::Deserialize)]
struct Classification {
    task_type: TaskType,
    reason: String,
}

fn parse_classification(text: &str) -> anyhow::Result<Classification> {
    let trimmed = text.trim();
    if let Ok(c) = serde_json::from_str::<Classification>(trimmed) {
        return Ok(c);
    }
    let start = trimmed.find('{').ok_or_else(|| anyhow::anyhow!("no JSON object in classifier response"))?;
    let end = trimmed.rfind('}').ok_or_else(|| anyhow::anyhow!("no JSON object in classifier response"))?;
    serde_json::from_str(&trimmed[start..=end]).map_err(|e| anyhow::anyhow!("failed to parse classifier JSON: {e}"))
}

fn preview(fp: &str) -> String {
    fp.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use crate::routing::embedding::DeterministicEmbeddingBackend;
    use crate::snapshot::{Endpoint, EndpointStore};
    use crate::types::{ModelId, ProviderId, ProviderModelId};

    fn classifier_config(model_id: ModelId) -> (RoutingConfig, RoutingLlmConfig) {
        let mut config = RoutingConfig::default();
        config.rule_based_routing_enabled = false;
        config.semantic_cache_enabled = false;
        let llm_config = RoutingLlmConfig { primary_model_id: Some(model_id), fallback_model_id: None, retry_count: 0, timeout_seconds: 5 };
        (config, llm_config)
    }

    fn classifier_endpoint(model_id: ModelId, base_url: String) -> Endpoint {
        Endpoint {
            id: ProviderModelId::new_v4(),
            provider_id: ProviderId::new_v4(),
            provider_name: "classifier-provider".to_string(),
            base_url,
            api_key: None,
            provider_weight: 1,
            max_concurrent: 10,
            extra_headers: serde_json::json!({}),
            model_id,
            model_name: "classifier-model".to_string(),
            role: "default".to_string(),
            cost_per_mtoken_in: rust_decimal::Decimal::ONE,
            cost_per_mtoken_out: rust_decimal::Decimal::ONE,
            billing_multiplier: rust_decimal::Decimal::ONE,
            supports_thinking: false,
            model_weight: 1,
        }
    }

    fn features(message: &str) -> RequestFeatures {
        RequestFeatures {
            last_user_message: message.to_string(),
            system_prompt: None,
            model: "claude-3-haiku".to_string(),
            has_tool: false,
            has_image: false,
        }
    }

    #[sqlx::test]
    async fn concurrent_routes_for_the_same_fingerprint_issue_one_classifier_call(pool: sqlx::PgPool) {
        let upstream = MockServer::start().await;
        let call_count = Arc::new(AtomicUsize::new(0));
        let counted = call_count.clone();

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(move |_req: &Request| {
                counted.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(100))
                    .set_body_json(serde_json::json!({
                        "content": [{"text": "{\"task_type\": \"complex\", \"reason\": \"multi-step\"}"}],
                    }))
            })
            .mount(&upstream)
            .await;

        let model_id = ModelId::new_v4();
        let (config, llm_config) = classifier_config(model_id);
        let endpoints = Arc::new(EndpointStore::new_with_endpoints(vec![classifier_endpoint(model_id, upstream.uri())]));
        let embedding: Arc<dyn EmbeddingBackend> = Arc::new(DeterministicEmbeddingBackend::new(16));
        let router = Arc::new(LlmRouter::new(config, llm_config, pool, embedding, endpoints));

        let router_a = router.clone();
        let router_b = router.clone();
        let (decision_a, decision_b) = tokio::join!(router_a.route(&features("classify me please")), router_b.route(&features("classify me please")));

        assert_eq!(decision_a.task_type, TaskType::Complex);
        assert_eq!(decision_b.task_type, TaskType::Complex);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parse_classification_accepts_bare_json() {
        let c = parse_classification(r#"{"task_type": "complex", "reason": "multi-step"}"#).unwrap();
        assert_eq!(c.task_type, TaskType::Complex);
    }

    #[test]
    fn parse_classification_extracts_json_from_surrounding_prose() {
        let c = parse_classification("Sure, here you go: {\"task_type\": \"simple\", \"reason\": \"short\"} thanks").unwrap();
        assert_eq!(c.task_type, TaskType::Simple);
    }

    #[test]
    fn parse_classification_rejects_non_json() {
        assert!(parse_classification("I cannot classify this").is_err());
    }
}
