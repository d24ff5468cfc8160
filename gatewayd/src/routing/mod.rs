//! Task classification and routing: the three-stage decision pipeline
//! (cache lookup -> rule match -> LLM fallback) that maps a request to a
//! task type, plus the endpoint selector that turns a task type into a
//! concrete endpoint.

pub mod cache;
pub mod classifier;
pub mod embedding;
pub mod llm_router;
pub mod selector;

use sha2::{Digest, Sha256};

use crate::types::{DecisionSource, RoutingRuleId, TaskType};

/// A routing decision: `{task_type, reason, source, matched_rule?,
/// model_used?, from_cache, latency_ms}`.
#[derive(Debug, Clone)]
pub struct Decision {
    pub task_type: TaskType,
    pub reason: String,
    pub source: DecisionSource,
    pub matched_rule_id: Option<RoutingRuleId>,
    pub matched_rule_name: Option<String>,
    pub model_used: Option<String>,
    pub from_cache: bool,
    pub latency_ms: u64,
    /// Every rule that *would* have matched, for observability; only the
    /// first (highest priority) one is authoritative.
    pub all_matches: Vec<RoutingRuleId>,
}

impl Decision {
    pub fn default_role(default_role: TaskType, reason: impl Into<String>) -> Self {
        Self {
            task_type: default_role,
            reason: reason.into(),
            source: DecisionSource::Default,
            matched_rule_id: None,
            matched_rule_name: None,
            model_used: None,
            from_cache: false,
            latency_ms: 0,
            all_matches: Vec::new(),
        }
    }
}

/// The request features the fingerprint and classifier both read.
#[derive(Debug, Clone)]
pub struct RequestFeatures {
    pub last_user_message: String,
    pub system_prompt: Option<String>,
    pub model: String,
    pub has_tool: bool,
    pub has_image: bool,
}

/// Stable hash over the normalised last-user-message text plus system
/// prompt - the L1/L2 cache key. Normalisation is lowercase + trimmed
/// whitespace so semantically-identical requests with incidental casing or
/// spacing differences still share a cache entry.
pub fn fingerprint(features: &RequestFeatures) -> String {
    let normalised_message = normalise(&features.last_user_message);
    let normalised_system = features.system_prompt.as_deref().map(normalise).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(normalised_message.as_bytes());
    hasher.update(b"\0");
    hasher.update(normalised_system.as_bytes());
    hex::encode(hasher.finalize())
}

/// `content_hash = H(fingerprint)`, the L2 cache key.
pub fn content_hash(fp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fp.as_bytes());
    hex::encode(hasher.finalize())
}

fn normalise(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Minimal hex encoding, avoiding a dedicated `hex` crate dependency since
/// sha2's output is a fixed-size byte array and this crate's other binary
/// encodings already go through `base64`.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        use std::fmt::Write;
        let mut s = String::with_capacity(bytes.as_ref().len() * 2);
        for b in bytes.as_ref() {
            let _ = write!(s, "{:02x}", b);
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(message: &str) -> RequestFeatures {
        RequestFeatures {
            last_user_message: message.to_string(),
            system_prompt: None,
            model: "claude-3-haiku".to_string(),
            has_tool: false,
            has_image: false,
        }
    }

    #[test]
    fn fingerprint_is_stable_for_identical_input() {
        assert_eq!(fingerprint(&features("hello")), fingerprint(&features("hello")));
    }

    #[test]
    fn fingerprint_ignores_case_and_surrounding_whitespace() {
        assert_eq!(fingerprint(&features("  Hello  ")), fingerprint(&features("hello")));
    }

    #[test]
    fn fingerprint_differs_for_different_input() {
        assert_ne!(fingerprint(&features("hello")), fingerprint(&features("goodbye")));
    }

    #[test]
    fn content_hash_is_deterministic_function_of_fingerprint() {
        let fp = fingerprint(&features("hello"));
        assert_eq!(content_hash(&fp), content_hash(&fp));
    }
}
