//! Request/response shapes for `/admin/api/v1/config`, the admin surface
//! over the six persisted singleton sections backed by `shared_state`.
//!
//! Each section is stored as its own JSON-serialized row keyed by name
//! (`proxy`, `health_check`, `load_balance`, `routing`, `routing_llm`, `ui`);
//! updating a section here writes that row, which the next
//! [`crate::config::Config::with_persisted`] re-extraction picks up ahead of
//! the compiled default but behind any environment override.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::{HealthCheckConfig, LoadBalanceConfig, ProxyConfig, RoutingConfig, RoutingLlmConfig, UiConfig};

/// The full set of persisted config sections, as currently in effect.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigResponse {
    pub proxy: ProxyConfig,
    pub health_check: HealthCheckConfig,
    pub load_balance: LoadBalanceConfig,
    pub routing: RoutingConfig,
    pub routing_llm: RoutingLlmConfig,
    pub ui: UiConfig,
}

/// One named section, addressed by `/admin/api/v1/config/{section}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSection {
    Proxy,
    HealthCheck,
    LoadBalance,
    Routing,
    RoutingLlm,
    Ui,
}

impl ConfigSection {
    /// The `shared_state.key` this section is persisted under.
    pub fn key(self) -> &'static str {
        match self {
            ConfigSection::Proxy => "proxy",
            ConfigSection::HealthCheck => "health_check",
            ConfigSection::LoadBalance => "load_balance",
            ConfigSection::Routing => "routing",
            ConfigSection::RoutingLlm => "routing_llm",
            ConfigSection::Ui => "ui",
        }
    }
}

/// Opaque partial update for one section, merged over the section's current
/// value before being re-validated against its typed shape.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfigSectionUpdate {
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
}
