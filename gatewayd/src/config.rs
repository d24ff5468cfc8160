//! Application configuration management.
//!
//! Configuration is loaded from environment variables with compiled
//! defaults, then — once the database is reachable — re-extracted with the
//! persisted singleton rows layered in between. Precedence, for every key:
//!
//! ```text
//! environment variable  >  persisted singleton row  >  compiled default
//! ```
//!
//! Environment variables are prefixed `GATEWAYD_` (double underscore nests,
//! e.g. `GATEWAYD_HEALTH_CHECK__INTERVAL_SECONDS`); `LOG_LEVEL` is the one
//! unprefixed exception. `DATABASE_PATH` is the connection string env var
//! name (kept as named in the source system this was distilled from, even
//! though the store here is Postgres, not a file path).
//!
//! ```no_run
//! use clap::Parser;
//! use gatewayd::config::{Args, Config};
//!
//! let args = Args::parse();
//! let config = Config::bootstrap(&args).unwrap();
//! println!("binding to {}", config.bind_address());
//! ```

use clap::Parser;
use figment::{
    providers::{Env, Format, Json, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

use crate::types::LoadBalanceStrategy;

/// CLI arguments: an optional config file plus a validate-only mode.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to an optional YAML config file layered beneath persisted/env config.
    #[arg(short = 'f', long, env = "GATEWAYD_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub session_expire_hours: u64,
    pub cookie_secure: bool,
    /// Timeout for the single upstream call on the buffered path. The proxy
    /// never retries a transient upstream failure, so this is the entire
    /// budget for one attempt.
    #[serde(with = "humantime_serde")]
    #[schema(value_type = String)]
    pub upstream_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: 4,
            session_expire_hours: 24,
            cookie_secure: true,
            upstream_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestLogConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            max_retries: 3,
            retry_base_delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    #[schema(value_type = String)]
    pub interval: Duration,
    #[serde(with = "humantime_serde")]
    #[schema(value_type = String)]
    pub timeout: Duration,
    /// Consecutive probe failures required to move degraded -> unhealthy.
    pub unhealthy_after_failures: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            unhealthy_after_failures: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, ToSchema)]
#[serde(default)]
pub struct LoadBalanceConfig {
    pub strategy: LoadBalanceStrategy,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct RoutingConfig {
    pub rule_based_routing_enabled: bool,
    pub rule_fallback_strategy: String,
    pub fixed_task_type: Option<String>,
    pub default_role: String,
    pub semantic_cache_enabled: bool,
    pub l1_capacity: u64,
    #[serde(with = "humantime_serde")]
    #[schema(value_type = String)]
    pub l1_ttl: Duration,
    #[serde(with = "humantime_serde")]
    #[schema(value_type = String)]
    pub l2_ttl: Duration,
    #[serde(with = "humantime_serde")]
    #[schema(value_type = String)]
    pub l3_ttl: Duration,
    pub l3_similarity_threshold: f64,
    /// Embedding backend used for L3 semantic lookups. `None` falls back to
    /// a deterministic hash-based backend (no outbound network calls),
    /// which is the only option exercised in tests.
    pub embedding_endpoint_url: Option<String>,
    pub embedding_dimension: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            rule_based_routing_enabled: true,
            rule_fallback_strategy: "llm".to_string(),
            fixed_task_type: None,
            default_role: "default".to_string(),
            semantic_cache_enabled: true,
            l1_capacity: 10_000,
            l1_ttl: Duration::from_secs(600),
            l2_ttl: Duration::from_secs(3600 * 24),
            l3_ttl: Duration::from_secs(3600 * 24),
            l3_similarity_threshold: 0.82,
            embedding_endpoint_url: None,
            embedding_dimension: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct RoutingLlmConfig {
    pub primary_model_id: Option<uuid::Uuid>,
    pub fallback_model_id: Option<uuid::Uuid>,
    pub retry_count: u32,
    pub timeout_seconds: u64,
}

impl Default for RoutingLlmConfig {
    fn default() -> Self {
        Self {
            primary_model_id: None,
            fallback_model_id: None,
            retry_count: 2,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, ToSchema)]
#[serde(default)]
pub struct UiConfig {
    pub title: String,
    pub support_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: 600,
            window_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LeaderConfig {
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub stale_after: Duration,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            stale_after: Duration::from_secs(30),
        }
    }
}

/// Root configuration. The six nested sections marked below mirror the
/// persisted singleton rows (id=1 each): `proxy`, `health_check`,
/// `load_balance`, `routing`, `ui`, `routing_llm`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub secret_key: Option<String>,
    pub default_admin_username: String,
    pub default_admin_password: Option<String>,
    /// Static bearer token gating the admin surface (see auth::current_user::AdminUser).
    pub admin_token: String,

    pub proxy: ProxyConfig,
    pub health_check: HealthCheckConfig,
    pub load_balance: LoadBalanceConfig,
    pub routing: RoutingConfig,
    pub routing_llm: RoutingLlmConfig,
    pub ui: UiConfig,

    pub rate_limit: RateLimitConfig,
    pub leader: LeaderConfig,
    pub request_log: RequestLogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/gatewayd".to_string(),
            secret_key: None,
            default_admin_username: "admin".to_string(),
            default_admin_password: None,
            admin_token: "change-me".to_string(),
            proxy: ProxyConfig::default(),
            health_check: HealthCheckConfig::default(),
            load_balance: LoadBalanceConfig::default(),
            routing: RoutingConfig::default(),
            routing_llm: RoutingLlmConfig::default(),
            ui: UiConfig::default(),
            rate_limit: RateLimitConfig::default(),
            leader: LeaderConfig::default(),
            request_log: RequestLogConfig::default(),
        }
    }
}

impl Config {
    /// Base figment: compiled defaults, an optional YAML file, then env.
    /// This is what's available before a database connection exists.
    fn base_figment(args: &Args) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("GATEWAYD_").split("__"))
            .merge(Env::raw().only(&["DATABASE_PATH"]).map(|_| "database_url".into()))
    }

    /// Phase 1: resolve enough configuration (database url, admin token) to
    /// connect to the store. Does not see persisted singleton rows yet.
    pub fn bootstrap(args: &Args) -> Result<Self, figment::Error> {
        Self::base_figment(args).extract()
    }

    /// Phase 2: re-extract with the persisted singleton rows inserted
    /// between the compiled default and the environment layer, so an env
    /// var still wins over a persisted value, which still wins over the
    /// compiled default.
    pub fn with_persisted(args: &Args, persisted: serde_json::Value) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Json::string(&persisted.to_string()))
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("GATEWAYD_").split("__"))
            .merge(Env::raw().only(&["DATABASE_PATH"]).map(|_| "database_url".into()))
            .extract()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.proxy.host, self.proxy.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn env_overrides_compiled_default() {
        Jail::expect_with(|jail| {
            jail.set_env("GATEWAYD_PROXY__PORT", "9999");
            jail.set_env("DATABASE_PATH", "postgres://x/y");
            let args = Args {
                config: "nonexistent.yaml".to_string(),
                validate: false,
            };
            let config = Config::bootstrap(&args).unwrap();
            assert_eq!(config.proxy.port, 9999);
            assert_eq!(config.database_url, "postgres://x/y");
            Ok(())
        });
    }

    #[test]
    fn env_outranks_persisted_row() {
        Jail::expect_with(|jail| {
            jail.set_env("GATEWAYD_PROXY__PORT", "9999");
            let args = Args {
                config: "nonexistent.yaml".to_string(),
                validate: false,
            };
            let persisted = serde_json::json!({ "proxy": { "port": 5555 } });
            let config = Config::with_persisted(&args, persisted).unwrap();
            assert_eq!(config.proxy.port, 9999);
            Ok(())
        });
    }

    #[test]
    fn persisted_row_outranks_compiled_default() {
        Jail::expect_with(|jail| {
            let args = Args {
                config: "nonexistent.yaml".to_string(),
                validate: false,
            };
            let persisted = serde_json::json!({ "proxy": { "port": 5555 } });
            let config = Config::with_persisted(&args, persisted).unwrap();
            assert_eq!(config.proxy.port, 5555);
            Ok(())
        });
    }
}
