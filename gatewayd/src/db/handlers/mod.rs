//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection` so callers control transaction
//! scope, and implements the [`Repository`] trait for strongly-typed CRUD.
//!
//! ```ignore
//! use gatewayd::db::handlers::{Providers, Repository};
//!
//! async fn example(pool: &sqlx::PgPool) -> anyhow::Result<()> {
//!     let mut conn = pool.acquire().await?;
//!     let mut providers = Providers::new(&mut conn);
//!     let all = providers.list(&Default::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod api_key;
pub mod model;
pub mod provider;
pub mod provider_model;
pub mod repository;
pub mod request_log;
pub mod routing_cache;
pub mod routing_rule;
pub mod shared_state;
pub mod user;
pub mod worker_registry;

pub use api_key::ApiKeys;
pub use model::Models;
pub use provider::Providers;
pub use provider_model::ProviderModels;
pub use repository::Repository;
pub use request_log::RequestLogs;
pub use routing_cache::RoutingCache;
pub use routing_rule::RoutingRules;
pub use shared_state::SharedState;
pub use user::Users;
pub use worker_registry::WorkerRegistry;
