//! Database record models matching table schemas.
//!
//! Each entity exposes a `<Entity>CreateDBRequest` / `<Entity>UpdateDBRequest` /
//! `<Entity>DBResponse` triple. Database models are distinct from the thin
//! admin API models so storage and wire representations evolve independently.

pub mod api_key;
pub mod model;
pub mod provider;
pub mod provider_model;
pub mod request_log;
pub mod routing_cache;
pub mod routing_rule;
pub mod shared_state;
pub mod user;
pub mod worker_registry;
