//! API request and response data models.
//!
//! This module contains the data structures used for HTTP request deserialization
//! and response serialization. These models define the public API contract.
//!
//! # Design Principles
//!
//! - **Separation of Concerns**: API models are distinct from database models,
//!   allowing independent evolution of API and storage representations
//! - **Validation**: Models use serde for deserialization and validation
//! - **OpenAPI**: All models are annotated with `utoipa` for automatic API docs
//! - **Type Safety**: Strong typing with newtype wrappers for IDs
//!
//! # Model Categories
//!
//! - [`users`]: Admin user accounts
//! - [`api_keys`]: Proxy API key metadata (secrets returned once, at creation)
//! - [`providers`]: Upstream provider configurations
//! - [`models`]: Model catalog entries (role, cost, weight)
//! - [`provider_models`]: Provider/model pairs that form routable endpoints
//! - [`routing_rules`]: Keyword/regex/condition routing rules
//! - [`config`]: The persisted singleton config sections
//! - [`pagination`]: Shared `skip`/`limit` query parameters

pub mod api_keys;
pub mod config;
pub mod models;
pub mod pagination;
pub mod provider_models;
pub mod providers;
pub mod routing_rules;
pub mod users;
