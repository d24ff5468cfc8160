//! API layer for HTTP request handling and data models.
//!
//! This module contains the admin REST API implementation, organized into:
//!
//! - **[`handlers`]**: Axum route handlers for all admin endpoints
//! - **[`models`]**: Request/response data structures for admin API communication
//!
//! # API Structure
//!
//! - **Users** (`/admin/api/v1/users/*`)
//! - **API keys** (`/admin/api/v1/api-keys/*`)
//! - **Providers** (`/admin/api/v1/providers/*`)
//! - **Models** (`/admin/api/v1/models/*`)
//! - **Provider/model associations** (`/admin/api/v1/provider-models/*`)
//! - **Routing rules** (`/admin/api/v1/routing-rules/*`)
//! - **Config** (`/admin/api/v1/config/*`)
//!
//! The proxy surface itself (`POST /v1/messages`) lives in [`crate::proxy`],
//! not here.
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with OpenAPI/Swagger annotations using `utoipa`.

pub mod handlers;
pub mod models;
