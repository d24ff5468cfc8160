//! Database layer for data persistence and access.
//!
//! Implements the data access layer using SQLx with PostgreSQL, behind the
//! repository pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (axum handlers, proxy/routing services)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers — queries, one per table)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models — create/update/response structs)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Repository pattern
//!
//! ```ignore
//! use gatewayd::db::handlers::{Providers, Repository};
//!
//! async fn example(pool: &sqlx::PgPool) -> anyhow::Result<()> {
//!     let mut conn = pool.acquire().await?;
//!     let mut providers = Providers::new(&mut conn);
//!     let created = providers.create(&create_request).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Migrations
//!
//! Migrations live under `migrations/` at the workspace root and run
//! automatically from [`crate::db::run_migrations`] on startup; failure to
//! migrate is fatal.

use sqlx::PgPool;

pub mod errors;
pub mod handlers;
pub mod models;

/// Run pending migrations. Failure here is fatal: the process should not
/// serve traffic against a schema it cannot account for.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
