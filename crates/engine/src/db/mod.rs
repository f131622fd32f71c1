//! Database access layer.
//!
//! # Tables
//!
//! - `users` - customer accounts (email, contact details)
//! - `addresses` - saved shipping addresses per user
//! - `products` / `variants` / `purchase_options` - catalog with stock
//! - `orders` / `order_items` - materialized orders with payment references
//! - `subscriptions` - local mirror of processor subscription state
//! - `inventory_exceptions` - stock shortfalls recorded during reservation
//!
//! Migrations live in `migrations/` and are applied with `sqlx migrate run`
//! (not at startup).

pub mod addresses;
pub mod catalog;
mod inventory;
pub mod orders;
pub mod subscriptions;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::EngineConfig;

/// Embedded migrations, applied by the `sqlx` CLI or integration tests.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Create a `PostgreSQL` connection pool from configuration.
///
/// # Errors
///
/// Returns `sqlx::Error` if the database is unreachable.
pub async fn create_pool(config: &EngineConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(config.database_url.expose_secret())
        .await
}

/// `PostgreSQL`-backed store implementing every persistence trait.
///
/// The order path runs its multi-statement work (insert, reserve stock,
/// restock) inside transactions on the shared pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) const fn pool(&self) -> &PgPool {
        &self.pool
    }
}
