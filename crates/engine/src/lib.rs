//! Artisan Roast reconciliation engine library.
//!
//! Keeps the local order ledger, inventory counts, and subscription records
//! consistent with the payment processor's view of the world, across
//! asynchronous webhook delivery, user-initiated subscription actions, and
//! partial failures.
//!
//! The engine is exposed as a library so the binary stays thin and the axum
//! router can be driven end to end in tests with in-memory stores and a mock
//! processor client.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod billing;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod middleware;
pub mod models;
pub mod processor;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
