//! Artisan Roast Core - Shared types library.
//!
//! This crate provides the common domain types used by the Artisan Roast
//! commerce components, most importantly the order/subscription
//! reconciliation engine.
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money amounts, emails,
//!   and the order/subscription status enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
