//! Common types module for the Cashu settlement gateway.
//!
//! This module defines the data model shared by every gateway component:
//! commerce orders, the typed settlement record attached to them, mint wire
//! types, and the HTTP API request/response shapes.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Mint wire types (melt quotes, keysets, proofs).
pub mod mint;
/// Commerce order types.
pub mod order;
/// Secret order key with constant-time verification.
pub mod order_key;
/// Settlement record attached to each order.
pub mod settlement;
/// Storage namespaces.
pub mod storage;
/// Small helpers shared across crates.
pub mod utils;
/// Implementation config schemas and registries.
pub mod validation;

pub use api::*;
pub use mint::*;
pub use order::*;
pub use order_key::OrderKey;
pub use settlement::*;
pub use storage::*;
pub use utils::{current_timestamp, normalize_mint_url, same_mint, truncate_chars};
pub use validation::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
