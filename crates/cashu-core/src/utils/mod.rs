//! Utility functions for the gateway core.

pub mod formatting;

pub use formatting::truncate_id;
