//! Endpoint implementations and their error mapping.

pub mod confirm;
pub mod orders;

/// Message for unknown orders and wrong keys alike.
pub const UNAUTHORIZED_MESSAGE: &str = "Invalid order or key";

/// Seconds a client should wait before retrying an upstream failure.
pub const RETRY_AFTER_SECONDS: u64 = 30;

pub(crate) fn unauthorized() -> cashu_types::APIError {
	cashu_types::APIError::Forbidden {
		error_type: "UNAUTHORIZED".to_string(),
		message: UNAUTHORIZED_MESSAGE.to_string(),
	}
}
