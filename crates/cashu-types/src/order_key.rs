//! Secret order key.
//!
//! The commerce system hands every order a random key which the payer must
//! present on each confirmation call. `OrderKey` keeps the value out of logs,
//! zeroes it on drop and only compares it in constant time.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Prefix used by freshly generated keys, matching the commerce system's format.
pub const ORDER_KEY_PREFIX: &str = "wc_order_";

/// A secret order key that is redacted in debug and display output.
#[derive(Clone)]
pub struct OrderKey(Zeroizing<String>);

impl OrderKey {
	/// Wraps an existing key value.
	pub fn new(key: impl Into<String>) -> Self {
		Self(Zeroizing::new(key.into()))
	}

	/// Generates a fresh random key, `wc_order_` followed by 32 hex digits.
	pub fn generate() -> Self {
		Self::new(format!(
			"{}{}",
			ORDER_KEY_PREFIX,
			uuid::Uuid::new_v4().simple()
		))
	}

	/// Checks a presented key against this one in constant time.
	///
	/// Empty presented keys never match, even against an empty stored key.
	pub fn verify(&self, presented: &str) -> bool {
		if presented.is_empty() {
			return false;
		}
		self.0.as_bytes().ct_eq(presented.as_bytes()).into()
	}

	/// Exposes the raw key.
	///
	/// Only for building customer-facing receipt links and for persistence.
	pub fn expose_secret(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for OrderKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "OrderKey(***REDACTED***)")
	}
}

impl fmt::Display for OrderKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "***REDACTED***")
	}
}

impl PartialEq for OrderKey {
	fn eq(&self, other: &Self) -> bool {
		self.verify(other.expose_secret())
	}
}

impl Eq for OrderKey {}

// The order store must round-trip the real value, so unlike log output the
// serialized form is not redacted. API responses never embed an `OrderKey`.
impl Serialize for OrderKey {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.0)
	}
}

impl<'de> Deserialize<'de> for OrderKey {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(OrderKey::new(s))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_order_key_redacted() {
		let key = OrderKey::new("wc_order_abc123");
		assert_eq!(format!("{:?}", key), "OrderKey(***REDACTED***)");
		assert_eq!(format!("{}", key), "***REDACTED***");
	}

	#[test]
	fn test_verify() {
		let key = OrderKey::new("wc_order_abc123");
		assert!(key.verify("wc_order_abc123"));
		assert!(!key.verify("wc_order_abc124"));
		assert!(!key.verify("wc_order_abc1234"));
		assert!(!key.verify(""));
	}

	#[test]
	fn test_generate_is_prefixed_and_unique() {
		let a = OrderKey::generate();
		let b = OrderKey::generate();
		assert!(a.expose_secret().starts_with(ORDER_KEY_PREFIX));
		assert_eq!(a.expose_secret().len(), ORDER_KEY_PREFIX.len() + 32);
		assert_ne!(a, b);
	}

	#[test]
	fn test_empty_key_never_verifies() {
		let key = OrderKey::new("");
		assert!(!key.verify(""));
	}

	#[test]
	fn test_serde_round_trip_keeps_value() {
		let key = OrderKey::new("wc_order_xyz");
		let json = serde_json::to_string(&key).unwrap();
		assert_eq!(json, "\"wc_order_xyz\"");
		let back: OrderKey = serde_json::from_str(&json).unwrap();
		assert!(back.verify("wc_order_xyz"));
	}
}
