//! Storage-related types for the gateway.

use std::str::FromStr;

/// Storage namespaces for the different data collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Commerce orders.
	Orders,
	/// Settlement records, one per order.
	Settlements,
	/// Payer-side recovery copies of change tokens.
	RecoveryTokens,
	/// Monotonic counters (order ids).
	Counters,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Settlements => "settlements",
			StorageKey::RecoveryTokens => "recovery_tokens",
			StorageKey::Counters => "counters",
		}
	}

	/// Namespaces whose entries must never expire. Orders carry the paid
	/// flag and settlement records carry accepted change tokens.
	pub fn is_durable(&self) -> bool {
		matches!(self, StorageKey::Orders | StorageKey::Settlements)
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::Settlements,
			Self::RecoveryTokens,
			Self::Counters,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|k| k.as_str() == s).ok_or(())
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
