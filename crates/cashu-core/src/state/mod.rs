//! Persistent state for orders and their settlement records.
//!
//! Both stores write through compare-and-swap on the stored bytes, so
//! concurrent requests never lose each other's updates and the paid
//! transition happens exactly once without a global lock.

pub mod order;
pub mod settlement;

pub use order::OrderStore;
pub use settlement::SettlementRepository;

use thiserror::Error;

/// Attempts made by a read-modify-write before giving up.
pub(crate) const MAX_CAS_ATTEMPTS: usize = 16;

/// Errors that can occur while reading or updating state.
#[derive(Debug, Error)]
pub enum StateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Order not found: {0}")]
	OrderNotFound(u64),
	/// Every CAS attempt lost to a concurrent writer.
	#[error("Contention on {0}")]
	Contention(String),
}

impl From<cashu_storage::StorageError> for StateError {
	fn from(err: cashu_storage::StorageError) -> Self {
		StateError::Storage(err.to_string())
	}
}
