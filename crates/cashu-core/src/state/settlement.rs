//! Settlement record persistence.

use super::{StateError, MAX_CAS_ATTEMPTS};
use cashu_storage::StorageService;
use cashu_types::{current_timestamp, OrderSettlementRecord, StorageKey};
use std::sync::Arc;

/// A record plus the bytes it was read from, `None` if it was never stored.
pub struct VersionedRecord {
	pub record: OrderSettlementRecord,
	pub version: Option<Vec<u8>>,
}

/// Loads and updates [`OrderSettlementRecord`]s under optimistic concurrency.
pub struct SettlementRepository {
	storage: Arc<StorageService>,
}

impl SettlementRepository {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Loads the record for an order, or a fresh empty one.
	pub async fn load(&self, order_id: u64) -> Result<OrderSettlementRecord, StateError> {
		Ok(self.load_versioned(order_id).await?.record)
	}

	pub async fn load_versioned(&self, order_id: u64) -> Result<VersionedRecord, StateError> {
		let stored = self
			.storage
			.retrieve_versioned::<OrderSettlementRecord>(
				StorageKey::Settlements.as_str(),
				&order_id.to_string(),
			)
			.await?;
		Ok(match stored {
			Some(v) => VersionedRecord {
				record: v.value,
				version: Some(v.raw),
			},
			None => VersionedRecord {
				record: OrderSettlementRecord::new(order_id),
				version: None,
			},
		})
	}

	/// Writes `record` only if storage still holds `version`.
	pub async fn save_if_unchanged(
		&self,
		record: &OrderSettlementRecord,
		version: Option<&[u8]>,
	) -> Result<bool, StateError> {
		Ok(self
			.storage
			.store_if_unchanged(
				StorageKey::Settlements.as_str(),
				&record.order_id.to_string(),
				version,
				record,
			)
			.await?)
	}

	/// Read-modify-write with bounded retry.
	///
	/// `updater` returns whether it changed anything; unchanged records are
	/// not written. Returns the resulting record and whether it was written.
	pub async fn update<F>(
		&self,
		order_id: u64,
		mut updater: F,
	) -> Result<(OrderSettlementRecord, bool), StateError>
	where
		F: FnMut(&mut OrderSettlementRecord) -> bool,
	{
		for _ in 0..MAX_CAS_ATTEMPTS {
			let VersionedRecord { mut record, version } = self.load_versioned(order_id).await?;
			if !updater(&mut record) {
				return Ok((record, false));
			}
			record.updated_at = current_timestamp();
			if self.save_if_unchanged(&record, version.as_deref()).await? {
				return Ok((record, true));
			}
			tokio::task::yield_now().await;
		}
		Err(StateError::Contention(format!(
			"settlement record {}",
			order_id
		)))
	}
}
