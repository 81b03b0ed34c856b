//! Durable local copy of the payer's ecash.
//!
//! Change is written here the moment a melt returns it, before the
//! confirmation call, so a failed confirmation never loses ecash. Proofs
//! minted during a foreign-mint swap are written before they are melted.
//! Entries are encoded tokens, or the raw proofs as a JSON array when the
//! wallet could not encode them.

use super::ClientError;
use async_trait::async_trait;
use cashu_storage::StorageService;
use cashu_types::StorageKey;
use std::sync::Arc;

#[async_trait]
pub trait RecoveryStore: Send + Sync {
	/// Appends a token for an order. Saving the same token twice is a no-op.
	async fn save(&self, order_id: u64, token: &str) -> Result<(), ClientError>;

	/// Every token saved for an order, oldest first.
	async fn load(&self, order_id: u64) -> Result<Vec<String>, ClientError>;
}

/// [`RecoveryStore`] over the storage service.
pub struct StorageRecoveryStore {
	storage: Arc<StorageService>,
}

impl StorageRecoveryStore {
	const MAX_ATTEMPTS: usize = 16;

	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}
}

#[async_trait]
impl RecoveryStore for StorageRecoveryStore {
	async fn save(&self, order_id: u64, token: &str) -> Result<(), ClientError> {
		let ns = StorageKey::RecoveryTokens.as_str();
		let id = order_id.to_string();
		for _ in 0..Self::MAX_ATTEMPTS {
			let current = self
				.storage
				.retrieve_versioned::<Vec<String>>(ns, &id)
				.await
				.map_err(|e| ClientError::Recovery(e.to_string()))?;
			let (mut tokens, expected) = match current {
				Some(v) => (v.value, Some(v.raw)),
				None => (Vec::new(), None),
			};
			if tokens.iter().any(|t| t == token) {
				return Ok(());
			}
			tokens.push(token.to_string());
			if self
				.storage
				.store_if_unchanged(ns, &id, expected.as_deref(), &tokens)
				.await
				.map_err(|e| ClientError::Recovery(e.to_string()))?
			{
				tracing::debug!(order_id, "Saved change token for recovery");
				return Ok(());
			}
		}
		Err(ClientError::Recovery(format!(
			"recovery tokens for order {} are contended",
			order_id
		)))
	}

	async fn load(&self, order_id: u64) -> Result<Vec<String>, ClientError> {
		Ok(self
			.storage
			.retrieve_versioned::<Vec<String>>(
				StorageKey::RecoveryTokens.as_str(),
				&order_id.to_string(),
			)
			.await
			.map_err(|e| ClientError::Recovery(e.to_string()))?
			.map(|v| v.value)
			.unwrap_or_default())
	}
}
