//! Storage module for the Cashu settlement gateway.
//!
//! Key/value storage with optional TTL and compare-and-swap. Orders and
//! settlement records are written under optimistic concurrency: a writer
//! reads the current bytes, computes the new value and only stores it if
//! the bytes are still the ones it read.

use async_trait::async_trait;
use cashu_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface for storage backends.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Atomically replaces the value if the stored bytes equal `expected`.
	///
	/// `expected = None` means the key must be absent (or expired). Returns
	/// `Ok(false)` without writing when the current value differs.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries, returning how many were removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// All built-in storage implementations as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// A deserialized value together with the exact bytes it was read from.
///
/// The bytes are the version token for a later
/// [`StorageService::store_if_unchanged`].
#[derive(Debug, Clone)]
pub struct Versioned<T> {
	pub value: T,
	pub raw: Vec<u8>,
}

/// High-level storage service that provides typed operations.
///
/// Values are stored as JSON under `namespace:id` keys.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
		serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
		serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves a value along with its version token, `None` if absent.
	pub async fn retrieve_versioned<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<Versioned<T>>, StorageError> {
		match self.backend.get_bytes(&Self::key(namespace, id)).await {
			Ok(raw) => Ok(Some(Versioned {
				value: Self::decode(&raw)?,
				raw,
			})),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Stores `data` only if the key still holds `expected`.
	///
	/// Pass the `raw` bytes of a [`Versioned`] read, or `None` to create.
	pub async fn store_if_unchanged<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		expected: Option<&[u8]>,
		data: &T,
	) -> Result<bool, StorageError> {
		let bytes = Self::encode(data)?;
		self.backend
			.compare_and_swap(&Self::key(namespace, id), expected, bytes, None)
			.await
	}

	/// Removes expired entries from storage.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}

	/// Atomically increments a counter and returns the new value.
	///
	/// Counters start at 1. Retries on contention.
	pub async fn next_sequence(&self, namespace: &str, id: &str) -> Result<u64, StorageError> {
		const MAX_ATTEMPTS: usize = 64;
		for _ in 0..MAX_ATTEMPTS {
			let current = self.retrieve_versioned::<u64>(namespace, id).await?;
			let (next, expected) = match &current {
				Some(v) => (v.value + 1, Some(v.raw.as_slice())),
				None => (1, None),
			};
			if self
				.store_if_unchanged(namespace, id, expected, &next)
				.await?
			{
				return Ok(next);
			}
			tokio::task::yield_now().await;
		}
		Err(StorageError::Backend(format!(
			"counter {}:{} is contended",
			namespace, id
		)))
	}
}
