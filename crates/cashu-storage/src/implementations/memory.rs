//! In-memory storage backend.
//!
//! Entries live in a `HashMap` behind a `RwLock`. TTLs are honoured on read
//! and by `cleanup_expired`; compare-and-swap runs entirely under the write
//! lock.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use cashu_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
		Self {
			value,
			expires_at: ttl
				.filter(|t| !t.is_zero())
				.map(|t| Instant::now() + t),
		}
	}

	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| now >= at)
	}
}

/// In-memory storage implementation.
pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		match store.get(key) {
			Some(entry) if !entry.is_expired(Instant::now()) => Ok(entry.value.clone()),
			_ => Err(StorageError::NotFound),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), Entry::new(value, ttl));
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.get(key)
			.is_some_and(|entry| !entry.is_expired(Instant::now())))
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let mut store = self.store.write().await;
		let now = Instant::now();
		let current = store
			.get(key)
			.filter(|entry| !entry.is_expired(now))
			.map(|entry| entry.value.as_slice());
		if current != expected {
			return Ok(false);
		}
		store.insert(key.to_string(), Entry::new(value, ttl));
		Ok(true)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut store = self.store.write().await;
		let now = Instant::now();
		let before = store.len();
		store.retain(|_, entry| !entry.is_expired(now));
		Ok(before - store.len())
	}
}

/// Configuration schema for MemoryStorage. No fields.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		storage.set_bytes("k", b"v".to_vec(), None).await.unwrap();
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"v".to_vec());
		assert!(storage.exists("k").await.unwrap());

		storage.delete("k").await.unwrap();
		assert!(!storage.exists("k").await.unwrap());
		assert!(matches!(
			storage.get_bytes("k").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_ttl_expiry_and_cleanup() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("short", b"1".to_vec(), Some(Duration::from_millis(10)))
			.await
			.unwrap();
		storage.set_bytes("long", b"2".to_vec(), None).await.unwrap();

		tokio::time::sleep(Duration::from_millis(30)).await;

		assert!(!storage.exists("short").await.unwrap());
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(storage.exists("long").await.unwrap());
	}

	#[tokio::test]
	async fn test_compare_and_swap() {
		let storage = MemoryStorage::new();
		assert!(storage
			.compare_and_swap("k", None, b"a".to_vec(), None)
			.await
			.unwrap());
		assert!(!storage
			.compare_and_swap("k", None, b"b".to_vec(), None)
			.await
			.unwrap());
		assert!(!storage
			.compare_and_swap("k", Some(b"x"), b"b".to_vec(), None)
			.await
			.unwrap());
		assert!(storage
			.compare_and_swap("k", Some(b"a"), b"b".to_vec(), None)
			.await
			.unwrap());
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"b".to_vec());
	}

	#[tokio::test]
	async fn test_compare_and_swap_treats_expired_as_absent() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("k", b"old".to_vec(), Some(Duration::from_millis(5)))
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(storage
			.compare_and_swap("k", None, b"new".to_vec(), None)
			.await
			.unwrap());
	}
}
