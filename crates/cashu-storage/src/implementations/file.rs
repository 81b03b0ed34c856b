//! File-based storage backend.
//!
//! One file per key under a base directory. Each file starts with a small
//! header carrying the expiry time. Writes go through a temp file and a
//! rename; every write (plain or compare-and-swap) holds an exclusive `fs2`
//! lock on the directory lock file, so a compare-and-swap cannot interleave
//! with another writer in this or another process.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use cashu_types::{
	current_timestamp, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema,
	StorageKey, ValidationError,
};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed-size file header.
///
/// Layout (32 bytes): magic `CWCS`, version (u16 LE), expiry (u64 LE, Unix
/// seconds, 0 = never), zero padding.
#[derive(Debug, Clone, Copy)]
struct FileHeader {
	expires_at: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"CWCS";
	const VERSION: u16 = 1;
	const SIZE: usize = 32;

	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp().saturating_add(ttl.as_secs().max(1))
		};
		Self { expires_at }
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&Self::VERSION.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE || &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Missing storage header".into()));
		}
		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}
		let mut expires = [0u8; 8];
		expires.copy_from_slice(&bytes[6..14]);
		Ok(Self {
			expires_at: u64::from_le_bytes(expires),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && current_timestamp() >= self.expires_at
	}
}

/// Default TTLs per storage namespace, from `ttl_<namespace>` keys.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	fn from_config(config: &toml::Value) -> Self {
		let mut ttls = HashMap::new();
		if let Some(table) = config.as_table() {
			for storage_key in StorageKey::all().filter(|k| !k.is_durable()) {
				let config_key = format!("ttl_{}", storage_key.as_str());
				if let Some(secs) = table.get(&config_key).and_then(|v| v.as_integer()) {
					ttls.insert(storage_key, Duration::from_secs(secs.max(0) as u64));
				}
			}
		}
		Self { ttls }
	}

	fn get_ttl(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|ns| ns.parse::<StorageKey>().ok())
			.and_then(|sk| self.ttls.get(&sk).copied())
			.unwrap_or(Duration::ZERO)
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	/// Runs a blocking closure while holding the directory write lock.
	async fn with_write_lock<T, F>(&self, f: F) -> Result<T, StorageError>
	where
		T: Send + 'static,
		F: FnOnce() -> Result<T, StorageError> + Send + 'static,
	{
		let base = self.base_path.clone();
		tokio::task::spawn_blocking(move || {
			fs::create_dir_all(&base).map_err(|e| StorageError::Backend(e.to_string()))?;
			let lock = OpenOptions::new()
				.create(true)
				.truncate(false)
				.write(true)
				.open(base.join(".lock"))
				.map_err(|e| StorageError::Backend(e.to_string()))?;
			lock.lock_exclusive()
				.map_err(|e| StorageError::Backend(e.to_string()))?;
			let result = f();
			if let Err(e) = FileExt::unlock(&lock) {
				tracing::warn!("Failed to release storage lock: {}", e);
			}
			result
		})
		.await
		.map_err(|e| StorageError::Backend(format!("storage task failed: {}", e)))?
	}
}

/// Reads the live payload of a file, `None` if missing or expired.
fn read_live(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
	let data = match fs::read(path) {
		Ok(data) => data,
		Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
		Err(e) => return Err(StorageError::Backend(e.to_string())),
	};
	let header = FileHeader::deserialize(&data)?;
	if header.is_expired() {
		return Ok(None);
	}
	Ok(Some(data[FileHeader::SIZE..].to_vec()))
}

fn write_atomic(path: &Path, value: &[u8], ttl: Duration) -> Result<(), StorageError> {
	let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
	file_data.extend_from_slice(&FileHeader::new(ttl).serialize());
	file_data.extend_from_slice(value);

	let temp_path = path.with_extension("tmp");
	fs::write(&temp_path, file_data).map_err(|e| StorageError::Backend(e.to_string()))?;
	fs::rename(&temp_path, path).map_err(|e| StorageError::Backend(e.to_string()))?;
	Ok(())
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);
		tokio::task::spawn_blocking(move || read_live(&path))
			.await
			.map_err(|e| StorageError::Backend(format!("storage task failed: {}", e)))??
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		let ttl = ttl.unwrap_or_else(|| self.ttl_config.get_ttl(key));
		self.with_write_lock(move || write_atomic(&path, &value, ttl))
			.await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		self.with_write_lock(move || match fs::remove_file(&path) {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		})
		.await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		match self.get_bytes(key).await {
			Ok(_) => Ok(true),
			Err(StorageError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let path = self.get_file_path(key);
		let ttl = ttl.unwrap_or_else(|| self.ttl_config.get_ttl(key));
		let expected = expected.map(<[u8]>::to_vec);
		self.with_write_lock(move || {
			let current = read_live(&path)?;
			if current != expected {
				return Ok(false);
			}
			write_atomic(&path, &value, ttl)?;
			Ok(true)
		})
		.await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let base = self.base_path.clone();
		self.with_write_lock(move || {
			let mut removed = 0;
			let entries = fs::read_dir(&base).map_err(|e| StorageError::Backend(e.to_string()))?;
			for entry in entries.flatten() {
				let path = entry.path();
				if path.extension() != Some(std::ffi::OsStr::new("bin")) {
					continue;
				}
				let expired = File::open(&path)
					.and_then(|mut f| {
						let mut header = [0u8; FileHeader::SIZE];
						std::io::Read::read_exact(&mut f, &mut header)?;
						Ok(header)
					})
					.ok()
					.and_then(|h| FileHeader::deserialize(&h).ok())
					.is_some_and(|h| h.is_expired());
				if expired {
					match fs::remove_file(&path) {
						Ok(_) => removed += 1,
						Err(e) => tracing::warn!("Failed to remove expired file {:?}: {}", path, e),
					}
				}
			}
			Ok(removed)
		})
		.await
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional = vec![Field::new("storage_path", FieldType::String)];
		for storage_key in StorageKey::all() {
			let config_key = format!("ttl_{}", storage_key.as_str());
			if storage_key.is_durable() {
				if config.get(&config_key).is_some() {
					return Err(ValidationError::InvalidValue {
						field: config_key,
						message: format!("{} entries never expire", storage_key.as_str()),
					});
				}
				continue;
			}
			optional.push(Field::new(
				config_key,
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}
		Schema::new(vec![], optional).validate(config)
	}
}

/// Factory function to create a file storage backend.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/storage")
/// - `ttl_<namespace>`: default TTL in seconds per namespace (default: none);
///   rejected for `orders` and `settlements`
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn storage(dir: &TempDir) -> FileStorage {
		FileStorage::new(dir.path().to_path_buf(), TtlConfig::default())
	}

	#[tokio::test]
	async fn test_set_get_delete() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage
			.set_bytes("orders:1", b"{\"id\":1}".to_vec(), None)
			.await
			.unwrap();
		assert_eq!(
			storage.get_bytes("orders:1").await.unwrap(),
			b"{\"id\":1}".to_vec()
		);
		assert!(dir.path().join("orders_1.bin").exists());

		storage.delete("orders:1").await.unwrap();
		assert!(matches!(
			storage.get_bytes("orders:1").await,
			Err(StorageError::NotFound)
		));
		// Deleting twice is fine
		storage.delete("orders:1").await.unwrap();
	}

	#[tokio::test]
	async fn test_compare_and_swap_persists_across_instances() {
		let dir = TempDir::new().unwrap();
		let first = storage(&dir);
		assert!(first
			.compare_and_swap("settlements:5", None, b"v1".to_vec(), None)
			.await
			.unwrap());

		let second = storage(&dir);
		assert!(!second
			.compare_and_swap("settlements:5", None, b"x".to_vec(), None)
			.await
			.unwrap());
		assert!(second
			.compare_and_swap("settlements:5", Some(b"v1"), b"v2".to_vec(), None)
			.await
			.unwrap());
		assert_eq!(
			first.get_bytes("settlements:5").await.unwrap(),
			b"v2".to_vec()
		);
	}

	#[tokio::test]
	async fn test_expired_entries_hidden_and_cleaned() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);
		let path = storage.get_file_path("recovery_tokens:1");

		let mut data = FileHeader {
			expires_at: current_timestamp() - 10,
		}
		.serialize()
		.to_vec();
		data.extend_from_slice(b"stale");
		std::fs::write(&path, data).unwrap();
		storage
			.set_bytes("recovery_tokens:2", b"live".to_vec(), None)
			.await
			.unwrap();

		assert!(!storage.exists("recovery_tokens:1").await.unwrap());
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(!path.exists());
		assert!(storage.exists("recovery_tokens:2").await.unwrap());
	}

	#[test]
	fn test_ttl_config_by_namespace() {
		let config: toml::Value = toml::from_str("ttl_recovery_tokens = 600").unwrap();
		let ttl = TtlConfig::from_config(&config);
		assert_eq!(ttl.get_ttl("recovery_tokens:9"), Duration::from_secs(600));
		assert_eq!(ttl.get_ttl("orders:9"), Duration::ZERO);
	}

	#[test]
	fn test_schema_rejects_ttl_on_durable_namespaces() {
		for key in ["ttl_orders", "ttl_settlements"] {
			let config: toml::Value = toml::from_str(&format!("{} = 3600", key)).unwrap();
			let err = create_storage(&config).err().unwrap();
			assert!(matches!(err, StorageError::Configuration(m) if m.contains(key)));
		}
		let config: toml::Value = toml::from_str("ttl_counters = 3600").unwrap();
		assert!(create_storage(&config).is_ok());
	}

	#[test]
	fn test_schema_rejects_negative_ttl() {
		let config: toml::Value = toml::from_str("ttl_recovery_tokens = -1").unwrap();
		assert!(create_storage(&config).is_err());
	}
}
