//! Durable checkpoint storage for the sync engine.
//!
//! The checkpoint is a single key in a small key-value store: the last block
//! whose events have been fully dispatched. It is read once at startup and
//! written after every batch that made progress. The engine is the only
//! writer, so no locking beyond the store's own is required.

use crate::ledger::BlockHeight;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Logical key under which the engine's checkpoint is stored.
pub const LAST_BLOCK_KEY: &str = "last_processed_block";

/// Errors from the underlying checkpoint store.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
	#[error("checkpoint io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("checkpoint serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Capability for reading and writing checkpoint values.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
	/// Read the stored value for `key`. Returns `Ok(None)` when the key was
	/// never set or its stored value does not parse as a block height; the
	/// caller applies its configured fallback in both cases.
	async fn get(&self, key: &str) -> Result<Option<BlockHeight>, PersistenceError>;

	/// Durably store `value` under `key`.
	async fn set(&self, key: &str, value: BlockHeight) -> Result<(), PersistenceError>;
}

/// File-backed implementation of [`CheckpointStore`].
///
/// Values are kept as strings in a single JSON object, the same shape the
/// application's dynamic-configuration table uses, so unrelated keys can
/// share the file.
pub struct FileCheckpointStore {
	path: PathBuf,
}

impl FileCheckpointStore {
	pub fn new(path: PathBuf) -> Self {
		Self { path }
	}

	async fn read_map(&self) -> Result<BTreeMap<String, String>, PersistenceError> {
		if !self.path.exists() {
			return Ok(BTreeMap::new());
		}
		let content = tokio::fs::read_to_string(&self.path).await?;
		Ok(serde_json::from_str(&content)?)
	}
}

#[async_trait::async_trait]
impl CheckpointStore for FileCheckpointStore {
	async fn get(&self, key: &str) -> Result<Option<BlockHeight>, PersistenceError> {
		let map = self.read_map().await?;
		let Some(raw) = map.get(key) else {
			return Ok(None);
		};

		match raw.parse::<BlockHeight>() {
			Ok(value) => Ok(Some(value)),
			Err(_) => {
				warn!(
					"Stored value '{}' for key '{}' is not a block height, ignoring it",
					raw, key
				);
				Ok(None)
			}
		}
	}

	async fn set(&self, key: &str, value: BlockHeight) -> Result<(), PersistenceError> {
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}

		let mut map = self.read_map().await.unwrap_or_default();
		map.insert(key.to_string(), value.to_string());

		let content = serde_json::to_string_pretty(&json!(map))?;
		tokio::fs::write(&self.path, content).await?;

		info!("Checkpoint saved: {} = {}", key, value);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn store_in(dir: &tempfile::TempDir) -> FileCheckpointStore {
		FileCheckpointStore::new(dir.path().join("checkpoints.json"))
	}

	#[tokio::test]
	async fn round_trips_a_checkpoint() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(&dir);

		assert_eq!(store.get(LAST_BLOCK_KEY).await.unwrap(), None);

		store.set(LAST_BLOCK_KEY, 8932497).await.unwrap();
		assert_eq!(store.get(LAST_BLOCK_KEY).await.unwrap(), Some(8932497));

		store.set(LAST_BLOCK_KEY, 8932500).await.unwrap();
		assert_eq!(store.get(LAST_BLOCK_KEY).await.unwrap(), Some(8932500));
	}

	#[tokio::test]
	async fn preserves_unrelated_keys() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(&dir);

		store.set("other_setting", 5).await.unwrap();
		store.set(LAST_BLOCK_KEY, 100).await.unwrap();

		assert_eq!(store.get("other_setting").await.unwrap(), Some(5));
		assert_eq!(store.get(LAST_BLOCK_KEY).await.unwrap(), Some(100));
	}

	#[tokio::test]
	async fn unparsable_value_reads_back_as_unset() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("checkpoints.json");
		tokio::fs::write(&path, r#"{"last_processed_block": "not-a-number"}"#)
			.await
			.unwrap();

		let store = FileCheckpointStore::new(path);
		assert_eq!(store.get(LAST_BLOCK_KEY).await.unwrap(), None);
	}

	#[tokio::test]
	async fn corrupt_file_is_a_persistence_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("checkpoints.json");
		tokio::fs::write(&path, "{not json").await.unwrap();

		let store = FileCheckpointStore::new(path);
		assert!(matches!(
			store.get(LAST_BLOCK_KEY).await,
			Err(PersistenceError::Serialization(_))
		));
	}
}
