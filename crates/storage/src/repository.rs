use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marathon_core::model::{ProgressState, Stage, UserId};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Namespace prepended to every local progress key.
pub const PROGRESS_KEY_PREFIX: &str = "marathon-progress:";

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Key under which a user's progress is stored.
#[must_use]
pub fn progress_key(user: &UserId) -> String {
    format!("{PROGRESS_KEY_PREFIX}{user}")
}

/// Encodes completed stages as the persisted value: a bare JSON array.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if encoding fails.
pub fn encode_stages(state: &ProgressState) -> Result<String, StorageError> {
    serde_json::to_string(&state.stage_numbers())
        .map_err(|err| StorageError::Serialization(err.to_string()))
}

/// Decodes a persisted value.
///
/// Numbers outside the stage range are dropped rather than failing the read,
/// so data written under a different stage count still loads.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the value is not a JSON array of
/// non-negative integers.
pub fn decode_stages(raw: &str) -> Result<BTreeSet<Stage>, StorageError> {
    let numbers: Vec<u32> =
        serde_json::from_str(raw).map_err(|err| StorageError::Serialization(err.to_string()))?;
    let mut stages = BTreeSet::new();
    for number in numbers {
        match Stage::new(number) {
            Ok(stage) => {
                stages.insert(stage);
            }
            Err(err) => tracing::warn!(%err, "dropping persisted stage"),
        }
    }
    Ok(stages)
}

/// Local, durable progress store scoped by user.
///
/// Each call reads or replaces the full completed set, so implementations are
/// safe to share without extra locking.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read the completed stages for `user`.
    ///
    /// Returns `Ok(None)` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing medium cannot be read or the
    /// stored value is malformed.
    async fn read(&self, user: &UserId) -> Result<Option<BTreeSet<Stage>>, StorageError>;

    /// Replace the stored progress for `user`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing medium rejects the write.
    async fn write(&self, user: &UserId, state: &ProgressState) -> Result<(), StorageError>;
}

/// Simple in-memory store for tests and for sessions without a database.
///
/// Values are kept in their persisted string form so the codec is exercised
/// the same way as with `SQLite`.
#[derive(Clone, Default)]
pub struct InMemoryLocalStore {
    entries: Arc<Mutex<HashMap<String, StoredEntry>>>,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    updated_at: DateTime<Utc>,
}

impl InMemoryLocalStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Stores a raw value under `user`'s key, bypassing the codec.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn put_raw(&self, user: &UserId, value: impl Into<String>) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            progress_key(user),
            StoredEntry {
                value: value.into(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Returns the raw stored value, if any.
    #[must_use]
    pub fn raw(&self, user: &UserId) -> Option<String> {
        let guard = self.entries.lock().ok()?;
        guard.get(&progress_key(user)).map(|e| e.value.clone())
    }

    /// When `user`'s entry was last written.
    #[must_use]
    pub fn updated_at(&self, user: &UserId) -> Option<DateTime<Utc>> {
        let guard = self.entries.lock().ok()?;
        guard.get(&progress_key(user)).map(|e| e.updated_at)
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn read(&self, user: &UserId) -> Result<Option<BTreeSet<Stage>>, StorageError> {
        let raw = {
            let guard = self
                .entries
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            guard.get(&progress_key(user)).map(|e| e.value.clone())
        };
        raw.as_deref().map(decode_stages).transpose()
    }

    async fn write(&self, user: &UserId, state: &ProgressState) -> Result<(), StorageError> {
        let value = encode_stages(state)?;
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            progress_key(user),
            StoredEntry {
                value,
                updated_at: state.last_updated(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marathon_core::time::fixed_now;

    fn user(raw: &str) -> UserId {
        UserId::new(raw).unwrap()
    }

    fn state(numbers: &[u32]) -> ProgressState {
        ProgressState::from_stages(numbers.iter().map(|n| Stage::new(*n).unwrap()), fixed_now())
    }

    #[test]
    fn key_is_namespaced_by_user() {
        assert_eq!(progress_key(&user("42")), "marathon-progress:42");
    }

    #[test]
    fn value_is_a_bare_json_array() {
        assert_eq!(encode_stages(&state(&[7, 3, 12])).unwrap(), "[3,7,12]");
        assert_eq!(encode_stages(&state(&[])).unwrap(), "[]");
    }

    #[test]
    fn decode_drops_out_of_range_entries() {
        let decoded = decode_stages("[0, 3, 22, 7]").unwrap();
        let numbers: Vec<u32> = decoded.iter().map(|s| s.number()).collect();
        assert_eq!(numbers, vec![3, 7]);
    }

    #[test]
    fn decode_rejects_non_arrays() {
        assert!(matches!(
            decode_stages("{\"completedDays\": [1]}"),
            Err(StorageError::Serialization(_))
        ));
        assert!(matches!(
            decode_stages("[-1]"),
            Err(StorageError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_store_keeps_users_apart() {
        let store = InMemoryLocalStore::new();
        store.write(&user("a"), &state(&[1, 2])).await.unwrap();
        store.write(&user("b"), &state(&[9])).await.unwrap();

        let a = store.read(&user("a")).await.unwrap().unwrap();
        assert_eq!(a.len(), 2);
        let b = store.read(&user("b")).await.unwrap().unwrap();
        assert_eq!(b.iter().map(|s| s.number()).collect::<Vec<_>>(), vec![9]);
        assert!(store.read(&user("c")).await.unwrap().is_none());
        assert_eq!(store.raw(&user("a")).as_deref(), Some("[1,2]"));
        assert_eq!(store.updated_at(&user("a")), Some(fixed_now()));
    }

    #[tokio::test]
    async fn in_memory_store_surfaces_malformed_values() {
        let store = InMemoryLocalStore::new();
        store.put_raw(&user("a"), "not json").unwrap();
        assert!(matches!(
            store.read(&user("a")).await,
            Err(StorageError::Serialization(_))
        ));
    }
}
