use async_trait::async_trait;
use marathon_core::model::{ProgressState, Stage, UserId};
use sqlx::Row;
use std::collections::BTreeSet;

use crate::repository::{LocalStore, StorageError, decode_stages, encode_stages, progress_key};

use super::SqliteLocalStore;

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn read(&self, user: &UserId) -> Result<Option<BTreeSet<Stage>>, StorageError> {
        let row = sqlx::query("SELECT value FROM local_progress WHERE key = ?1")
            .bind(progress_key(user))
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let value: String = row
            .try_get("value")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        decode_stages(&value).map(Some)
    }

    async fn write(&self, user: &UserId, state: &ProgressState) -> Result<(), StorageError> {
        let value = encode_stages(state)?;
        sqlx::query(
            r"
            INSERT INTO local_progress (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(progress_key(user))
        .bind(value)
        .bind(state.last_updated())
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }
}
