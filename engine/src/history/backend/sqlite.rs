//! SQLite backend
//!
//! One row per record in `history_records`. All queries are parameterized.

use async_trait::async_trait;
use sdk::errors::StorageError;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use super::RecordBackend;
use crate::history::record::{validate_id, RecordId, StoredRecord};

/// Backend storing history records in SQLite
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Create a new SQLite backend on an already migrated pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Raw payload bytes; rows imported with a non-TEXT payload come back as
/// whatever bytes they hold so the codec can reject them
fn payload_bytes(row: &SqliteRow) -> Vec<u8> {
    if let Ok(text) = row.try_get::<String, _>("payload") {
        return text.into_bytes();
    }
    row.try_get::<Vec<u8>, _>("payload").unwrap_or_default()
}

fn db_error(action: &str, e: sqlx::Error) -> StorageError {
    StorageError::Database(format!("failed to {}: {}", action, e))
}

#[async_trait]
impl RecordBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn list(&self, user_id: &str) -> Result<Vec<StoredRecord>, StorageError> {
        validate_id(user_id)?;

        let rows = sqlx::query(
            "SELECT record_id, created_at, payload FROM history_records WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list history records", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record_id = match row
                .try_get::<String, _>("record_id")
                .map_err(|e| StorageError::InvalidId(e.to_string()))
                .and_then(RecordId::new)
            {
                Ok(id) => id,
                Err(e) => {
                    warn!("Ignoring history row for user {}: {}", user_id, e);
                    continue;
                }
            };

            let created_at = row.try_get::<i64, _>("created_at").unwrap_or_else(|e| {
                warn!(
                    "History row {} for user {} has an unreadable created_at: {}",
                    record_id, user_id, e
                );
                0
            });

            records.push(StoredRecord::new(record_id, created_at, payload_bytes(&row)));
        }

        Ok(records)
    }

    async fn insert(&self, user_id: &str, record: &StoredRecord) -> Result<bool, StorageError> {
        validate_id(user_id)?;
        let payload = std::str::from_utf8(&record.bytes)
            .map_err(|e| StorageError::Encode(format!("record is not UTF-8: {}", e)))?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO history_records (user_id, record_id, created_at, payload) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(record.record_id.as_str())
        .bind(record.created_at)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Write(format!("failed to insert history record: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, user_id: &str, record_id: &RecordId) -> Result<(), StorageError> {
        validate_id(user_id)?;

        sqlx::query("DELETE FROM history_records WHERE user_id = ? AND record_id = ?")
            .bind(user_id)
            .bind(record_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Delete(format!("failed to delete history record: {}", e)))?;

        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<usize, StorageError> {
        validate_id(user_id)?;

        let result = sqlx::query("DELETE FROM history_records WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Delete(format!("failed to clear history: {}", e)))?;

        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::history::HistoryStore;
    use sdk::{Turn, TurnPayload};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(id: &str, created_at: i64) -> StoredRecord {
        StoredRecord::new(RecordId::new(id).unwrap(), created_at, br#"{"user":"x"}"#.to_vec())
    }

    #[tokio::test]
    async fn test_insert_list_delete() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("h.db")).await.unwrap();
        let backend = db.history_backend();

        assert!(backend.insert("u1", &record("1", 100)).await.unwrap());
        assert!(backend.insert("u1", &record("2", 200)).await.unwrap());
        assert!(!backend.insert("u1", &record("2", 300)).await.unwrap());
        assert!(backend.insert("u2", &record("1", 100)).await.unwrap());

        let listed = backend.list("u1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|r| r.created_at == 200));

        backend.delete("u1", &RecordId::new("1").unwrap()).await.unwrap();
        assert_eq!(backend.list("u1").await.unwrap().len(), 1);
        assert_eq!(backend.list("u2").await.unwrap().len(), 1);

        assert_eq!(backend.delete_all("u1").await.unwrap(), 1);
        assert_eq!(backend.delete_all("u1").await.unwrap(), 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_legacy_rows_are_returned_verbatim() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("h.db")).await.unwrap();

        let legacy = r#"{"role": "conversation", "content": {"user_message": "u", "assistant_response": "a"}}"#;
        sqlx::query(
            "INSERT INTO history_records (user_id, record_id, created_at, payload) VALUES (?, ?, ?, ?)",
        )
        .bind("u1")
        .bind("77")
        .bind(5i64)
        .bind(legacy)
        .execute(db.pool())
        .await
        .unwrap();

        let listed = db.history_backend().list("u1").await.unwrap();
        assert_eq!(listed[0].bytes, legacy.as_bytes());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_blob_payload_is_skipped_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("h.db")).await.unwrap();

        sqlx::query(
            "INSERT INTO history_records (user_id, record_id, created_at, payload) VALUES ('u', '1', 1, X'FFFE')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let store = HistoryStore::new(Arc::new(db.history_backend()), 4000);
        let outcome = store
            .append_with_id("u", "2", TurnPayload::single("user", "hi"))
            .await
            .unwrap();
        assert!(outcome.inserted);

        let report = store.read_report("u").await.unwrap();
        assert_eq!(report.turns, vec![Turn::user("hi")]);
        assert_eq!(report.skipped, vec!["1".to_string()]);
        assert_eq!(store.metrics().decode_failures, 1);

        let listed = db.history_backend().list("u").await.unwrap();
        let blob = listed.iter().find(|r| r.record_id.as_str() == "1").unwrap();
        assert_eq!(blob.bytes, vec![0xFF, 0xFE]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_blob_payload_stays_evictable() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("h.db")).await.unwrap();

        sqlx::query(
            "INSERT INTO history_records (user_id, record_id, created_at, payload) VALUES ('u', '1', 1, X'FFFE')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let store = HistoryStore::new(Arc::new(db.history_backend()), 5);
        store
            .append_with_id("u", "2", TurnPayload::pair("abc", "de"))
            .await
            .unwrap();
        let outcome = store
            .append_with_id("u", "3", TurnPayload::pair("fgh", "ij"))
            .await
            .unwrap();

        assert_eq!(outcome.evicted, 2);
        assert_eq!(store.read_report("u").await.unwrap().skipped, Vec::<String>::new());

        db.close().await.unwrap();
    }
}
