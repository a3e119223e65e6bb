//! History store facade
//!
//! The public API of the conversation history: append, read, clear. Every
//! append persists one immutable record and then prunes the user's history
//! back within budget. Reads go straight to storage every time; nothing is
//! cached in process.
//!
//! Appends and clears for one user are serialized through a per-user async
//! mutex held across persist and prune. Different users never share a lock.

use sdk::errors::StorageError;
use sdk::types::{Turn, TurnPayload};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::assembler::{Assembly, HistoryAssembler};
use super::backend::RecordBackend;
use super::codec;
use super::metrics::{HistoryMetrics, MetricsSnapshot};
use super::record::{validate_id, RecordId, StoredRecord};
use super::retention::{record_len, RetentionEnforcer};

/// Default history budget in characters
pub const DEFAULT_BUDGET: usize = 4000;

/// Per-user write state, guarded by the user's mutex
#[derive(Debug, Default)]
struct UserState {
    /// Newest `created_at` handed out or seen in storage
    last_created_at: Option<i64>,
}

/// What an append did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    pub record_id: String,

    /// False when a record with this id already existed
    pub inserted: bool,

    /// Records evicted by the retention pass that followed
    pub evicted: usize,
}

/// Size summary of one user's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub records: usize,
    pub content_len: usize,
    pub budget: usize,
}

/// Bounded, persistent per-user conversation history
pub struct HistoryStore {
    backend: Arc<dyn RecordBackend>,
    budget: usize,
    enforcer: RetentionEnforcer,
    assembler: HistoryAssembler,
    metrics: Arc<HistoryMetrics>,
    users: StdMutex<HashMap<String, Arc<Mutex<UserState>>>>,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("backend", &self.backend.name())
            .field("budget", &self.budget)
            .finish()
    }
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or_default()
}

impl HistoryStore {
    /// Create a store over `backend` keeping at most `budget` characters per user
    pub fn new(backend: Arc<dyn RecordBackend>, budget: usize) -> Self {
        let metrics = Arc::new(HistoryMetrics::new());
        Self {
            enforcer: RetentionEnforcer::new(Arc::clone(&backend), Arc::clone(&metrics)),
            assembler: HistoryAssembler::new(Arc::clone(&backend), Arc::clone(&metrics)),
            backend,
            budget,
            metrics,
            users: StdMutex::new(HashMap::new()),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Emit the store counters as one log event
    pub fn flush_metrics(&self) {
        self.metrics.flush();
    }

    /// Drop the user's registry entry once nobody else holds or awaits it
    ///
    /// The clock is re-seeded from storage on the next append; the newest
    /// record is never evicted, so storage still holds the last stamp.
    fn release_user(&self, user_id: &str, lock: Arc<Mutex<UserState>>) {
        let mut users = self
            .users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // one reference in the map, one in `lock`
        if users
            .get(user_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(entry) == 2)
        {
            users.remove(user_id);
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<UserState>> {
        let mut users = self
            .users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(users.entry(user_id.to_string()).or_default())
    }

    /// Append a turn or pair under a freshly generated record id
    pub async fn append(
        &self,
        user_id: &str,
        payload: TurnPayload,
    ) -> Result<AppendOutcome, StorageError> {
        self.append_record(user_id, RecordId::generate(), payload)
            .await
    }

    /// Append under a caller-chosen record id, usually derived from a message id
    ///
    /// Appending an id that already exists leaves the stored record untouched
    /// and still succeeds.
    pub async fn append_with_id(
        &self,
        user_id: &str,
        record_id: &str,
        payload: TurnPayload,
    ) -> Result<AppendOutcome, StorageError> {
        let record_id = RecordId::new(record_id)?;
        self.append_record(user_id, record_id, payload).await
    }

    async fn append_record(
        &self,
        user_id: &str,
        record_id: RecordId,
        payload: TurnPayload,
    ) -> Result<AppendOutcome, StorageError> {
        validate_id(user_id)?;
        let bytes = codec::encode(&payload)?;

        let lock = self.user_lock(user_id);
        let result = {
            let mut state = lock.lock().await;
            self.append_locked(user_id, &mut state, record_id, bytes, &payload)
                .await
        };
        self.release_user(user_id, lock);
        result
    }

    async fn append_locked(
        &self,
        user_id: &str,
        state: &mut UserState,
        record_id: RecordId,
        bytes: Vec<u8>,
        payload: &TurnPayload,
    ) -> Result<AppendOutcome, StorageError> {
        if state.last_created_at.is_none() {
            let existing = self.backend.list(user_id).await?;
            state.last_created_at = existing.iter().map(|r| r.created_at).max();
        }
        let created_at = match state.last_created_at {
            Some(last) => now_micros().max(last + 1),
            None => now_micros(),
        };

        let record = StoredRecord::new(record_id, created_at, bytes);
        let inserted = self.backend.insert(user_id, &record).await?;
        if inserted {
            state.last_created_at = Some(created_at);
            self.metrics.inc_appended();
            debug!(
                "Appended record {} ({} chars) for user {}",
                record.record_id,
                payload.content_len(),
                user_id
            );
        } else {
            self.metrics.inc_duplicate();
            debug!(
                "Record {} already stored for user {}, keeping the original",
                record.record_id, user_id
            );
        }

        // The record is durable at this point; pruning problems are not the
        // caller's to handle.
        let evicted = match self.enforcer.enforce(user_id, self.budget).await {
            Ok(evicted) => evicted,
            Err(e) => {
                warn!("Retention pass failed for user {}: {}", user_id, e);
                0
            }
        };

        Ok(AppendOutcome {
            record_id: record.record_id.to_string(),
            inserted,
            evicted,
        })
    }

    /// All turns of the user, oldest first
    pub async fn read(&self, user_id: &str) -> Result<Vec<Turn>, StorageError> {
        Ok(self.read_report(user_id).await?.turns)
    }

    /// Turns plus the ids of records skipped as undecodable
    pub async fn read_report(&self, user_id: &str) -> Result<Assembly, StorageError> {
        validate_id(user_id)?;
        self.assembler.assemble(user_id).await
    }

    /// Delete every record of the user
    ///
    /// Clearing a user without history succeeds. Returns how many records
    /// were removed.
    pub async fn clear(&self, user_id: &str) -> Result<usize, StorageError> {
        validate_id(user_id)?;

        let lock = self.user_lock(user_id);
        let result = {
            let _state = lock.lock().await;
            self.backend.delete_all(user_id).await
        };
        self.release_user(user_id, lock);

        let removed = result?;
        info!("Cleared {} history record(s) for user {}", removed, user_id);
        Ok(removed)
    }

    /// Record count and total content length for the user
    pub async fn stats(&self, user_id: &str) -> Result<HistoryStats, StorageError> {
        validate_id(user_id)?;
        let records = self.backend.list(user_id).await?;
        Ok(HistoryStats {
            records: records.len(),
            content_len: records.iter().map(record_len).sum(),
            budget: self.budget,
        })
    }
}
