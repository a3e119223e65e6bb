//! In-memory backend
//!
//! Keeps records in a `HashMap<user_id, Vec<StoredRecord>>`. Used by tests
//! and by embedders that want a throwaway history. Enumeration returns
//! records newest-first on purpose so callers cannot lean on insertion
//! order. Individual record ids can be marked undeletable to exercise the
//! retention enforcer's failure path.

use async_trait::async_trait;
use sdk::errors::StorageError;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::RecordBackend;
use crate::history::record::{RecordId, StoredRecord};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, Vec<StoredRecord>>>,
    undeletable: Mutex<HashSet<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delete of `record_id` fail with [`StorageError::Delete`]
    pub fn fail_deletes_of(&self, record_id: &str) {
        lock(&self.undeletable).insert(record_id.to_string());
    }

    /// Number of users that currently have at least one record
    pub fn user_count(&self) -> usize {
        lock(&self.records).values().filter(|r| !r.is_empty()).count()
    }

    fn check_deletable(&self, record_id: &RecordId) -> Result<(), StorageError> {
        if lock(&self.undeletable).contains(record_id.as_str()) {
            return Err(StorageError::Delete(format!(
                "record {} is locked",
                record_id
            )));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RecordBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self, user_id: &str) -> Result<Vec<StoredRecord>, StorageError> {
        let records = lock(&self.records);
        let mut listed = records.get(user_id).cloned().unwrap_or_default();
        listed.reverse();
        Ok(listed)
    }

    async fn insert(&self, user_id: &str, record: &StoredRecord) -> Result<bool, StorageError> {
        let mut records = lock(&self.records);
        let user_records = records.entry(user_id.to_string()).or_default();
        if user_records
            .iter()
            .any(|r| r.record_id == record.record_id)
        {
            return Ok(false);
        }
        user_records.push(record.clone());
        Ok(true)
    }

    async fn delete(&self, user_id: &str, record_id: &RecordId) -> Result<(), StorageError> {
        self.check_deletable(record_id)?;
        if let Some(user_records) = lock(&self.records).get_mut(user_id) {
            user_records.retain(|r| &r.record_id != record_id);
        }
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<usize, StorageError> {
        let mut records = lock(&self.records);
        let Some(user_records) = records.get(user_id) else {
            return Ok(0);
        };
        for record in user_records {
            self.check_deletable(&record.record_id)?;
        }
        Ok(records.remove(user_id).map(|r| r.len()).unwrap_or(0))
    }
}
