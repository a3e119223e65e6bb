//! Retention enforcer
//!
//! Keeps a user's total content length within the budget by deleting whole
//! records, oldest first. The newest record is never evicted, even when it
//! alone exceeds the budget.
//!
//! The enforcer reads, sums and deletes without any locking of its own; the
//! caller must hold the user's write lock for the whole call.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::backend::RecordBackend;
use super::codec;
use super::metrics::HistoryMetrics;
use super::record::{sort_oldest_first, StoredRecord};
use sdk::errors::StorageError;

pub struct RetentionEnforcer {
    backend: Arc<dyn RecordBackend>,
    metrics: Arc<HistoryMetrics>,
}

/// Content length of one stored record; undecodable records count as zero
pub fn record_len(record: &StoredRecord) -> usize {
    codec::decode(&record.bytes)
        .map(|decoded| decoded.content_len())
        .unwrap_or(0)
}

impl RetentionEnforcer {
    pub fn new(backend: Arc<dyn RecordBackend>, metrics: Arc<HistoryMetrics>) -> Self {
        Self { backend, metrics }
    }

    /// Evict oldest records of `user_id` until the total fits `budget`
    ///
    /// Returns the number of records deleted. A record that cannot be
    /// deleted is logged and skipped; eviction continues with the next
    /// oldest. Only a failure to list the records is returned as an error.
    pub async fn enforce(&self, user_id: &str, budget: usize) -> Result<usize, StorageError> {
        let mut records = self.backend.list(user_id).await?;
        sort_oldest_first(&mut records);

        let lengths: Vec<usize> = records.iter().map(record_len).collect();
        let mut total: usize = lengths.iter().sum();
        if total <= budget {
            return Ok(0);
        }

        debug!(
            "History for user {} is {} chars over budget {}",
            user_id,
            total - budget,
            budget
        );

        let mut remaining = records.len();
        let mut evicted = 0;

        // The newest record is not a candidate.
        let candidates = records.len().saturating_sub(1);
        for (record, len) in records.iter().zip(lengths).take(candidates) {
            if total <= budget || remaining <= 1 {
                break;
            }

            match self.backend.delete(user_id, &record.record_id).await {
                Ok(()) => {
                    total -= len;
                    remaining -= 1;
                    evicted += 1;
                    self.metrics.inc_evicted();
                    debug!(
                        "Evicted record {} ({} chars) for user {}",
                        record.record_id, len, user_id
                    );
                }
                Err(e) => {
                    self.metrics.inc_eviction_failure();
                    warn!(
                        "Could not evict record {} for user {}, trying next oldest: {}",
                        record.record_id, user_id, e
                    );
                }
            }
        }

        if evicted > 0 {
            info!(
                "Evicted {} record(s) for user {}; {} chars retained (budget {})",
                evicted, user_id, total, budget
            );
        }
        if total > budget {
            debug!(
                "History for user {} still over budget ({} > {}) after eviction",
                user_id, total, budget
            );
        }

        Ok(evicted)
    }
}
