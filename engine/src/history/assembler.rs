//! History assembler
//!
//! Loads every record of a user, orders them oldest first and flattens them
//! into turns. Records that fail to decode are skipped, logged and counted;
//! the rest of the history is still returned.

use sdk::errors::StorageError;
use sdk::types::Turn;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::backend::RecordBackend;
use super::codec;
use super::metrics::HistoryMetrics;
use super::record::sort_oldest_first;

/// Result of assembling one user's history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Assembly {
    /// Turns in ascending `created_at` order
    pub turns: Vec<Turn>,

    /// Records present in storage that could not be decoded
    pub skipped: Vec<String>,
}

pub struct HistoryAssembler {
    backend: Arc<dyn RecordBackend>,
    metrics: Arc<HistoryMetrics>,
}

impl HistoryAssembler {
    pub fn new(backend: Arc<dyn RecordBackend>, metrics: Arc<HistoryMetrics>) -> Self {
        Self { backend, metrics }
    }

    pub async fn assemble(&self, user_id: &str) -> Result<Assembly, StorageError> {
        let mut records = self.backend.list(user_id).await?;
        sort_oldest_first(&mut records);

        let mut assembly = Assembly::default();
        for record in records {
            match codec::decode(&record.bytes) {
                Ok(decoded) => assembly.turns.extend(decoded.into_turns()),
                Err(e) => {
                    self.metrics.inc_decode_failure();
                    warn!(
                        user_id = %user_id,
                        record_id = %record.record_id,
                        "Skipping undecodable history record: {}",
                        e
                    );
                    assembly.skipped.push(record.record_id.to_string());
                }
            }
        }

        Ok(assembly)
    }
}
