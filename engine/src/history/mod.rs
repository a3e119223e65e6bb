//! Bounded conversation history
//!
//! Per-user conversation history that survives restarts, stays within a
//! character budget and still reads every record shape older versions of
//! the store ever wrote.
//!
//! - [`codec`]: the four record shapes, decode by structure, encode current
//! - [`record`]: record identity and the shared ordering
//! - [`backend`]: where records live (files, SQLite, memory)
//! - [`retention`]: oldest-first eviction down to the budget
//! - [`assembler`]: sorted, decoded, flattened reads
//! - [`store`]: the append / read / clear facade

pub mod assembler;
pub mod backend;
pub mod codec;
pub mod metrics;
pub mod record;
pub mod retention;
pub mod store;

pub use assembler::{Assembly, HistoryAssembler};
pub use backend::{FileBackend, MemoryBackend, RecordBackend, SqliteBackend};
pub use codec::{DecodedRecord, SchemaVariant};
pub use metrics::{HistoryMetrics, MetricsSnapshot};
pub use record::{RecordId, StoredRecord};
pub use retention::RetentionEnforcer;
pub use store::{AppendOutcome, HistoryStats, HistoryStore, DEFAULT_BUDGET};
