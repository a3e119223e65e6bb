//! Persistence backends for history records
//!
//! A backend stores opaque record bytes addressed by `(user_id, record_id)`
//! together with a `created_at` ordering timestamp. It knows nothing about
//! record shapes, budgets or ordering policy; those live in the codec,
//! the retention enforcer and the assembler.

use async_trait::async_trait;
use sdk::errors::StorageError;

use super::record::{RecordId, StoredRecord};

pub mod fs;
pub mod memory;
pub mod sqlite;

pub use fs::FileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Storage seam for the history store
///
/// Implementations must support enumeration by user and deletion of single
/// records. Enumeration order is unspecified; callers sort.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// All records currently stored for `user_id`
    ///
    /// A user with no history yields an empty list, not an error.
    async fn list(&self, user_id: &str) -> Result<Vec<StoredRecord>, StorageError>;

    /// Persist a new record
    ///
    /// Returns `false` without touching storage when a record with the same
    /// id already exists for the user.
    async fn insert(&self, user_id: &str, record: &StoredRecord) -> Result<bool, StorageError>;

    /// Delete one record; deleting a record that is already gone succeeds
    async fn delete(&self, user_id: &str, record_id: &RecordId) -> Result<(), StorageError>;

    /// Delete every record of the user, returning how many were removed
    async fn delete_all(&self, user_id: &str) -> Result<usize, StorageError>;
}
