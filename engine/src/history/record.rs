//! Persisted record identity
//!
//! A record is addressed by `(user_id, record_id)` and ordered by
//! `(created_at, record_id)`. Both the assembler and the retention enforcer
//! sort with [`StoredRecord::order_key`] so read order and eviction order
//! always agree.

use sdk::errors::StorageError;
use std::cmp::Ordering;
use std::fmt;

/// Longest user or record id accepted, in bytes
pub const MAX_ID_LEN: usize = 128;

/// Identifier of a record within one user's history
///
/// Ids are usually derived from an inbound message id, optionally suffixed
/// (`"1042"`, `"1042_reply"`). Ordering compares the leading decimal digits
/// numerically and the remainder lexicographically, so `"99" < "100" <
/// "100_reply"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

impl RecordId {
    /// Validate and wrap a record id
    pub fn new(id: impl Into<String>) -> Result<Self, StorageError> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self(id))
    }

    /// Fresh random id for appends that carry no source id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split_numeric(&self) -> (&str, &str) {
        let digits = self.0.bytes().take_while(u8::is_ascii_digit).count();
        self.0.split_at(digits)
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a_num, a_rest) = self.split_numeric();
        let (b_num, b_rest) = other.split_numeric();

        // Compare digit runs as numbers without parsing: strip leading
        // zeros, then shorter is smaller, then lexicographic.
        let a_trim = a_num.trim_start_matches('0');
        let b_trim = b_num.trim_start_matches('0');
        a_num
            .is_empty()
            .cmp(&b_num.is_empty())
            .then_with(|| a_trim.len().cmp(&b_trim.len()))
            .then_with(|| a_trim.cmp(b_trim))
            .then_with(|| a_rest.cmp(b_rest))
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check that an id is safe to use as a path component or row key
pub fn validate_id(id: &str) -> Result<(), StorageError> {
    let bad = id.is_empty()
        || id.len() > MAX_ID_LEN
        || id.starts_with('.')
        || id.contains(['/', '\\', '\0']);
    if bad {
        return Err(StorageError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// A record as it sits in storage: identity, ordering timestamp, raw bytes
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub record_id: RecordId,

    /// Microseconds since the Unix epoch; used only for ordering
    pub created_at: i64,

    pub bytes: Vec<u8>,
}

impl StoredRecord {
    pub fn new(record_id: RecordId, created_at: i64, bytes: Vec<u8>) -> Self {
        Self {
            record_id,
            created_at,
            bytes,
        }
    }

    /// Sort key shared by reads and eviction
    pub fn order_key(&self) -> (i64, &RecordId) {
        (self.created_at, &self.record_id)
    }
}

/// Sort records oldest first, ties broken by record id ascending
pub fn sort_oldest_first(records: &mut [StoredRecord]) {
    records.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
}
