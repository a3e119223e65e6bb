//! File-per-record backend
//!
//! Layout under the history root:
//!
//! ```text
//! <root>/<user_id>/00001718000000000000-1042.json        current naming
//! <root>/<user_id>/1042.json                             legacy naming
//! ```
//!
//! Current files carry `created_at` (microseconds since the epoch, zero
//! padded to 20 digits) in the name. Legacy files only carry the record id;
//! their `created_at` is the file modification time. Records are written to a
//! hidden temporary file and renamed into place, so readers never see a
//! partial record.

use async_trait::async_trait;
use sdk::errors::StorageError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

use super::RecordBackend;
use crate::history::record::{validate_id, RecordId, StoredRecord};

const RECORD_EXT: &str = "json";
const STAMP_DIGITS: usize = 20;

/// Backend storing one JSON file per record, one directory per user
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

/// A record file found on disk
struct RecordFile {
    path: PathBuf,
    record_id: String,
    stamp: Option<i64>,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user_id: &str) -> Result<PathBuf, StorageError> {
        validate_id(user_id)?;
        Ok(self.root.join(user_id))
    }

    /// Enumerate record files in a user directory; a missing directory is empty
    async fn scan(&self, dir: &Path) -> Result<Vec<RecordFile>, StorageError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::Read(format!(
                    "failed to list {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Read(format!("failed to list {}: {}", dir.display(), e)))?
        {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some((record_id, stamp)) = parse_file_name(name) {
                files.push(RecordFile {
                    record_id: record_id.to_string(),
                    stamp,
                    path,
                });
            }
        }
        Ok(files)
    }

    async fn find(&self, dir: &Path, record_id: &str) -> Result<Vec<RecordFile>, StorageError> {
        let files = self.scan(dir).await?;
        Ok(files
            .into_iter()
            .filter(|f| f.record_id == record_id)
            .collect())
    }
}

/// Split a file name into `(record_id, created_at)`
///
/// Hidden files (temporaries) and non-JSON entries are not records.
fn parse_file_name(name: &str) -> Option<(&str, Option<i64>)> {
    if name.starts_with('.') {
        return None;
    }
    let stem = name.strip_suffix(RECORD_EXT)?.strip_suffix('.')?;
    if stem.is_empty() {
        return None;
    }

    let bytes = stem.as_bytes();
    let stamped = bytes.len() > STAMP_DIGITS + 1
        && bytes[..STAMP_DIGITS].iter().all(u8::is_ascii_digit)
        && bytes[STAMP_DIGITS] == b'-';
    if stamped {
        let stamp = stem[..STAMP_DIGITS].parse::<i64>().ok()?;
        return Some((&stem[STAMP_DIGITS + 1..], Some(stamp)));
    }
    Some((stem, None))
}

fn file_name(record: &StoredRecord) -> String {
    format!(
        "{:0width$}-{}.{}",
        record.created_at.max(0),
        record.record_id,
        RECORD_EXT,
        width = STAMP_DIGITS
    )
}

async fn modified_micros(path: &Path) -> i64 {
    tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl RecordBackend for FileBackend {
    fn name(&self) -> &str {
        "files"
    }

    async fn list(&self, user_id: &str) -> Result<Vec<StoredRecord>, StorageError> {
        let dir = self.user_dir(user_id)?;
        let mut records = Vec::new();

        for file in self.scan(&dir).await? {
            let bytes = match tokio::fs::read(&file.path).await {
                Ok(bytes) => bytes,
                // Deleted between listing and reading
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(StorageError::Read(format!(
                        "failed to read {}: {}",
                        file.path.display(),
                        e
                    )))
                }
            };

            let record_id = match RecordId::new(file.record_id) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Ignoring history file {}: {}", file.path.display(), e);
                    continue;
                }
            };

            let created_at = match file.stamp {
                Some(stamp) => stamp,
                None => modified_micros(&file.path).await,
            };

            records.push(StoredRecord::new(record_id, created_at, bytes));
        }

        debug!("Listed {} history files for user {}", records.len(), user_id);
        Ok(records)
    }

    async fn insert(&self, user_id: &str, record: &StoredRecord) -> Result<bool, StorageError> {
        let dir = self.user_dir(user_id)?;
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::Write(format!("failed to create {}: {}", dir.display(), e))
        })?;

        if !self.find(&dir, record.record_id.as_str()).await?.is_empty() {
            return Ok(false);
        }

        let name = file_name(record);
        let final_path = dir.join(&name);
        let tmp_path = dir.join(format!(".{}.tmp", name));

        if let Err(e) = tokio::fs::write(&tmp_path, &record.bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StorageError::Write(format!(
                "failed to write {}: {}",
                tmp_path.display(),
                e
            )));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StorageError::Write(format!(
                "failed to move record into {}: {}",
                final_path.display(),
                e
            )));
        }

        Ok(true)
    }

    async fn delete(&self, user_id: &str, record_id: &RecordId) -> Result<(), StorageError> {
        let dir = self.user_dir(user_id)?;
        for file in self.find(&dir, record_id.as_str()).await? {
            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StorageError::Delete(format!(
                        "failed to remove {}: {}",
                        file.path.display(),
                        e
                    )))
                }
            }
        }
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<usize, StorageError> {
        let dir = self.user_dir(user_id)?;
        let mut removed = 0;

        for file in self.scan(&dir).await? {
            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StorageError::Delete(format!(
                        "failed to remove {}: {}",
                        file.path.display(),
                        e
                    )))
                }
            }
        }

        // Only succeeds once the directory is empty; stray non-record files
        // keep it alive, which is harmless.
        if let Err(e) = tokio::fs::remove_dir(&dir).await {
            if e.kind() != ErrorKind::NotFound {
                debug!("Keeping history directory {}: {}", dir.display(), e);
            }
        }

        Ok(removed)
    }
}
