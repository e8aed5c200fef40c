//! Tabular Data Store: in-memory source of truth for uploaded files.
//!
//! Uploads are parsed and hashed outside the lock, then committed atomically —
//! readers never observe a partially populated file. Reads hand out an `Arc`
//! snapshot, so a concurrent delete unlinks the id without tearing data down
//! under an in-flight query.

pub mod ingest;
pub mod sheet;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use sheet::Sheet;

/// Metadata for one uploaded file. `content_hash` is a pure function of the
/// file bytes — identical bytes hash identically regardless of filename.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub id: String,
    pub filename: String,
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
    /// Monotonic upload sequence — tie-breaker when timestamps collide.
    pub seq: u64,
    pub sheet_names: Vec<String>,
    pub row_count: usize,
}

/// A committed file: record plus parsed sheets. Owned by the store; external
/// code only ever refers to it by `FileRecord::id`.
#[derive(Debug)]
pub struct StoredFile {
    pub record: FileRecord,
    pub sheets: Vec<Sheet>,
}

impl StoredFile {
    /// Resolve a sheet by name, defaulting to the first sheet.
    pub fn sheet(&self, name: Option<&str>) -> Option<&Sheet> {
        match name {
            Some(n) => self.sheets.iter().find(|s| s.name == n),
            None => self.sheets.first(),
        }
    }
}

#[derive(Default)]
pub struct FileStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    files: HashMap<String, Arc<StoredFile>>,
    /// Upload order, for stable listings.
    order: Vec<String>,
    next_seq: u64,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_hash(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Parse and commit an upload. Parsing happens before the write lock is
    /// taken; the insert itself is a single atomic map update.
    pub fn upload(&self, bytes: &[u8], filename: &str) -> anyhow::Result<FileRecord> {
        let sheets = ingest::parse_upload(bytes, filename)?;
        let content_hash = Self::content_hash(bytes);
        let row_count = sheets.iter().map(|s| s.rows.len()).sum();
        let sheet_names = sheets.iter().map(|s| s.name.clone()).collect();

        let mut inner = self.inner.write();
        let record = FileRecord {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            content_hash,
            uploaded_at: Utc::now(),
            seq: inner.next_seq,
            sheet_names,
            row_count,
        };
        inner.next_seq += 1;
        inner.order.push(record.id.clone());
        inner.files.insert(
            record.id.clone(),
            Arc::new(StoredFile {
                record: record.clone(),
                sheets,
            }),
        );
        info!(
            file_id = %record.id,
            filename,
            rows = record.row_count,
            hash = %&record.content_hash[..12],
            "File committed to store"
        );
        Ok(record)
    }

    /// Snapshot of a stored file. The returned `Arc` stays valid even if the
    /// file is deleted while the caller is still reading.
    pub fn get(&self, file_id: &str) -> Option<Arc<StoredFile>> {
        self.inner.read().files.get(file_id).cloned()
    }

    /// Record metadata for one file, without the sheet data.
    pub fn record(&self, file_id: &str) -> Option<FileRecord> {
        self.inner.read().files.get(file_id).map(|f| f.record.clone())
    }

    /// All file records in upload order.
    pub fn list(&self) -> Vec<FileRecord> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.files.get(id).map(|f| f.record.clone()))
            .collect()
    }

    /// Unlink a file. Returns the removed record, or None if the id is unknown.
    pub fn delete(&self, file_id: &str) -> Option<FileRecord> {
        let mut inner = self.inner.write();
        let removed = inner.files.remove(file_id)?;
        inner.order.retain(|id| id != file_id);
        info!(file_id, filename = %removed.record.filename, "File deleted");
        Some(removed.record.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
