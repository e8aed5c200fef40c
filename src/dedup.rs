//! Deduplication engine: groups uploads by content hash and removes all but
//! one file per group under a keep policy. Filename is irrelevant — only the
//! byte-level hash matters.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::{FileRecord, FileStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepPolicy {
    Newest,
    Oldest,
}

impl std::str::FromStr for KeepPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(KeepPolicy::Newest),
            "oldest" => Ok(KeepPolicy::Oldest),
            other => anyhow::bail!("Unknown keep policy '{}' (expected newest|oldest)", other),
        }
    }
}

/// Files sharing one content hash. `files` is ordered by upload sequence.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub content_hash: String,
    pub files: Vec<FileRecord>,
}

impl DuplicateGroup {
    /// The member that survives deduplication under `policy`. Timestamp ties
    /// fall back to the upload sequence number.
    pub fn survivor(&self, policy: KeepPolicy) -> &FileRecord {
        let newest = |a: &&FileRecord, b: &&FileRecord| {
            (a.uploaded_at, a.seq).cmp(&(b.uploaded_at, b.seq))
        };
        match policy {
            KeepPolicy::Newest => self.files.iter().max_by(newest),
            KeepPolicy::Oldest => self.files.iter().min_by(newest),
        }
        .expect("duplicate group is never empty")
    }
}

pub struct DedupEngine {
    store: Arc<FileStore>,
}

impl DedupEngine {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }

    /// Groups with at least two members, ordered by first upload within each
    /// group. Groups themselves are ordered by their earliest member.
    pub fn find_duplicates(&self) -> Vec<DuplicateGroup> {
        let mut by_hash: HashMap<String, Vec<FileRecord>> = HashMap::new();
        let mut hash_order: Vec<String> = Vec::new();

        for record in self.store.list() {
            let entry = by_hash.entry(record.content_hash.clone()).or_default();
            if entry.is_empty() {
                hash_order.push(record.content_hash.clone());
            }
            entry.push(record);
        }

        hash_order
            .into_iter()
            .filter_map(|hash| {
                let files = by_hash.remove(&hash)?;
                (files.len() >= 2).then_some(DuplicateGroup {
                    content_hash: hash,
                    files,
                })
            })
            .collect()
    }

    /// Delete all duplicates, keeping one file per group under `policy`.
    /// Returns the deleted file ids. Idempotent: a second run with no new
    /// uploads deletes nothing.
    pub fn deduplicate(&self, policy: KeepPolicy) -> Vec<String> {
        let mut deleted = Vec::new();
        for group in self.find_duplicates() {
            let keep_id = group.survivor(policy).id.clone();
            for file in &group.files {
                if file.id != keep_id && self.store.delete(&file.id).is_some() {
                    deleted.push(file.id.clone());
                }
            }
            info!(
                hash = %&group.content_hash[..12],
                kept = %keep_id,
                removed = group.files.len() - 1,
                "Deduplicated group"
            );
        }
        deleted
    }
}
