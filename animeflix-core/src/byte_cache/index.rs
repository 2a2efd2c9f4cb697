use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use animeflix_model::{CacheEntry, CacheKey};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::persist::SnapshotFile;

pub(crate) const INDEX_FILE: &str = "cache-index.json";
const INDEX_VERSION: u32 = 1;

#[derive(Deserialize)]
struct IndexFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

/// Cache entries keyed by [`CacheKey`], with the running byte total.
///
/// `current_size` is only changed by `insert`, `remove` and `clear`, so it
/// always equals the sum of the indexed entry sizes.
#[derive(Debug)]
pub(crate) struct CacheIndex {
    file: SnapshotFile,
    entries: HashMap<CacheKey, CacheEntry>,
    current_size: u64,
    next_seq: u64,
}

impl CacheIndex {
    fn empty(path: PathBuf) -> Self {
        Self {
            file: SnapshotFile::new(path),
            entries: HashMap::new(),
            current_size: 0,
            next_seq: 0,
        }
    }

    pub(crate) async fn load(path: PathBuf) -> Result<Self> {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(e.into()),
        };

        let entries = match parse_index(&path, &bytes) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "byte cache index unreadable; starting empty");
                Vec::new()
            }
        };

        let mut index = Self::empty(path);
        for entry in entries {
            index.next_seq = index.next_seq.max(entry.seq.saturating_add(1));
            index.insert(entry);
        }
        Ok(index)
    }

    pub(crate) fn path(&self) -> &Path {
        self.file.path()
    }

    pub(crate) fn snapshot_file(&self) -> &SnapshotFile {
        &self.file
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn current_size(&self) -> u64 {
        self.current_size
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub(crate) fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &CacheKey) -> Option<&mut CacheEntry> {
        self.entries.get_mut(key)
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Insert or replace an entry. Returns the replaced one, if any.
    pub(crate) fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        self.current_size = self.current_size.saturating_add(entry.size_bytes);
        let replaced = self.entries.insert(entry.key.clone(), entry);
        if let Some(old) = &replaced {
            self.current_size = self.current_size.saturating_sub(old.size_bytes);
        }
        replaced
    }

    pub(crate) fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.current_size = self.current_size.saturating_sub(removed.size_bytes);
        Some(removed)
    }

    pub(crate) fn clear(&mut self) -> Vec<CacheEntry> {
        self.current_size = 0;
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub(crate) fn referenced_files(&self) -> HashSet<&str> {
        self.entries.values().map(|e| e.file_name.as_str()).collect()
    }

    pub(crate) fn snapshot(&self) -> Result<Vec<u8>> {
        let mut entries: Vec<&CacheEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        #[derive(Serialize)]
        struct IndexFileRef<'a> {
            version: u32,
            entries: Vec<&'a CacheEntry>,
        }
        Ok(serde_json::to_vec_pretty(&IndexFileRef {
            version: INDEX_VERSION,
            entries,
        })?)
    }
}

fn parse_index(path: &Path, bytes: &[u8]) -> Result<Vec<CacheEntry>> {
    let file: IndexFile =
        serde_json::from_slice(bytes).map_err(|e| StoreError::CorruptIndex {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    if file.version != INDEX_VERSION {
        return Err(StoreError::CorruptIndex {
            path: path.display().to_string(),
            reason: format!("unsupported version {}", file.version),
        });
    }
    Ok(file.entries)
}
