use std::collections::HashMap;
use std::path::{Path, PathBuf};

use animeflix_model::{ContentHash, VideoId, VideoRecord};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::persist::SnapshotFile;

pub(crate) const INDEX_FILE: &str = "videos-index.json";
const INDEX_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    videos: Vec<VideoRecord>,
}

/// In-memory record table mirrored to `videos-index.json`.
///
/// Every mutation goes through the owning [`super::ContentStore`] while it
/// holds the index mutex, so `by_hash` always agrees with `records`.
#[derive(Debug)]
pub(crate) struct StoreIndex {
    file: SnapshotFile,
    records: HashMap<VideoId, VideoRecord>,
    by_hash: HashMap<ContentHash, VideoId>,
}

impl StoreIndex {
    pub(crate) fn empty(path: PathBuf) -> Self {
        Self {
            file: SnapshotFile::new(path),
            records: HashMap::new(),
            by_hash: HashMap::new(),
        }
    }

    /// Load the index, treating a missing file as empty and a corrupt one as
    /// empty with a warning.
    pub(crate) async fn load(path: PathBuf) -> Result<Self> {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(e.into()),
        };

        match parse_index(&path, &bytes) {
            Ok(records) => {
                let mut index = Self::empty(path);
                for record in records {
                    index.insert(record);
                }
                Ok(index)
            }
            Err(err) => {
                warn!(error = %err, "content store index unreadable; starting empty");
                Ok(Self::empty(path))
            }
        }
    }

    pub(crate) fn path(&self) -> &Path {
        self.file.path()
    }

    pub(crate) fn snapshot_file(&self) -> &SnapshotFile {
        &self.file
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn get(&self, id: &VideoId) -> Option<&VideoRecord> {
        self.records.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &VideoId) -> Option<&mut VideoRecord> {
        self.records.get_mut(id)
    }

    pub(crate) fn by_hash(&self, hash: &ContentHash) -> Option<&VideoRecord> {
        self.by_hash.get(hash).and_then(|id| self.records.get(id))
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &VideoRecord> {
        self.records.values()
    }

    pub(crate) fn total_size(&self) -> u64 {
        self.records.values().map(|r| r.size_bytes).sum()
    }

    pub(crate) fn insert(&mut self, record: VideoRecord) {
        self.by_hash.insert(record.content_hash.clone(), record.id);
        self.records.insert(record.id, record);
    }

    pub(crate) fn remove(&mut self, id: &VideoId) -> Option<VideoRecord> {
        let record = self.records.remove(id)?;
        if self.by_hash.get(&record.content_hash) == Some(id) {
            self.by_hash.remove(&record.content_hash);
        }
        Some(record)
    }

    /// Drop records whose backing file is gone. Returns the removed records.
    pub(crate) fn retain_existing(&mut self, root: &Path) -> Vec<VideoRecord> {
        let missing: Vec<VideoId> = self
            .records
            .values()
            .filter(|r| !root.join(&r.file_name).is_file())
            .map(|r| r.id)
            .collect();
        missing.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub(crate) fn snapshot(&self) -> Result<Vec<u8>> {
        let mut videos: Vec<VideoRecord> = self.records.values().cloned().collect();
        videos.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then(a.id.cmp(&b.id)));
        Ok(serde_json::to_vec_pretty(&IndexFile {
            version: INDEX_VERSION,
            videos,
        })?)
    }
}

fn parse_index(path: &Path, bytes: &[u8]) -> Result<Vec<VideoRecord>> {
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
    Ok(file.videos)
}
