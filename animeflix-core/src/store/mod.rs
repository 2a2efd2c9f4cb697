//! Canonical, content-addressed video storage.
//!
//! Bytes live as flat files under the store root, named
//! `{hash prefix}_{video id}{ext}`. Metadata lives in a JSON index next to
//! them. Hashing and staging happen outside the index lock; only the final
//! dedup check, rename and index write are serialized.

mod import;
mod index;

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use animeflix_model::{
    ByteRange, ContentHash, IngestReceipt, StorageStats, SweepReport, VideoId,
    VideoPage, VideoRecord,
};
use chrono::Utc;
use serde_json::Map;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, Take};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::hash::{sha256_bytes, sha256_file};
use crate::mime::{mime_for_path, sanitized_extension};
use crate::persist::is_snapshot_tmp;
use crate::range::{RangeSpec, resolve_range};
use index::{INDEX_FILE, StoreIndex};

const STAGING_PREFIX: &str = ".ingest-";
const STAGING_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct ContentStoreConfig {
    pub root: PathBuf,
    /// Upper bound on the sum of stored video sizes. `None` means unbounded.
    pub max_bytes: Option<u64>,
}

impl ContentStoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: None,
        }
    }
}

/// Where ingested bytes come from.
#[derive(Debug)]
pub enum IngestSource {
    Bytes(Vec<u8>),
    /// A file that is hashed in place and then copied into the store.
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub record: VideoRecord,
    /// The content was already stored; no bytes were written.
    pub deduplicated: bool,
}

impl IngestOutcome {
    pub fn receipt(&self) -> IngestReceipt {
        self.record.receipt(self.deduplicated)
    }
}

/// An opened byte range of a stored video.
///
/// `reader` yields exactly `range.len()` bytes. Dropping it closes the file.
#[derive(Debug)]
pub struct VideoStream {
    pub reader: Take<File>,
    pub range: ByteRange,
    pub total_size: u64,
    pub record: VideoRecord,
    pub modified: Option<SystemTime>,
}

impl VideoStream {
    pub fn is_partial(&self) -> bool {
        !self.range.is_full(self.total_size)
    }
}

#[derive(Debug)]
pub struct ContentStore {
    root: PathBuf,
    max_bytes: Option<u64>,
    index: Mutex<StoreIndex>,
}

impl ContentStore {
    pub async fn open(config: ContentStoreConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.root).await?;

        let mut index = StoreIndex::load(config.root.join(INDEX_FILE)).await?;
        let dropped = index.retain_existing(&config.root);
        for record in &dropped {
            warn!(
                video_id = %record.id,
                file = %record.file_name,
                "dropping video record whose file is missing"
            );
        }
        remove_staging_files(&config.root).await;
        if !dropped.is_empty() {
            persist(&index).await?;
        }

        info!(
            videos = index.len(),
            root = %config.root.display(),
            "content store opened"
        );

        Ok(Self {
            root: config.root,
            max_bytes: config.max_bytes,
            index: Mutex::new(index),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store content if no byte-identical video exists yet.
    ///
    /// Identical content always resolves to the existing record. On any
    /// failure after staging, the staged file and the record are both rolled
    /// back.
    pub async fn ingest(
        &self,
        source: IngestSource,
        original_name: &str,
        mime_type: &str,
    ) -> Result<IngestOutcome> {
        let (hash, size, source) = hash_source(source).await?;
        if size == 0 {
            return Err(StoreError::EmptyContent);
        }

        if let Some(existing) = self.lookup_by_hash(&hash).await {
            debug!(video_id = %existing.id, hash = %hash, "ingest deduplicated");
            return Ok(IngestOutcome {
                record: existing,
                deduplicated: true,
            });
        }
        {
            let index = self.index.lock().await;
            self.check_capacity(&index, size)?;
        }

        let staged = self.stage(&source, size).await?;

        let mut index = self.index.lock().await;
        if let Some(existing) = index.by_hash(&hash).cloned() {
            drop(index);
            discard(&staged).await;
            debug!(video_id = %existing.id, hash = %hash, "ingest lost race to identical content");
            return Ok(IngestOutcome {
                record: existing,
                deduplicated: true,
            });
        }
        if let Err(err) = self.check_capacity(&index, size) {
            drop(index);
            discard(&staged).await;
            return Err(err);
        }

        let id = VideoId::new();
        let file_name = format!(
            "{}_{}{}",
            hash.prefix(8),
            id.as_uuid().simple(),
            sanitized_extension(original_name)
        );
        let final_path = self.root.join(&file_name);
        if let Err(err) = tokio::fs::rename(&staged, &final_path).await {
            drop(index);
            discard(&staged).await;
            return Err(err.into());
        }

        let now = Utc::now();
        let original_name = match original_name.trim() {
            "" => file_name.clone(),
            name => name.to_string(),
        };
        let mime_type = match mime_type.trim() {
            "" => mime_for_path(Path::new(&original_name)).to_string(),
            mime => mime.to_string(),
        };
        let record = VideoRecord {
            id,
            content_hash: hash,
            original_name,
            mime_type,
            size_bytes: size,
            file_name,
            uploaded_at: now,
            last_accessed_at: now,
            access_count: 0,
            metadata: Map::new(),
        };

        index.insert(record.clone());
        if let Err(err) = persist(&index).await {
            index.remove(&record.id);
            drop(index);
            discard(&final_path).await;
            return Err(err);
        }

        info!(
            video_id = %record.id,
            bytes = record.size_bytes,
            name = %record.original_name,
            "video ingested"
        );
        Ok(IngestOutcome {
            record,
            deduplicated: false,
        })
    }

    pub async fn lookup_by_hash(&self, hash: &ContentHash) -> Option<VideoRecord> {
        self.index.lock().await.by_hash(hash).cloned()
    }

    pub async fn lookup_by_id(&self, id: &VideoId) -> Option<VideoRecord> {
        self.index.lock().await.get(id).cloned()
    }

    /// Open `range` of a video for reading and count one access.
    pub async fn open_range(
        &self,
        id: &VideoId,
        range: Option<RangeSpec>,
    ) -> Result<VideoStream> {
        let record = self
            .lookup_by_id(id)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("video {id}")))?;

        let mut file = File::open(self.root.join(&record.file_name)).await?;
        let metadata = file.metadata().await?;
        let total_size = record.size_bytes;
        if metadata.len() != total_size {
            warn!(
                video_id = %id,
                indexed = total_size,
                on_disk = metadata.len(),
                "stored file size differs from index"
            );
            return Err(StoreError::Internal(format!(
                "stored file for video {id} is {} bytes, index says {total_size}",
                metadata.len()
            )));
        }

        let range = resolve_range(range, total_size)?;
        file.seek(SeekFrom::Start(range.start)).await?;
        let reader = file.take(range.len());

        let record = self.touch(id).await.unwrap_or(record);
        Ok(VideoStream {
            reader,
            range,
            total_size,
            record,
            modified: metadata.modified().ok(),
        })
    }

    /// Count an access served from somewhere other than the store itself.
    pub async fn record_access(&self, id: &VideoId) -> Result<VideoRecord> {
        self.touch(id)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("video {id}")))
    }

    /// Read a whole video without counting it as an access.
    pub async fn read_for_cache(&self, id: &VideoId) -> Result<(VideoRecord, Vec<u8>)> {
        let record = self
            .lookup_by_id(id)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("video {id}")))?;
        let bytes = tokio::fs::read(self.root.join(&record.file_name)).await?;
        if bytes.len() as u64 != record.size_bytes {
            return Err(StoreError::Internal(format!(
                "stored file for video {id} is {} bytes, index says {}",
                bytes.len(),
                record.size_bytes
            )));
        }
        Ok((record, bytes))
    }

    /// Newest uploads first. Ties on upload time fall back to id order.
    pub async fn list(&self, limit: usize, offset: usize) -> VideoPage {
        let index = self.index.lock().await;
        let mut records: Vec<&VideoRecord> = index.records().collect();
        records.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        VideoPage {
            total: records.len(),
            videos: records
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(VideoRecord::summary)
                .collect(),
            limit,
            offset,
        }
    }

    /// Videos that have been watched at least once, most recent first.
    pub async fn recently_accessed(&self, limit: usize) -> Vec<VideoRecord> {
        let index = self.index.lock().await;
        let mut records: Vec<&VideoRecord> =
            index.records().filter(|r| r.access_count > 0).collect();
        records.sort_by(|a, b| {
            b.last_accessed_at
                .cmp(&a.last_accessed_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        records.into_iter().take(limit).cloned().collect()
    }

    /// Delete videos idle for longer than `max_age` and accessed fewer than
    /// `min_access_count` times.
    ///
    /// Records are removed and the index persisted before any file is
    /// deleted, so a crash can orphan bytes but never leave a dangling record.
    pub async fn retention_sweep(
        &self,
        max_age: Duration,
        min_access_count: u64,
    ) -> Result<SweepReport> {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(SweepReport::default());
        };

        let removed = {
            let mut index = self.index.lock().await;
            let expired: Vec<VideoId> = index
                .records()
                .filter(|r| r.last_accessed_at < cutoff && r.access_count < min_access_count)
                .map(|r| r.id)
                .collect();
            if expired.is_empty() {
                return Ok(SweepReport::default());
            }

            let removed: Vec<VideoRecord> =
                expired.iter().filter_map(|id| index.remove(id)).collect();
            if let Err(err) = persist(&index).await {
                for record in removed {
                    index.insert(record);
                }
                return Err(err);
            }
            removed
        };

        let mut report = SweepReport::default();
        for record in removed {
            match tokio::fs::remove_file(self.root.join(&record.file_name)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(video_id = %record.id, error = %e, "failed to delete swept video file");
                }
            }
            report.deleted_count += 1;
            report.freed_bytes += record.size_bytes;
        }

        info!(
            deleted = report.deleted_count,
            freed_bytes = report.freed_bytes,
            "retention sweep finished"
        );
        Ok(report)
    }

    pub async fn storage_stats(&self) -> StorageStats {
        let index = self.index.lock().await;
        StorageStats {
            video_count: index.len(),
            total_size: index.total_size(),
            total_access_count: index.records().map(|r| r.access_count).sum(),
            max_size: self.max_bytes,
            storage_root: self.root.display().to_string(),
        }
    }

    /// Modification time of the file backing `record`.
    pub async fn modified_at(&self, record: &VideoRecord) -> Option<SystemTime> {
        tokio::fs::metadata(self.root.join(&record.file_name))
            .await
            .ok()?
            .modified()
            .ok()
    }

    async fn touch(&self, id: &VideoId) -> Option<VideoRecord> {
        let mut index = self.index.lock().await;
        let record = index.get_mut(id)?;
        record.last_accessed_at = Utc::now();
        record.access_count += 1;
        let updated = record.clone();

        if let Err(err) = persist(&index).await {
            warn!(video_id = %id, error = %err, "failed to persist access statistics");
        }
        Some(updated)
    }

    fn check_capacity(&self, index: &StoreIndex, incoming: u64) -> Result<()> {
        match self.max_bytes {
            Some(max) if index.total_size().saturating_add(incoming) > max => {
                Err(StoreError::StorageFull(format!(
                    "storing {incoming} bytes would exceed the {max} byte limit"
                )))
            }
            _ => Ok(()),
        }
    }

    async fn stage(&self, source: &IngestSource, expected: u64) -> Result<PathBuf> {
        let staged = self.root.join(format!(
            "{STAGING_PREFIX}{}{STAGING_SUFFIX}",
            Uuid::new_v4().simple()
        ));

        let written = match source {
            IngestSource::Bytes(bytes) => write_staged(&staged, bytes).await,
            IngestSource::Path(path) => tokio::fs::copy(path, &staged)
                .await
                .map_err(StoreError::from),
        };

        match written {
            Ok(n) if n == expected => Ok(staged),
            Ok(n) => {
                discard(&staged).await;
                Err(StoreError::Internal(format!(
                    "source changed while ingesting: hashed {expected} bytes, copied {n}"
                )))
            }
            Err(err) => {
                discard(&staged).await;
                Err(err)
            }
        }
    }
}

async fn hash_source(source: IngestSource) -> Result<(ContentHash, u64, IngestSource)> {
    match source {
        IngestSource::Bytes(bytes) => {
            let (hash, bytes) =
                tokio::task::spawn_blocking(move || (sha256_bytes(&bytes), bytes)).await?;
            let size = bytes.len() as u64;
            Ok((hash, size, IngestSource::Bytes(bytes)))
        }
        IngestSource::Path(path) => {
            let (hash, size) = sha256_file(&path).await?;
            Ok((hash, size, IngestSource::Path(path)))
        }
    }
}

async fn write_staged(path: &Path, bytes: &[u8]) -> Result<u64> {
    let mut file = File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(bytes.len() as u64)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove staged file");
    }
}

async fn persist(index: &StoreIndex) -> Result<()> {
    let bytes = index.snapshot()?;
    index.snapshot_file().write(bytes).await
}

async fn remove_staging_files(root: &Path) {
    let index_path = root.join(INDEX_FILE);
    let Ok(mut entries) = tokio::fs::read_dir(root).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let stale = (name.starts_with(STAGING_PREFIX) && name.ends_with(STAGING_SUFFIX))
            || is_snapshot_tmp(&index_path, &name);
        if stale {
            debug!(file = %name, "removing stale staging file");
            discard(&path).await;
        }
    }
}
