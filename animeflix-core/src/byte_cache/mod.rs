//! Size-bounded LRU disk cache of served payloads.
//!
//! One mutex guards the whole index. Every mutation and the file operation
//! that goes with it (write, rename, delete) happens while it is held, so the
//! byte counter, the persisted index and the files on disk never disagree.
//! [`ByteCache::get`] reads under the lock. [`ByteCache::open_range`] hands
//! out an open handle instead, which keeps reading the evicted bytes after
//! eviction unlinks the file.
//!
//! The size cap is hard for the aggregate and advisory for a single payload:
//! a payload larger than the whole budget evicts everything else and is then
//! stored anyway.

mod eviction;
mod index;
mod stats;

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use animeflix_model::{ByteRange, CacheEntry, CacheEntryStats, CacheKey, CacheStats};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, Take};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::hash::key_digest;
use crate::persist::unix_ms_now;
use crate::range::{RangeSpec, resolve_range};
use eviction::{bytes_to_free, eviction_order};
use index::{CacheIndex, INDEX_FILE};
use stats::ByteCacheCounters;

const CACHE_FILE_EXT: &str = "cache";
const TMP_EXT: &str = "tmp";

#[derive(Debug, Clone)]
pub struct ByteCacheConfig {
    pub root: PathBuf,
    pub max_bytes: u64,
}

/// A cache hit: the whole payload plus its (already bumped) entry.
#[derive(Debug, Clone)]
pub struct CachedPayload {
    pub bytes: Vec<u8>,
    pub entry: CacheEntry,
}

/// A cache hit opened for one range.
///
/// `reader` yields exactly `range.len()` bytes.
#[derive(Debug)]
pub struct CachedStream {
    pub reader: Take<File>,
    pub range: ByteRange,
    pub total_size: u64,
    pub entry: CacheEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    pub evicted: Vec<CacheKey>,
    pub freed_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub removed_entries: usize,
    pub freed_bytes: u64,
}

#[derive(Debug)]
pub struct ByteCache {
    root: PathBuf,
    max_bytes: u64,
    index: Mutex<CacheIndex>,
    counters: ByteCacheCounters,
}

impl ByteCache {
    /// Open the cache, reconciling the index with the files on disk.
    ///
    /// Entries whose file is gone are dropped, and cache or temp files no
    /// entry references are deleted.
    pub async fn open(config: ByteCacheConfig) -> Result<Self> {
        if config.max_bytes == 0 {
            return Err(StoreError::Internal(
                "byte cache max_bytes must be greater than zero".into(),
            ));
        }
        tokio::fs::create_dir_all(&config.root).await?;

        let mut index = CacheIndex::load(config.root.join(INDEX_FILE)).await?;

        let missing: Vec<CacheKey> = index
            .entries()
            .filter(|e| !config.root.join(&e.file_name).is_file())
            .map(|e| e.key.clone())
            .collect();
        for key in &missing {
            warn!(key = %key, "dropping cache entry whose file is missing");
            index.remove(key);
        }

        let strays = remove_stray_files(&config.root, &index).await;
        if !missing.is_empty() {
            persist(&index).await?;
        }

        info!(
            entries = index.len(),
            bytes = index.current_size(),
            max_bytes = config.max_bytes,
            dropped = missing.len(),
            strays,
            root = %config.root.display(),
            "byte cache opened"
        );

        Ok(Self {
            root: config.root,
            max_bytes: config.max_bytes,
            index: Mutex::new(index),
            counters: ByteCacheCounters::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub async fn current_size(&self) -> u64 {
        self.index.lock().await.current_size()
    }

    /// Whether `key` is cached. An entry whose file vanished is purged and
    /// reported as absent.
    pub async fn has(&self, key: &CacheKey) -> Result<bool> {
        let mut index = self.index.lock().await;
        let Some(entry) = index.get(key) else {
            return Ok(false);
        };
        if tokio::fs::try_exists(self.root.join(&entry.file_name)).await? {
            return Ok(true);
        }

        self.purge_stale(&mut index, key).await?;
        Ok(false)
    }

    /// Read a cached payload, counting the hit.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CachedPayload>> {
        let mut index = self.index.lock().await;
        let Some(entry) = index.get(key) else {
            self.counters.on_miss();
            return Ok(None);
        };

        let expected = entry.size_bytes;
        let path = self.root.join(&entry.file_name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.len() as u64 == expected => bytes,
            Ok(bytes) => {
                warn!(
                    key = %key,
                    indexed = expected,
                    on_disk = bytes.len(),
                    "cache file size mismatch; discarding entry"
                );
                self.purge_stale(&mut index, key).await?;
                self.counters.on_miss();
                return Ok(None);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.purge_stale(&mut index, key).await?;
                self.counters.on_miss();
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let Some(entry) = self.record_hit(&mut index, key).await else {
            return Ok(None);
        };
        Ok(Some(CachedPayload { bytes, entry }))
    }

    /// Open `range` of a cached payload for streaming, counting the hit.
    ///
    /// Only the requested range is read, after the lock is released. An
    /// unsatisfiable range fails with [`StoreError::InvalidRange`] and is
    /// neither a hit nor a miss.
    pub async fn open_range(
        &self,
        key: &CacheKey,
        range: Option<RangeSpec>,
    ) -> Result<Option<CachedStream>> {
        let mut index = self.index.lock().await;
        let Some(entry) = index.get(key) else {
            self.counters.on_miss();
            return Ok(None);
        };

        let total_size = entry.size_bytes;
        let path = self.root.join(&entry.file_name);
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.purge_stale(&mut index, key).await?;
                self.counters.on_miss();
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let on_disk = file.metadata().await?.len();
        if on_disk != total_size {
            warn!(
                key = %key,
                indexed = total_size,
                on_disk,
                "cache file size mismatch; discarding entry"
            );
            self.purge_stale(&mut index, key).await?;
            self.counters.on_miss();
            return Ok(None);
        }

        let range = resolve_range(range, total_size)?;
        file.seek(SeekFrom::Start(range.start)).await?;

        let Some(entry) = self.record_hit(&mut index, key).await else {
            return Ok(None);
        };
        Ok(Some(CachedStream {
            reader: file.take(range.len()),
            range,
            total_size,
            entry,
        }))
    }

    /// Store `bytes` under `key`, evicting least recently used entries first
    /// when the budget would be exceeded. Replaces any existing entry.
    pub async fn put(
        &self,
        key: &CacheKey,
        bytes: &[u8],
        mime_type: &str,
        metadata: Map<String, Value>,
    ) -> Result<CacheEntry> {
        let len = bytes.len() as u64;
        let mut index = self.index.lock().await;

        if let Some(old) = index.remove(key) {
            remove_cache_file(&self.root.join(&old.file_name)).await;
        }

        let required = bytes_to_free(index.current_size(), len, self.max_bytes);
        if required > 0 {
            self.evict_locked(&mut index, required).await;
            if index.current_size() > 0
                && index.current_size().saturating_add(len) > self.max_bytes
            {
                persist_best_effort(&index).await;
                return Err(StoreError::StorageFull(format!(
                    "cannot free {required} bytes for cache entry {key}"
                )));
            }
        }

        let file_name = format!(
            "{}-{}.{CACHE_FILE_EXT}",
            key_digest(&key.to_string()),
            Uuid::new_v4().simple()
        );
        let final_path = self.root.join(&file_name);
        if let Err(err) = write_cache_file(&final_path, bytes).await {
            persist_best_effort(&index).await;
            return Err(err);
        }

        let now = unix_ms_now();
        let entry = CacheEntry {
            key: key.clone(),
            size_bytes: len,
            mime_type: mime_type.to_string(),
            created_at_ms: now,
            last_accessed_ms: now,
            access_count: 0,
            metadata,
            file_name,
            seq: index.next_seq(),
        };
        index.insert(entry.clone());

        if let Err(err) = persist(&index).await {
            index.remove(key);
            remove_cache_file(&final_path).await;
            return Err(err);
        }

        self.counters.on_put();
        debug!(key = %key, bytes = len, total = index.current_size(), "byte cache populated");
        Ok(entry)
    }

    /// Evict least recently used entries until at least `required_bytes`
    /// are freed or nothing is left.
    pub async fn evict(&self, required_bytes: u64) -> Result<EvictionOutcome> {
        let mut index = self.index.lock().await;
        let outcome = self.evict_locked(&mut index, required_bytes).await;
        if !outcome.evicted.is_empty() {
            persist(&index).await?;
        }
        Ok(outcome)
    }

    /// Drop every entry and its file.
    pub async fn clear(&self) -> Result<ClearReport> {
        let mut index = self.index.lock().await;
        let removed = index.clear();
        let report = ClearReport {
            removed_entries: removed.len(),
            freed_bytes: removed.iter().map(|e| e.size_bytes).sum(),
        };
        for entry in &removed {
            remove_cache_file(&self.root.join(&entry.file_name)).await;
        }
        persist(&index).await?;

        info!(
            entries = report.removed_entries,
            freed_bytes = report.freed_bytes,
            "byte cache cleared"
        );
        Ok(report)
    }

    pub async fn stats(&self) -> CacheStats {
        let index = self.index.lock().await;
        let now = unix_ms_now();

        let mut entries: Vec<&CacheEntry> = index.entries().collect();
        entries.sort_by(|a, b| {
            b.access_count
                .cmp(&a.access_count)
                .then(b.last_accessed_ms.cmp(&a.last_accessed_ms))
                .then(a.seq.cmp(&b.seq))
        });

        let total_size = index.current_size();
        CacheStats {
            entry_count: index.len(),
            total_size,
            max_size: self.max_bytes,
            utilization_percent: total_size as f64 * 100.0 / self.max_bytes as f64,
            entries: entries
                .into_iter()
                .map(|e| CacheEntryStats {
                    video_id: e.key.video_id.clone(),
                    variant: e.key.variant.clone(),
                    size_bytes: e.size_bytes,
                    access_count: e.access_count,
                    last_accessed_at: ms_to_datetime(e.last_accessed_ms),
                    age_ms: now.saturating_sub(e.created_at_ms),
                })
                .collect(),
            counters: self.counters.snapshot(),
        }
    }

    async fn evict_locked(&self, index: &mut CacheIndex, required_bytes: u64) -> EvictionOutcome {
        let order: Vec<(CacheKey, String, u64)> = eviction_order(index.entries())
            .into_iter()
            .map(|e| (e.key.clone(), e.file_name.clone(), e.size_bytes))
            .collect();

        let mut outcome = EvictionOutcome::default();
        for (key, file_name, size) in order {
            if outcome.freed_bytes >= required_bytes {
                break;
            }
            if !remove_cache_file(&self.root.join(&file_name)).await {
                continue;
            }
            index.remove(&key);
            outcome.freed_bytes += size;
            outcome.evicted.push(key);
        }

        if !outcome.evicted.is_empty() {
            self.counters.on_evicted(outcome.evicted.len() as u64);
            info!(
                evicted = outcome.evicted.len(),
                freed_bytes = outcome.freed_bytes,
                required_bytes,
                "byte cache eviction"
            );
        }
        outcome
    }

    async fn record_hit(&self, index: &mut CacheIndex, key: &CacheKey) -> Option<CacheEntry> {
        let entry = index.get_mut(key)?;
        entry.last_accessed_ms = unix_ms_now().max(entry.last_accessed_ms);
        entry.access_count += 1;
        let entry = entry.clone();

        if let Err(err) = persist(index).await {
            warn!(key = %key, error = %err, "failed to persist cache access statistics");
        }
        self.counters.on_hit();
        debug!(key = %key, bytes = entry.size_bytes, "byte cache hit");
        Some(entry)
    }

    async fn purge_stale(&self, index: &mut CacheIndex, key: &CacheKey) -> Result<()> {
        if let Some(entry) = index.remove(key) {
            remove_cache_file(&self.root.join(&entry.file_name)).await;
            self.counters.on_stale_purge();
            debug!(key = %key, "purged stale cache entry");
            persist(index).await?;
        }
        Ok(())
    }
}

async fn write_cache_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!("{CACHE_FILE_EXT}.{TMP_EXT}"));
    let written = async {
        let mut file = File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        tokio::fs::rename(&tmp, path).await
    }
    .await;
    if let Err(err) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}

/// Delete a cache file. Returns true once the file is confirmed gone.
async fn remove_cache_file(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            let gone = matches!(tokio::fs::try_exists(path).await, Ok(false));
            if !gone {
                warn!(path = %path.display(), error = %e, "failed to delete cache file");
            }
            gone
        }
    }
}

async fn remove_stray_files(root: &Path, index: &CacheIndex) -> usize {
    let referenced = index.referenced_files();
    let Ok(mut dir) = tokio::fs::read_dir(root).await else {
        return 0;
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = dir.next_entry().await {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let ext = path.extension().and_then(|e| e.to_str());
        let stray = match ext {
            Some(TMP_EXT) => true,
            Some(CACHE_FILE_EXT) => !referenced.contains(&*name),
            _ => false,
        };

        if stray && remove_cache_file(&path).await {
            debug!(file = %name, "removed stray cache file");
            removed += 1;
        }
    }
    removed
}

async fn persist(index: &CacheIndex) -> Result<()> {
    let bytes = index.snapshot()?;
    index.snapshot_file().write(bytes).await
}

async fn persist_best_effort(index: &CacheIndex) {
    if let Err(err) = persist(index).await {
        warn!(error = %err, "failed to persist byte cache index");
    }
}

fn ms_to_datetime(ms: u64) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn open_cache(root: &Path, max_bytes: u64) -> ByteCache {
        ByteCache::open(ByteCacheConfig {
            root: root.to_path_buf(),
            max_bytes,
        })
        .await
        .unwrap()
    }

    async fn put(cache: &ByteCache, key: &CacheKey, len: usize, fill: u8) -> CacheEntry {
        cache
            .put(key, &vec![fill; len], "video/mp4", Map::new())
            .await
            .unwrap()
    }

    fn cache_files(root: &Path) -> usize {
        std::fs::read_dir(root)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == CACHE_FILE_EXT)
            })
            .count()
    }

    fn persisted_keys(root: &Path) -> Vec<String> {
        let raw = std::fs::read(root.join(INDEX_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        json["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["key"]["video_id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn put_then_get_returns_the_written_bytes() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 10_000).await;
        let key = CacheKey::full("vid-1");
        let payload: Vec<u8> = (0..=255u8).collect();

        let mut meta = Map::new();
        meta.insert("source".into(), Value::from("store"));
        cache.put(&key, &payload, "video/webm", meta).await.unwrap();

        let hit = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(hit.bytes, payload);
        assert_eq!(hit.entry.mime_type, "video/webm");
        assert_eq!(hit.entry.access_count, 1);
        assert_eq!(hit.entry.metadata["source"], "store");
        assert!(cache.get(&CacheKey::full("other")).await.unwrap().is_none());

        let counters = cache.stats().await.counters;
        assert_eq!((counters.hits, counters.misses, counters.puts), (1, 1, 1));
    }

    #[tokio::test]
    async fn third_put_evicts_least_recently_used() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let (a, b, c) = (CacheKey::full("a"), CacheKey::full("b"), CacheKey::full("c"));

        put(&cache, &a, 400, 1).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        put(&cache, &b, 400, 2).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        put(&cache, &c, 400, 3).await;

        assert!(!cache.has(&a).await.unwrap());
        assert!(cache.has(&b).await.unwrap());
        assert!(cache.has(&c).await.unwrap());
        assert_eq!(cache.current_size().await, 800);
        assert_eq!(cache_files(dir.path()), 2);
        assert_eq!(cache.stats().await.counters.evictions, 1);
    }

    #[tokio::test]
    async fn recent_access_protects_an_older_entry() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let (a, b, c) = (CacheKey::full("a"), CacheKey::full("b"), CacheKey::full("c"));

        put(&cache, &a, 400, 1).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        put(&cache, &b, 400, 2).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.get(&a).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        put(&cache, &c, 400, 3).await;

        assert!(cache.has(&a).await.unwrap());
        assert!(!cache.has(&b).await.unwrap());
    }

    #[tokio::test]
    async fn equal_timestamps_evict_in_insertion_order() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let keys: Vec<CacheKey> = (0..3).map(|i| CacheKey::new(i, "full")).collect();
        for key in &keys {
            put(&cache, key, 300, 0).await;
        }

        let outcome = cache.evict(1).await.unwrap();
        assert_eq!(outcome.evicted, vec![keys[0].clone()]);
        assert_eq!(outcome.freed_bytes, 300);
    }

    #[tokio::test]
    async fn put_evicts_at_least_the_incoming_size() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let keys: Vec<CacheKey> = (0..9).map(|i| CacheKey::new(i, "full")).collect();
        for key in &keys {
            put(&cache, key, 100, 0).await;
        }

        put(&cache, &CacheKey::new(9, "full"), 200, 1).await;

        let stats = cache.stats().await;
        assert_eq!(stats.entry_count, 8);
        assert_eq!(stats.total_size, 900);
        assert_eq!(stats.counters.evictions, 2);
        assert!(!cache.has(&keys[0]).await.unwrap());
        assert!(!cache.has(&keys[1]).await.unwrap());
        assert!(cache.has(&keys[2]).await.unwrap());
        assert_eq!(cache_files(dir.path()), 8);
    }

    /// Swap a cache file for a non-empty directory so deleting it fails.
    fn make_undeletable(root: &Path, entry: &CacheEntry) {
        let path = root.join(&entry.file_name);
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("pinned"), b"x").unwrap();
    }

    #[tokio::test]
    async fn undeletable_files_are_skipped_and_put_reports_full() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let a = put(&cache, &CacheKey::full("a"), 400, 1).await;
        let b = put(&cache, &CacheKey::full("b"), 400, 2).await;
        make_undeletable(dir.path(), &a);
        make_undeletable(dir.path(), &b);

        let err = cache
            .put(&CacheKey::full("c"), &[3; 400], "video/mp4", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StorageFull(_)), "unexpected error: {err:?}");

        let stats = cache.stats().await;
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_size, 800);
        assert_eq!(stats.entries.iter().map(|e| e.size_bytes).sum::<u64>(), 800);
        assert_eq!(stats.counters.evictions, 0);
        assert_eq!(persisted_keys(dir.path()), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn eviction_skips_an_undeletable_entry_and_takes_the_next() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let a = put(&cache, &CacheKey::full("a"), 400, 1).await;
        put(&cache, &CacheKey::full("b"), 400, 2).await;
        make_undeletable(dir.path(), &a);

        put(&cache, &CacheKey::full("c"), 400, 3).await;

        let stats = cache.stats().await;
        assert_eq!(stats.total_size, 800);
        assert_eq!(stats.entries.iter().map(|e| e.size_bytes).sum::<u64>(), 800);
        assert_eq!(stats.counters.evictions, 1);
        assert_eq!(persisted_keys(dir.path()), vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn open_range_reads_only_the_requested_slice() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 10_000).await;
        let key = CacheKey::full("clip");
        let bytes: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        cache.put(&key, &bytes, "video/mp4", Map::new()).await.unwrap();

        let hit = cache
            .open_range(&key, Some(RangeSpec::from_bounds(100, Some(199))))
            .await
            .unwrap()
            .unwrap();
        assert_eq!((hit.range.start, hit.range.end), (100, 199));
        assert_eq!(hit.total_size, 1000);
        assert_eq!(hit.entry.access_count, 1);

        let mut reader = hit.reader;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, &bytes[100..200]);
        assert_eq!(cache.stats().await.counters.hits, 1);
    }

    #[tokio::test]
    async fn open_range_rejects_unsatisfiable_ranges_without_counting() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let key = CacheKey::full("clip");
        put(&cache, &key, 100, 7).await;

        let err = cache
            .open_range(&key, Some(RangeSpec::from_bounds(100, None)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRange(_)), "unexpected error: {err:?}");

        let stats = cache.stats().await;
        assert_eq!((stats.counters.hits, stats.counters.misses), (0, 0));
        assert_eq!(stats.entries[0].access_count, 0);
    }

    #[tokio::test]
    async fn open_range_heals_when_file_vanishes() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let key = CacheKey::full("gone");
        let entry = put(&cache, &key, 100, 1).await;
        std::fs::remove_file(dir.path().join(&entry.file_name)).unwrap();

        assert!(cache.open_range(&key, None).await.unwrap().is_none());
        assert!(persisted_keys(dir.path()).is_empty());
        assert_eq!(cache.stats().await.counters.misses, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn open_range_keeps_reading_after_eviction() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let key = CacheKey::full("clip");
        put(&cache, &key, 300, 9).await;

        let hit = cache.open_range(&key, None).await.unwrap().unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache_files(dir.path()), 0);

        let mut reader = hit.reader;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, vec![9u8; 300]);
    }

    #[tokio::test]
    async fn oversized_payload_is_stored_after_evicting_everything() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        put(&cache, &CacheKey::full("small"), 400, 1).await;

        let big = CacheKey::full("big");
        put(&cache, &big, 1500, 2).await;

        let stats = cache.stats().await;
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.total_size, 1500);
        assert!(stats.utilization_percent > 100.0);
        assert!(cache.has(&big).await.unwrap());
    }

    #[tokio::test]
    async fn overwriting_a_key_replaces_its_size_and_file() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let key = CacheKey::new("vid", "720p");

        put(&cache, &key, 400, 1).await;
        put(&cache, &key, 300, 2).await;

        assert_eq!(cache.current_size().await, 300);
        assert_eq!(cache_files(dir.path()), 1);
        assert_eq!(cache.get(&key).await.unwrap().unwrap().bytes, vec![2u8; 300]);
    }

    #[tokio::test]
    async fn missing_file_heals_the_index() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let gone = CacheKey::full("gone");
        let kept = CacheKey::full("kept");
        let entry = put(&cache, &gone, 100, 1).await;
        put(&cache, &kept, 100, 2).await;

        std::fs::remove_file(dir.path().join(&entry.file_name)).unwrap();

        assert!(!cache.has(&gone).await.unwrap());
        assert_eq!(persisted_keys(dir.path()), vec!["kept".to_string()]);
        assert_eq!(cache.current_size().await, 100);
        assert!(cache.get(&gone).await.unwrap().is_none());
        assert_eq!(cache.stats().await.counters.stale_purges, 1);
    }

    #[tokio::test]
    async fn get_heals_when_file_vanishes() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let key = CacheKey::full("gone");
        let entry = put(&cache, &key, 100, 1).await;
        std::fs::remove_file(dir.path().join(&entry.file_name)).unwrap();

        assert!(cache.get(&key).await.unwrap().is_none());
        assert!(persisted_keys(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn stats_list_most_accessed_first() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        let (a, b) = (CacheKey::full("a"), CacheKey::full("b"));
        put(&cache, &b, 10, 1).await;
        put(&cache, &a, 10, 2).await;

        for _ in 0..3 {
            cache.get(&a).await.unwrap();
        }
        cache.get(&b).await.unwrap();

        let stats = cache.stats().await;
        let order: Vec<&str> = stats.entries.iter().map(|e| e.video_id.as_str()).collect();
        assert_eq!(order, ["a", "b"]);
        assert_eq!(stats.entries[0].access_count, 3);
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_size, 20);
        assert!((stats.utilization_percent - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn entries_survive_restart() {
        let dir = tempdir().unwrap();
        let keys: Vec<CacheKey> = (0..4).map(|i| CacheKey::new(format!("v{i}"), "full")).collect();
        {
            let cache = open_cache(dir.path(), 10_000).await;
            for (i, key) in keys.iter().enumerate() {
                put(&cache, key, 100 * (i + 1), i as u8).await;
            }
        }

        let cache = open_cache(dir.path(), 10_000).await;
        for key in &keys {
            assert!(cache.has(key).await.unwrap(), "{key} should survive");
        }
        let stats = cache.stats().await;
        assert_eq!(stats.total_size, 100 + 200 + 300 + 400);
        for (i, key) in keys.iter().enumerate() {
            let entry = stats
                .entries
                .iter()
                .find(|e| e.video_id == key.video_id)
                .unwrap();
            assert_eq!(entry.size_bytes, 100 * (i as u64 + 1));
        }

        let fresh = put(&cache, &CacheKey::full("new"), 10, 9).await;
        assert_eq!(fresh.seq, 4);
    }

    #[tokio::test]
    async fn open_reconciles_disk_with_index() {
        let dir = tempdir().unwrap();
        let lost = {
            let cache = open_cache(dir.path(), 10_000).await;
            put(&cache, &CacheKey::full("kept"), 100, 1).await;
            put(&cache, &CacheKey::full("lost"), 50, 2).await
        };
        std::fs::remove_file(dir.path().join(&lost.file_name)).unwrap();
        std::fs::write(dir.path().join("orphan.cache"), b"junk").unwrap();
        std::fs::write(dir.path().join("partial.cache.tmp"), b"junk").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"left alone").unwrap();

        let cache = open_cache(dir.path(), 10_000).await;
        assert_eq!(cache.current_size().await, 100);
        assert_eq!(persisted_keys(dir.path()), vec!["kept".to_string()]);
        assert!(!dir.path().join("orphan.cache").exists());
        assert!(!dir.path().join("partial.cache.tmp").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn corrupt_index_is_treated_as_empty() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), b"\x00\x01garbage").unwrap();

        let cache = open_cache(dir.path(), 1000).await;
        assert_eq!(cache.stats().await.entry_count, 0);
        put(&cache, &CacheKey::full("a"), 10, 1).await;
        assert_eq!(persisted_keys(dir.path()), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1000).await;
        put(&cache, &CacheKey::full("a"), 100, 1).await;
        put(&cache, &CacheKey::full("b"), 200, 2).await;

        let report = cache.clear().await.unwrap();
        assert_eq!(report, ClearReport { removed_entries: 2, freed_bytes: 300 });
        assert_eq!(cache.current_size().await, 0);
        assert_eq!(cache_files(dir.path()), 0);
        assert!(persisted_keys(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn zero_budget_is_rejected() {
        let dir = tempdir().unwrap();
        let err = ByteCache::open(ByteCacheConfig {
            root: dir.path().to_path_buf(),
            max_bytes: 0,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Internal(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_operations_keep_counter_and_files_consistent() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(open_cache(dir.path(), 2_000).await);

        let mut tasks = Vec::new();
        for i in 0..32u32 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                let key = CacheKey::new(i % 8, "full");
                match i % 4 {
                    0 | 1 => {
                        cache
                            .put(&key, &vec![i as u8; 150 + (i as usize * 7)], "video/mp4", Map::new())
                            .await
                            .unwrap();
                    }
                    2 => {
                        cache.get(&key).await.unwrap();
                    }
                    _ => {
                        if i % 16 == 3 {
                            cache.clear().await.unwrap();
                        } else {
                            cache.evict(200).await.unwrap();
                        }
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stats = cache.stats().await;
        let summed: u64 = stats.entries.iter().map(|e| e.size_bytes).sum();
        assert_eq!(summed, stats.total_size);
        assert!(stats.total_size <= 2_000);
        assert_eq!(cache_files(dir.path()), stats.entry_count);

        drop(cache);
        let reopened = open_cache(dir.path(), 2_000).await;
        assert_eq!(reopened.current_size().await, stats.total_size);
    }
}
