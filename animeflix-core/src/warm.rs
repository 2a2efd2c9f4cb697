use animeflix_model::{CacheKey, VideoRecord};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::byte_cache::ByteCache;
use crate::error::Result;
use crate::store::ContentStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmReport {
    pub considered: usize,
    pub populated: usize,
    pub already_cached: usize,
    pub skipped_too_large: usize,
    pub failed: usize,
}

/// Caller metadata attached to whole-file cache entries.
pub fn cache_metadata(record: &VideoRecord) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("contentHash".into(), Value::from(record.content_hash.as_str()));
    metadata.insert("originalName".into(), Value::from(record.original_name.as_str()));
    metadata
}

/// Copy the most recently watched videos into the byte cache.
///
/// Videos larger than `max_bytes` are skipped. Reads done here do not count
/// as accesses in the content store.
pub async fn warm_popular(
    store: &ContentStore,
    cache: &ByteCache,
    limit: usize,
    max_bytes: u64,
) -> Result<WarmReport> {
    let candidates = store.recently_accessed(limit).await;
    let mut report = WarmReport {
        considered: candidates.len(),
        ..WarmReport::default()
    };

    for record in candidates {
        if record.size_bytes > max_bytes {
            report.skipped_too_large += 1;
            continue;
        }
        let key = CacheKey::full(record.id);
        if cache.has(&key).await? {
            report.already_cached += 1;
            continue;
        }

        let populated = match store.read_for_cache(&record.id).await {
            Ok((record, bytes)) => cache
                .put(&key, &bytes, &record.mime_type, cache_metadata(&record))
                .await
                .map(|_| ()),
            Err(err) => Err(err),
        };
        match populated {
            Ok(()) => report.populated += 1,
            Err(err) => {
                warn!(video_id = %record.id, error = %err, "cache warm-up failed");
                report.failed += 1;
            }
        }
    }

    info!(
        considered = report.considered,
        populated = report.populated,
        already_cached = report.already_cached,
        skipped = report.skipped_too_large,
        failed = report.failed,
        "byte cache warm-up finished"
    );
    Ok(report)
}
