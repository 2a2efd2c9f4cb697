use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Variant tag used for whole-file payloads.
pub const FULL_VARIANT: &str = "full";

/// Composite byte cache key. Both parts are opaque, caller-defined strings.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub video_id: String,
    pub variant: String,
}

impl CacheKey {
    pub fn new(video_id: impl fmt::Display, variant: impl Into<String>) -> Self {
        Self {
            video_id: video_id.to_string(),
            variant: variant.into(),
        }
    }

    pub fn full(video_id: impl fmt::Display) -> Self {
        Self::new(video_id, FULL_VARIANT)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey")
            .field(&self.video_id)
            .field(&self.variant)
            .finish()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.video_id, self.variant)
    }
}

/// One indexed payload in the byte cache.
///
/// `file_name` is relative to the cache root and never shared between
/// entries. `seq` is the insertion sequence used to break eviction ties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub size_bytes: u64,
    pub mime_type: String,
    pub created_at_ms: u64,
    pub last_accessed_ms: u64,
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub file_name: String,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryStats {
    pub video_id: String,
    pub variant: String,
    pub size_bytes: u64,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
    pub age_ms: u64,
}

/// Process-lifetime operation counters. Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub evictions: u64,
    pub stale_purges: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_size: u64,
    pub max_size: u64,
    pub utilization_percent: f64,
    /// Most-accessed first.
    pub entries: Vec<CacheEntryStats>,
    pub counters: CacheCounters,
}
