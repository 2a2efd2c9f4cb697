use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ContentHash, VideoId, routes};

/// Canonical record for one deduplicated video held by the content store.
///
/// `file_name` is relative to the store root and owned exclusively by this
/// record; it is never derived from `original_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: VideoId,
    pub content_hash: ContentHash,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl VideoRecord {
    pub fn stream_url(&self) -> String {
        routes::stream_url(&self.id)
    }

    pub fn summary(&self) -> VideoSummary {
        VideoSummary {
            id: self.id,
            original_name: self.original_name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes,
            content_hash: self.content_hash.clone(),
            uploaded_at: self.uploaded_at,
            last_accessed_at: self.last_accessed_at,
            access_count: self.access_count,
            stream_url: self.stream_url(),
        }
    }

    pub fn receipt(&self, deduplicated: bool) -> IngestReceipt {
        IngestReceipt {
            id: self.id,
            stream_url: self.stream_url(),
            original_name: self.original_name.clone(),
            size_bytes: self.size_bytes,
            deduplicated,
        }
    }
}

/// API-facing view of a [`VideoRecord`] without storage details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    pub id: VideoId,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub content_hash: ContentHash,
    pub uploaded_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub stream_url: String,
}

/// Returned to the upload/migration layer after an ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub id: VideoId,
    pub stream_url: String,
    pub original_name: String,
    pub size_bytes: u64,
    /// True when the content was already stored and no bytes were written.
    pub deduplicated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPage {
    pub videos: Vec<VideoSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub video_count: usize,
    pub total_size: u64,
    pub total_access_count: u64,
    pub max_size: Option<u64>,
    pub storage_root: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub deleted_count: usize,
    pub freed_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailure {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub total_files: usize,
    pub imported: usize,
    pub failed: Vec<ImportFailure>,
    pub videos: Vec<IngestReceipt>,
}
