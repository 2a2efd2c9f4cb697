//! Core data model definitions shared across Animeflix crates.
//!
//! Nothing in here touches the filesystem: the content store and byte cache
//! in `animeflix-core` own persistence, this crate only describes the shapes
//! they persist and the shapes the HTTP layer serializes.

pub mod cache;
pub mod error;
pub mod ids;
pub mod range;
pub mod routes;
pub mod units;
pub mod video;

pub use cache::{
    CacheCounters, CacheEntry, CacheEntryStats, CacheKey, CacheStats,
};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{ContentHash, VideoId};
pub use range::ByteRange;
pub use units::ByteSize;
pub use video::{
    ImportFailure, ImportReport, IngestReceipt, StorageStats, SweepReport,
    VideoPage, VideoRecord, VideoSummary,
};
