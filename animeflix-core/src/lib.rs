//! Storage engine behind the Animeflix streaming server.
//!
//! Two independent subsystems live here. [`ContentStore`] owns the canonical,
//! content-addressed video files and their metadata. [`ByteCache`] is a
//! bounded, disposable LRU copy of previously served payloads. They never
//! share a lock; the streaming layer coordinates between them.

pub mod byte_cache;
pub mod error;
pub mod hash;
pub mod mime;
mod persist;
pub mod range;
pub mod store;
pub mod sweeper;
pub mod warm;

pub use byte_cache::{
    ByteCache, ByteCacheConfig, CachedPayload, CachedStream, ClearReport, EvictionOutcome,
};
pub use error::{Result, StoreError};
pub use range::{RangeSpec, parse_range_header, resolve_range};
pub use store::{
    ContentStore, ContentStoreConfig, IngestOutcome, IngestSource, VideoStream,
};
pub use sweeper::{RetentionPolicy, RetentionSweeper};
pub use warm::{WarmReport, cache_metadata, warm_popular};
