use std::{fmt, sync::Arc};

use animeflix_core::{ByteCache, ContentStore, RetentionPolicy};
use animeflix_model::CacheKey;
use dashmap::DashMap;

/// Request-independent knobs the handlers read.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Largest video copied into the byte cache after a miss.
    pub max_populate_bytes: u64,
    /// Default number of videos for an on-demand cache warm-up.
    pub warm_limit: usize,
    /// Thresholds for `POST /storage/sweep` when the request sets none.
    pub retention: RetentionPolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            max_populate_bytes: 256 * 1024 * 1024,
            warm_limit: 5,
            retention: RetentionPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ContentStore>,
    /// `None` when the byte cache is disabled.
    pub cache: Option<Arc<ByteCache>>,
    /// Cache keys with a population task running.
    pub in_flight: Arc<DashMap<CacheKey, ()>>,
    pub settings: Arc<StreamSettings>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("store_root", &self.store.root())
            .field("cache_enabled", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        store: Arc<ContentStore>,
        cache: Option<Arc<ByteCache>>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            store,
            cache,
            in_flight: Arc::new(DashMap::new()),
            settings: Arc::new(settings),
        }
    }

    /// Claim the population slot for `key`. `None` if another task holds it.
    pub fn begin_population(&self, key: &CacheKey) -> Option<PopulationGuard> {
        use dashmap::mapref::entry::Entry;

        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(PopulationGuard {
                    in_flight: Arc::clone(&self.in_flight),
                    key: key.clone(),
                })
            }
        }
    }
}

/// Releases the population slot on drop, including when the task panics or
/// is cancelled.
#[derive(Debug)]
pub struct PopulationGuard {
    in_flight: Arc<DashMap<CacheKey, ()>>,
    key: CacheKey,
}

impl Drop for PopulationGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}
