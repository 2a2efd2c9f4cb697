use std::sync::Arc;

use anyhow::Context;
use animeflix_config::Config;
use animeflix_core::{
    ByteCache, ByteCacheConfig, ContentStore, ContentStoreConfig, RetentionPolicy,
    RetentionSweeper, warm_popular,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::infra::app_state::{AppState, StreamSettings};

/// Open the content store and, when enabled, the byte cache.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let store = ContentStore::open(ContentStoreConfig {
        root: config.storage.root.clone(),
        max_bytes: config.storage.max_bytes.map(|max| max.as_bytes()),
    })
    .await
    .with_context(|| {
        format!(
            "failed to open content store at {}",
            config.storage.root.display()
        )
    })?;

    let cache = if config.cache.enabled {
        let cache = ByteCache::open(ByteCacheConfig {
            root: config.cache.root.clone(),
            max_bytes: config.cache.max_bytes.as_bytes(),
        })
        .await
        .with_context(|| {
            format!("failed to open byte cache at {}", config.cache.root.display())
        })?;
        Some(Arc::new(cache))
    } else {
        info!("byte cache disabled; streaming straight from the content store");
        None
    };

    let settings = StreamSettings {
        max_populate_bytes: config.cache.max_populate_bytes.as_bytes(),
        warm_limit: config.cache.preload_count,
        retention: RetentionPolicy {
            max_age: config.retention.max_age,
            min_access_count: config.retention.min_access_count,
        },
    };

    Ok(AppState::new(Arc::new(store), cache, settings))
}

/// Warm the cache with recently watched videos. Failures are logged only.
pub async fn preload_cache(state: &AppState) {
    let Some(cache) = state.cache.as_ref() else {
        return;
    };
    if state.settings.warm_limit == 0 {
        return;
    }
    if let Err(err) = warm_popular(
        &state.store,
        cache,
        state.settings.warm_limit,
        state.settings.max_populate_bytes,
    )
    .await
    {
        warn!(error = %err, "startup cache warm-up failed");
    }
}

/// Start the retention sweeper unless its interval is zero.
pub fn start_retention_sweeper(state: &AppState, config: &Config) -> Option<JoinHandle<()>> {
    if !config.retention.sweeper_enabled() {
        return None;
    }
    info!(
        interval = %humantime::format_duration(config.retention.interval),
        max_age = %humantime::format_duration(config.retention.max_age),
        min_access_count = config.retention.min_access_count,
        "starting retention sweeper"
    );
    let sweeper = RetentionSweeper::new(
        Arc::clone(&state.store),
        state.settings.retention,
        config.retention.interval,
    );
    Some(sweeper.start())
}
