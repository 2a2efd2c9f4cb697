use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use animeflix_core::{
    ByteCache, ByteCacheConfig, ContentStore, ContentStoreConfig, RetentionPolicy,
};
use animeflix_model::{IngestReceipt, routes::v1};
use animeflix_server::{
    AppState, create_app,
    infra::app_state::StreamSettings,
};
use axum::body::Bytes;
use axum_test::TestServer;
use tempfile::TempDir;

// Code is used by test modules, but not in this scope
#[allow(unused)]
#[derive(Debug)]
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub store_dir: TempDir,
    pub cache_dir: TempDir,
}

#[allow(unused)]
#[derive(Debug, Clone)]
pub struct TestOptions {
    pub cache_enabled: bool,
    pub cache_max_bytes: u64,
    pub max_populate_bytes: u64,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_max_bytes: 1024 * 1024,
            max_populate_bytes: 1024 * 1024,
        }
    }
}

#[allow(unused)]
pub async fn build_test_app() -> Result<TestApp> {
    build_test_app_with(TestOptions::default()).await
}

#[allow(unused)]
pub async fn build_test_app_with(options: TestOptions) -> Result<TestApp> {
    let store_dir = tempfile::tempdir()?;
    let cache_dir = tempfile::tempdir()?;

    let store = ContentStore::open(ContentStoreConfig::new(store_dir.path())).await?;
    let cache = if options.cache_enabled {
        Some(Arc::new(
            ByteCache::open(ByteCacheConfig {
                root: cache_dir.path().to_path_buf(),
                max_bytes: options.cache_max_bytes,
            })
            .await?,
        ))
    } else {
        None
    };

    let state = AppState::new(
        Arc::new(store),
        cache,
        StreamSettings {
            max_populate_bytes: options.max_populate_bytes,
            warm_limit: 5,
            retention: RetentionPolicy::default(),
        },
    );
    let app = create_app(state.clone(), &["http://localhost:3050".to_string()]);
    let server = TestServer::builder()
        .build(app)
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;

    Ok(TestApp {
        server,
        state,
        store_dir,
        cache_dir,
    })
}

/// Deterministic, non-repeating-looking payload of `len` bytes.
#[allow(unused)]
pub fn sample_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

#[allow(unused)]
pub async fn upload(server: &TestServer, name: &str, bytes: &[u8]) -> IngestReceipt {
    let response = server
        .post(v1::videos::COLLECTION)
        .add_header("x-original-name", name)
        .add_header("content-type", "video/mp4")
        .bytes(Bytes::copy_from_slice(bytes))
        .await;
    assert!(
        response.status_code().is_success(),
        "upload failed: {}",
        response.text()
    );
    response.json()
}

#[allow(unused)]
pub fn stream_path(id: impl std::fmt::Display) -> String {
    v1::stream::VIDEO.replace("{id}", &id.to_string())
}

/// Wait until background population settles on `expected` cache entries.
#[allow(unused)]
pub async fn wait_for_cache_entries(state: &AppState, expected: usize) {
    let Some(cache) = state.cache.as_ref() else {
        panic!("byte cache disabled in this test app");
    };
    for _ in 0..200 {
        if state.in_flight.is_empty() && cache.stats().await.entry_count == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "byte cache never reached {expected} entries (has {})",
        cache.stats().await.entry_count
    );
}
