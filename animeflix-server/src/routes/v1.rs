use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

use crate::{
    AppState,
    handlers::{cache, health, storage, stream, videos},
};

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/stream/video/{id}", get(stream::stream_video_handler))
        .merge(create_video_routes())
        .merge(create_admin_routes())
}

fn create_video_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/videos",
            post(videos::ingest_video_handler)
                // Uploads are whole videos; the store enforces its own budget.
                .layer(DefaultBodyLimit::disable())
                .get(videos::list_videos_handler),
        )
        .route("/videos/{id}", get(videos::get_video_handler))
}

fn create_admin_routes() -> Router<AppState> {
    Router::new()
        .route("/storage/stats", get(storage::storage_stats_handler))
        .route("/storage/sweep", post(storage::sweep_handler))
        .route("/storage/import", post(storage::import_handler))
        .route("/cache", delete(cache::clear_cache_handler))
        .route("/cache/stats", get(cache::cache_stats_handler))
        .route("/cache/warm", post(cache::warm_cache_handler))
}
