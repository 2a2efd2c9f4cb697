use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::infra::app_state::AppState;

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let storage = state.store.storage_stats().await;
    let mut health_status = json!({
        "status": "healthy",
        "checks": {
            "store": {
                "status": "healthy",
                "videos": storage.video_count,
            }
        }
    });

    health_status["checks"]["cache"] = match state.cache.as_ref() {
        Some(cache) => json!({
            "status": "healthy",
            "bytes": cache.current_size().await,
            "maxBytes": cache.max_bytes(),
        }),
        None => json!({ "status": "disabled" }),
    };

    Json(health_status)
}
