use std::sync::Arc;

use animeflix_core::{ByteCache, ClearReport, WarmReport, warm_popular};
use animeflix_model::CacheStats;
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Default, Deserialize)]
pub struct WarmQuery {
    pub limit: Option<usize>,
}

fn enabled_cache(state: &AppState) -> AppResult<&Arc<ByteCache>> {
    state
        .cache
        .as_ref()
        .ok_or_else(|| AppError::service_unavailable("Byte cache is disabled"))
}

pub async fn cache_stats_handler(State(state): State<AppState>) -> AppResult<Json<CacheStats>> {
    let cache = enabled_cache(&state)?;
    Ok(Json(cache.stats().await))
}

pub async fn clear_cache_handler(State(state): State<AppState>) -> AppResult<Json<ClearReport>> {
    let cache = enabled_cache(&state)?;
    Ok(Json(cache.clear().await?))
}

pub async fn warm_cache_handler(
    State(state): State<AppState>,
    Query(query): Query<WarmQuery>,
) -> AppResult<Json<WarmReport>> {
    let cache = enabled_cache(&state)?;
    let limit = query.limit.unwrap_or(state.settings.warm_limit);
    let report = warm_popular(
        &state.store,
        cache,
        limit,
        state.settings.max_populate_bytes,
    )
    .await?;
    Ok(Json(report))
}
