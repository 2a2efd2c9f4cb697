use std::path::PathBuf;
use std::time::Duration;

use animeflix_model::{ImportReport, StorageStats, SweepReport};
use axum::{Json, body::Bytes, extract::State};
use serde::Deserialize;
use tracing::info;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Optional overrides for a manual sweep. Missing fields use the configured
/// retention policy.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SweepRequest {
    pub max_age_days: Option<u64>,
    pub min_access_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub path: PathBuf,
}

pub async fn storage_stats_handler(State(state): State<AppState>) -> Json<StorageStats> {
    Json(state.store.storage_stats().await)
}

pub async fn sweep_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<SweepReport>> {
    let request: SweepRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SweepRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| AppError::bad_request(format!("invalid sweep request: {err}")))?
    };

    let policy = state.settings.retention;
    let max_age = request
        .max_age_days
        .map(|days| Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY)))
        .unwrap_or(policy.max_age);
    let min_access_count = request.min_access_count.unwrap_or(policy.min_access_count);

    info!(
        max_age_secs = max_age.as_secs(),
        min_access_count, "manual retention sweep requested"
    );
    let report = state
        .store
        .retention_sweep(max_age, min_access_count)
        .await?;
    Ok(Json(report))
}

pub async fn import_handler(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> AppResult<Json<ImportReport>> {
    let report = state.store.import_directory(&request.path).await?;
    Ok(Json(report))
}
