use animeflix_core::IngestSource;
use animeflix_model::{IngestReceipt, VideoPage, VideoSummary};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
};
use serde::Deserialize;

use super::parse_video_id;
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

pub const ORIGINAL_NAME_HEADER: &str = "x-original-name";

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Ingest the raw request body.
///
/// 201 for new content, 200 when identical bytes were already stored.
pub async fn ingest_video_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<IngestReceipt>)> {
    let original_name = headers
        .get(ORIGINAL_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    // Let the store infer the type from the name when the client did not
    // send a specific one.
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|mime| !mime.eq_ignore_ascii_case("application/octet-stream"))
        .unwrap_or_default();

    let outcome = state
        .store
        .ingest(IngestSource::Bytes(body.to_vec()), original_name, mime_type)
        .await?;

    let status = if outcome.deduplicated {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome.receipt())))
}

pub async fn list_videos_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<VideoPage>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(AppError::bad_request(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    let offset = query.offset.unwrap_or(0);
    Ok(Json(state.store.list(limit, offset).await))
}

pub async fn get_video_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<VideoSummary>> {
    let id = parse_video_id(&id)?;
    state
        .store
        .lookup_by_id(&id)
        .await
        .map(|record| Json(record.summary()))
        .ok_or_else(|| AppError::not_found("Video not found"))
}
