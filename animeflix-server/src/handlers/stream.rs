//! Range streaming of stored videos, served from the byte cache when it
//! holds the video and from the content store otherwise.

use std::sync::Arc;
use std::time::SystemTime;

use animeflix_core::{
    ByteCache, CachedStream, ContentStore, RangeSpec, StoreError, VideoStream,
    cache_metadata, parse_range_header,
};
use animeflix_model::{ByteRange, CacheKey, VideoId, VideoRecord};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::parse_video_id;
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

const CACHE_CONTROL: &str = "public, max-age=86400";

pub async fn stream_video_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let id = parse_video_id(&id)?;
    let record = state
        .store
        .lookup_by_id(&id)
        .await
        .ok_or_else(|| AppError::not_found("Video not found"))?;

    let range = match requested_range(&headers) {
        Ok(range) => range,
        Err(err) => {
            debug!(video_id = %id, error = %err, "rejecting range request");
            return Ok(AppError::from(err).unsatisfiable_range_response(record.size_bytes));
        }
    };

    if let Some(cache) = state.cache.as_ref()
        && let Some(response) = serve_from_cache(&state, cache, &record, range).await?
    {
        return Ok(response);
    }

    serve_from_store(&state, &record, range).await
}

fn requested_range(headers: &HeaderMap) -> Result<Option<RangeSpec>, StoreError> {
    let Some(value) = headers.get(header::RANGE) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| StoreError::InvalidRange("range header is not ASCII".into()))?;
    parse_range_header(value).map(Some)
}

async fn serve_from_cache(
    state: &AppState,
    cache: &ByteCache,
    record: &VideoRecord,
    range: Option<RangeSpec>,
) -> AppResult<Option<Response>> {
    let key = CacheKey::full(record.id);
    let hit = match cache.open_range(&key, range).await {
        Ok(Some(hit)) => hit,
        Ok(None) => return Ok(None),
        Err(err @ StoreError::InvalidRange(_)) => {
            return Ok(Some(
                AppError::from(err).unsatisfiable_range_response(record.size_bytes),
            ));
        }
        Err(err) => {
            warn!(key = %key, error = %err, "byte cache read failed, using content store");
            return Ok(None);
        }
    };

    let record = state.store.record_access(&record.id).await?;
    let modified = state.store.modified_at(&record).await;
    let CachedStream {
        reader,
        range: resolved,
        total_size,
        ..
    } = hit;

    debug!(key = %key, start = resolved.start, end = resolved.end, "serving video from byte cache");
    let body = Body::from_stream(ReaderStream::new(reader));
    video_response(&record, resolved, total_size, range.is_some(), modified, body).map(Some)
}

async fn serve_from_store(
    state: &AppState,
    record: &VideoRecord,
    range: Option<RangeSpec>,
) -> AppResult<Response> {
    let stream = match state.store.open_range(&record.id, range).await {
        Ok(stream) => stream,
        Err(err @ StoreError::InvalidRange(_)) => {
            return Ok(AppError::from(err).unsatisfiable_range_response(record.size_bytes));
        }
        Err(err) => return Err(err.into()),
    };

    schedule_population(state, &stream.record);

    let VideoStream {
        reader,
        range: resolved,
        total_size,
        record,
        modified,
    } = stream;
    // Dropping the body (client abort) drops the reader and closes the file.
    let body = Body::from_stream(ReaderStream::new(reader));
    video_response(&record, resolved, total_size, range.is_some(), modified, body)
}

fn video_response(
    record: &VideoRecord,
    range: ByteRange,
    total: u64,
    partial: bool,
    modified: Option<SystemTime>,
    body: Body,
) -> AppResult<Response> {
    let modified = modified.unwrap_or_else(|| record.uploaded_at.into());
    let status = if partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, record.mime_type.as_str())
        .header(header::CONTENT_LENGTH, range.len())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, CACHE_CONTROL)
        .header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified))
        .header(header::ETAG, format!("\"{}\"", record.content_hash));
    if partial {
        builder = builder.header(header::CONTENT_RANGE, range.content_range(total));
    }
    Ok(builder.body(body)?)
}

/// Copy a video into the byte cache in the background after a miss.
///
/// At most one task per key runs at a time; videos above the population
/// limit are never cached.
fn schedule_population(state: &AppState, record: &VideoRecord) {
    let Some(cache) = state.cache.clone() else {
        return;
    };
    if record.size_bytes > state.settings.max_populate_bytes {
        debug!(video_id = %record.id, bytes = record.size_bytes, "video exceeds cache population limit");
        return;
    }

    let key = CacheKey::full(record.id);
    let Some(guard) = state.begin_population(&key) else {
        debug!(key = %key, "cache population already in flight");
        return;
    };
    let store = Arc::clone(&state.store);
    let id = record.id;

    tokio::spawn(async move {
        let _guard = guard;
        match populate(&store, &cache, &key, &id).await {
            Ok(Some(bytes)) => debug!(key = %key, bytes, "byte cache populated after miss"),
            Ok(None) => {}
            Err(err) => warn!(key = %key, error = %err, "byte cache population failed"),
        }
    });
}

async fn populate(
    store: &ContentStore,
    cache: &ByteCache,
    key: &CacheKey,
    id: &VideoId,
) -> animeflix_core::Result<Option<u64>> {
    if cache.has(key).await? {
        return Ok(None);
    }
    let (record, bytes) = store.read_for_cache(id).await?;
    let entry = cache
        .put(key, &bytes, &record.mime_type, cache_metadata(&record))
        .await?;
    Ok(Some(entry.size_bytes))
}
