pub mod cache;
pub mod health;
pub mod storage;
pub mod stream;
pub mod videos;

use animeflix_model::VideoId;

use crate::infra::errors::AppError;

/// Unparseable ids cannot name a stored video, so they are a 404.
pub(crate) fn parse_video_id(raw: &str) -> Result<VideoId, AppError> {
    raw.parse::<VideoId>()
        .map_err(|_| AppError::not_found("Video not found"))
}
