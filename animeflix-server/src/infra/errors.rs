use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use animeflix_core::StoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn range_not_satisfiable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::RANGE_NOT_SATISFIABLE, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// 416 carrying the `Content-Range: bytes */{total}` header.
    pub fn unsatisfiable_range_response(self, total: u64) -> Response {
        let mut response = self.into_response();
        if let Ok(value) = HeaderValue::from_str(&format!("bytes */{total}")) {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }
        response
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => Self::not_found(msg),
            StoreError::InvalidRange(msg) => Self::range_not_satisfiable(msg),
            StoreError::EmptyContent => Self::bad_request(err.to_string()),
            StoreError::StorageFull(_) => {
                tracing::warn!(error = %err, "storage budget exhausted");
                Self::internal("Storage is full")
            }
            _ => {
                tracing::error!(error = %err, "storage operation failed");
                Self::internal("Storage operation failed")
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, "request failed");
        Self::internal("Internal server error")
    }
}

impl From<axum::http::Error> for AppError {
    fn from(err: axum::http::Error) -> Self {
        tracing::error!(error = %err, "failed to build response");
        Self::internal("Failed to build response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses_without_leaking_paths() {
        let not_found: AppError = StoreError::NotFound("video 1".into()).into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let range: AppError = StoreError::InvalidRange("start 9 beyond size 3".into()).into();
        assert_eq!(range.status, StatusCode::RANGE_NOT_SATISFIABLE);

        let empty: AppError = StoreError::EmptyContent.into();
        assert_eq!(empty.status, StatusCode::BAD_REQUEST);

        let io: AppError = StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "/srv/videos/secret.mp4",
        ))
        .into();
        assert_eq!(io.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!io.message.contains("/srv"));

        let corrupt: AppError = StoreError::CorruptIndex {
            path: "/srv/videos/videos-index.json".into(),
            reason: "eof".into(),
        }
        .into();
        assert!(!corrupt.message.contains("/srv"));
    }

    #[test]
    fn unsatisfiable_range_carries_total_size() {
        let response = AppError::range_not_satisfiable("nope").unsatisfiable_range_response(1000);
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
    }
}
