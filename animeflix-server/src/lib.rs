//! # Animeflix Server
//!
//! HTTP adapter over the Animeflix content store and byte cache:
//!
//! - **Streaming**: `Range`-aware video delivery with `206 Partial Content`,
//!   served from the byte cache when possible
//! - **Ingest**: raw-body uploads deduplicated by content hash
//! - **Maintenance**: retention sweeps, directory imports, cache warm-up and
//!   cache statistics

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use handlers::videos::ORIGINAL_NAME_HEADER;

/// Build the full application router.
///
/// An empty origin list or a `*` entry allows any origin.
pub fn create_app(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .merge(routes::create_api_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins)),
        )
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.is_empty()
        || allowed_origins.iter().any(|origin| origin.trim() == "*")
    {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::DELETE])
        .allow_headers([
            header::RANGE,
            header::CONTENT_TYPE,
            HeaderName::from_static(ORIGINAL_NAME_HEADER),
        ])
        .expose_headers([
            header::CONTENT_RANGE,
            header::CONTENT_LENGTH,
            header::ACCEPT_RANGES,
            header::ETAG,
        ])
}
