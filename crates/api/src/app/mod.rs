//! Diagnostics HTTP application (Axum router).
//!
//! - `routes/`: HTTP handlers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::{BoxError, Extension, Router, routing::get};
use binsync_infra::StatusSource;
use tower::ServiceBuilder;

pub mod errors;
pub mod routes;

/// Upper bound for one diagnostics request; head queries may hit the source.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Pipelines reported by the diagnostics endpoint.
pub type StatusSources = Arc<Vec<Arc<dyn StatusSource>>>;

/// Build the diagnostics router (public entrypoint used by `main.rs`).
pub fn build_app(sources: Vec<Arc<dyn StatusSource>>) -> Router {
    let sources: StatusSources = Arc::new(sources);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/stat", get(routes::stat::text))
        .route("/stat/json", get(routes::stat::json))
        .layer(Extension(sources))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .timeout(REQUEST_TIMEOUT),
        )
}

async fn handle_timeout(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled error: {err}"))
    }
}
