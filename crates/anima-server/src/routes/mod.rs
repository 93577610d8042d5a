//! Route wiring.

pub mod associations;
pub mod memories;
pub mod meta;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;

pub type AppState = Arc<Engine>;

/// Build the full router.
pub fn router(engine: AppState) -> Router {
    Router::new()
        .route("/api/v1/memories/add", post(memories::add))
        .route("/api/v1/memories/query", post(memories::query))
        .route("/api/v1/memories/bootstrap", get(memories::bootstrap))
        .route("/api/v1/memories/update-tier", post(memories::update_tier))
        .route("/api/v1/associations/discover", get(associations::discover))
        .route("/api/v1/associations/hubs", get(associations::hubs))
        .route(
            "/api/v1/associations/network-stats",
            get(associations::network_stats),
        )
        .route("/api/v1/meta/conversation-end", post(meta::conversation_end))
        .route("/api/v1/meta/reflection", get(meta::reflections))
        .route("/api/v1/meta/handshake/generate", post(meta::generate_handshake))
        .route("/api/v1/meta/handshake", get(meta::get_handshake))
        .route("/api/v1/meta/metrics", get(meta::metrics))
        .route("/api/v1/meta/cache-stats", get(meta::cache_stats))
        .route("/health", get(meta::health))
        .layer(middleware::from_fn(response_time))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Stamp every response with `X-Response-Time: <ms>`.
async fn response_time(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis();
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed_ms}ms")) {
        response.headers_mut().insert("X-Response-Time", value);
    }
    response
}
