//! Router construction for the warden WebSocket front end, factored out
//! of `main` so it can be exercised with `tower::ServiceExt::oneshot` in
//! integration tests without binding a real socket.

pub mod config;
pub mod routes;
pub mod ws_transport;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use routes::AppState;

/// Builds the full axum router: `/`, `/v1`, `/stats_v1`, traced.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/v1", get(routes::session_endpoint))
        .route("/stats_v1", get(routes::stats_endpoint))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
