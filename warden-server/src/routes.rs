//! HTTP/WebSocket route handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;
use warden_core::NamespaceRegistry;

use crate::ws_transport::WsTransport;

pub struct AppState {
    pub registry: Arc<NamespaceRegistry>,
}

fn namespace_param(params: &HashMap<String, String>) -> Result<&str, Response> {
    match params.get("namespace").map(|s| s.as_str()) {
        Some(ns) if !ns.is_empty() => Ok(ns),
        _ => Err((
            StatusCode::BAD_REQUEST,
            "missing or empty `namespace` query parameter",
        )
            .into_response()),
    }
}

/// `GET /v1?namespace=<name>` — upgrades to a WebSocket and drives one
/// session to completion against that namespace's multi-locker.
pub async fn session_endpoint(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let namespace = match namespace_param(&params) {
        Ok(ns) => ns.to_string(),
        Err(resp) => return resp,
    };

    let (locker, created) = state.registry.get_or_create(&namespace);
    if created {
        info!(%namespace, "namespace created");
    }

    ws.on_upgrade(move |socket| async move {
        warden_core::run_session(WsTransport::new(socket), locker).await;
    })
}

/// `GET /stats_v1?namespace=<name>` — one-shot JSON read of that
/// namespace's statistics. 404 if the namespace has never been created.
pub async fn stats_endpoint(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let namespace = match namespace_param(&params) {
        Ok(ns) => ns,
        Err(resp) => return resp,
    };

    match state.registry.get(namespace) {
        Some(locker) => Json(locker.statistics()).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown namespace").into_response(),
    }
}

/// `GET /` — friendly root route: API versions plus currently open
/// namespaces.
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut namespaces = state.registry.list();
    namespaces.sort();
    format!(
        "warden lock-coordination service\napi versions: /v1, /stats_v1\nopen namespaces: {}\n",
        if namespaces.is_empty() {
            "(none)".to_string()
        } else {
            namespaces.join(", ")
        }
    )
}
