//! HTTP-level integration tests against the axum router, driven with
//! `tower::ServiceExt::oneshot` rather than a bound socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use warden_core::NamespaceRegistry;
use warden_server::routes::AppState;

fn test_app() -> axum::Router {
    let state = Arc::new(AppState {
        registry: Arc::new(NamespaceRegistry::new()),
    });
    warden_server::app(state)
}

#[tokio::test]
async fn root_lists_no_namespaces_when_empty() {
    let response = test_app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("(none)"));
}

#[tokio::test]
async fn session_endpoint_without_namespace_query_is_bad_request() {
    let response = test_app()
        .oneshot(Request::builder().uri("/v1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_endpoint_with_empty_namespace_is_bad_request() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/v1?namespace=")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_endpoint_for_unknown_namespace_is_not_found() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/stats_v1?namespace=ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_endpoint_reports_created_namespace() {
    let state = Arc::new(AppState {
        registry: Arc::new(NamespaceRegistry::new()),
    });
    let (_locker, _created) = state.registry.get_or_create("widgets");
    let app = warden_server::app(Arc::clone(&state));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/stats_v1?namespace=widgets")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total_submitted"], 0);
}
