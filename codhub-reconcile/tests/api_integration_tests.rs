//! Integration tests for codhub-reconcile HTTP endpoints

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use codhub_common::events::EventBus;
use codhub_reconcile::db::sessions;
use codhub_reconcile::AppState;
use helpers::*;

async fn create_test_app() -> (axum::Router, sqlx::SqlitePool, tempfile::TempDir) {
    let (dir, pool) = create_test_db().await.unwrap();
    let state = AppState::new(pool.clone(), EventBus::new(64), test_limits());
    (codhub_reconcile::build_router(state), pool, dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _pool, _dir) = create_test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "codhub-reconcile");
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_progress_of_unknown_tenant_is_idle() {
    let (app, _pool, _dir) = create_test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/sync/5/progress").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], 5);
    assert_eq!(body["phase"], "preparing");
    assert_eq!(body["version"], 0);
    assert_eq!(body["percentage"], 0);
    assert_eq!(body["is_running"], false);
}

#[tokio::test]
async fn test_trigger_accepts_without_body() {
    let (app, _pool, _dir) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sync/1/trigger")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert!(Uuid::parse_str(body["run_id"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_trigger_conflict_then_continuation() {
    let (app, pool, _dir) = create_test_app().await;
    let active_run = Uuid::new_v4();
    let now = Utc::now();
    sessions::try_acquire(&pool, 1, None, active_run, now, now - Duration::minutes(30))
        .await
        .unwrap()
        .unwrap();

    let refused = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sync/1/trigger")
                .header("content-type", "application/json")
                .body(Body::from(json!({}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(refused.status(), StatusCode::CONFLICT);
    let body = body_json(refused).await;
    assert_eq!(body["error"]["code"], "CONFLICT");

    let continued = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sync/1/trigger")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "continuation": active_run }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(continued.status(), StatusCode::ACCEPTED);
    let body = body_json(continued).await;
    assert_ne!(body["run_id"], json!(active_run));
}

#[tokio::test]
async fn test_reset_endpoint_releases_session() {
    let (app, pool, _dir) = create_test_app().await;
    let now = Utc::now();
    sessions::try_acquire(&pool, 3, None, Uuid::new_v4(), now, now - Duration::minutes(30))
        .await
        .unwrap()
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sync/3/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_running"], false);
    assert!(body["run_id"].is_null());
    assert!(!has_running_session(&pool, 3).await.unwrap());
}

#[tokio::test]
async fn test_non_numeric_user_id_is_rejected() {
    let (app, _pool, _dir) = create_test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/sync/abc/progress").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_event_stream_is_sse() {
    let (app, _pool, _dir) = create_test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/sync/events?user_id=1").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));
}
