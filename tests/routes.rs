//! Routing tests for the authentication and authorization gates.
//!
//! The pool is created lazily and never connects: every request here is
//! expected to be rejected (or fail validation) before any query runs.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{
        Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use comanda::{auth, config::Config, router, state::AppState};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "routing-test-secret";

fn test_state() -> Arc<AppState> {
    let config = Config {
        port: 0,
        database_url: "postgres://localhost/unused".to_string(),
        jwt_secret: SECRET.to_string(),
    };
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();

    Arc::new(AppState { config, pool })
}

fn bearer(role: &str) -> String {
    let token = auth::issue_token(SECRET, Uuid::new_v4(), "Tester", role).unwrap();
    format!("Bearer {token}")
}

#[tokio::test]
async fn test_protected_route_without_token_is_unauthenticated() {
    let app = router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/users/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_scheme_is_unauthenticated() {
    let app = router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/users/me")
                .header(AUTHORIZATION, "Token abc123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_garbage_token_is_unauthenticated() {
    let app = router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/users/me")
                .header(AUTHORIZATION, "Bearer not.a.token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_client_token_on_admin_route_is_forbidden() {
    let app = router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/users")
                .header(AUTHORIZATION, bearer("CLIENT"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_client_token_cannot_update_order_status() {
    let app = router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/orders/{}/status", Uuid::new_v4()))
                .header(AUTHORIZATION, bearer("CLIENT"))
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"status":"PREPARING"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_passes_gate_but_unknown_status_is_rejected() {
    let app = router(test_state());

    // The status is parsed before any query, so the handler answers without a
    // database.
    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/orders/{}/status", Uuid::new_v4()))
                .header(AUTHORIZATION, bearer("ADMIN"))
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"status":"TELEPORTED"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_role_token_is_unauthenticated() {
    let app = router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/users/me")
                .header(AUTHORIZATION, bearer("SUPERUSER"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
