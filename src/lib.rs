//! Restaurant ordering backend.
//!
//! HTTP/JSON REST API for a small restaurant: accounts, menu catalog
//! (categories and items), per-user address book, and order placement with
//! fulfillment tracking.
//!
//!
//!
//! # Architecture
//!
//! - One binary, one Postgres database. Migrations are embedded and run at
//!   startup.
//! - Every request is handled independently on the tokio runtime; the only
//!   shared state is the connection pool and the immutable [`config::Config`].
//! - Authentication is a stateless bearer token (HS256, 8 hour expiry)
//!   checked by extractors in [`auth`]; role-restricted routes layer a second
//!   admin gate on top.
//! - Failures are tagged variants of [`error::AppError`]; the boundary maps
//!   kind to status code in one place.
//!
//!
//!
//! # Environment
//!
//! | Variable       | Required | Default |
//! |----------------|----------|---------|
//! | `PORT`         | no       | 3333    |
//! | `DATABASE_URL` | yes      | —       |
//! | `JWT_SECRET`   | yes      | —       |
//!
//! Missing required variables abort startup; no route can verify a token
//! without the secret, so there is nothing useful to serve.
//!
//!
//!
//! # Routes
//!
//! Public: `POST /users`, `POST /users/login`, `GET /categories[/:id]`,
//! `GET /items[/:id]`.
//!
//! Authenticated: `/users/me*`, `/addresses*`, `POST|GET /orders`,
//! `GET /orders/:id`.
//!
//! Admin: `/users` by id, mutations under `/categories` and `/items`,
//! `PATCH /orders/:id/status`.

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, patch, post, put},
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod addresses;
pub mod auth;
pub mod categories;
pub mod config;
pub mod database;
pub mod error;
pub mod items;
pub mod orders;
pub mod state;
pub mod users;

use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/users", post(users::register).get(users::list))
        .route("/users/login", post(users::login))
        .route(
            "/users/me",
            get(users::get_me).put(users::update_me).delete(users::delete_me),
        )
        .route("/users/me/password", put(users::change_password))
        .route(
            "/users/:id",
            get(users::get_by_id)
                .put(users::update_by_id)
                .delete(users::delete_by_id),
        )
        .route("/categories", get(categories::list).post(categories::create))
        .route(
            "/categories/:id",
            get(categories::get_by_id)
                .put(categories::update)
                .delete(categories::delete),
        )
        .route("/items", get(items::list).post(items::create))
        .route(
            "/items/:id",
            get(items::get_by_id).put(items::update).delete(items::delete),
        )
        .route("/addresses", post(addresses::create).get(addresses::list))
        .route(
            "/addresses/:id",
            get(addresses::get_by_id)
                .put(addresses::update)
                .delete(addresses::delete),
        )
        .route("/orders", post(orders::create).get(orders::list))
        .route("/orders/:id", get(orders::get_by_id))
        .route("/orders/:id/status", patch(orders::update_status))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");
    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
