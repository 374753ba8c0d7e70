pub mod auth;
pub mod cart;
pub mod config;
pub mod courses;
pub mod db;
pub mod edx;
pub mod error;
pub mod payment;

use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::json;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::edx::{EdxClient, HttpClient};

pub struct AppState {
    pub config: Config,
    pub db: SqlitePool,
    pub edx: EdxClient,
    pub http: HttpClient,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Accounts and sessions
        .route("/auth/register", post(auth::handlers::register))
        .route("/auth/login", post(auth::handlers::login))
        .route("/auth/logout", post(auth::handlers::logout))
        // Catalog and enrollment
        .route("/courses", get(courses::handlers::list))
        .route("/courses/{course_id}", get(courses::handlers::detail))
        .route("/courses/{course_id}/enroll", post(courses::handlers::enroll))
        .route("/enrollments", get(courses::handlers::enrollments))
        // Shopping cart
        .route("/cart", get(cart::handlers::view))
        .route(
            "/cart/items/{course_id}",
            post(cart::handlers::add).delete(cart::handlers::remove),
        )
        .route("/cart/clear", post(cart::handlers::clear))
        .route("/cart/checkout", get(cart::handlers::checkout))
        // Payment
        .route("/payment/intent", post(payment::handlers::create_intent))
        .route("/payment/webhook", post(payment::handlers::webhook))
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "edx_store"
    }))
}
