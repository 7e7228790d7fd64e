//! HTTP API for the postcode checker
//!
//! Serves the checker page and a small JSON API over the shared service.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod handlers;
pub mod service;

pub use service::{CheckOutcome, CheckerService};

pub fn create_router(service: Arc<CheckerService>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Page
        .route("/", get(handlers::page))
        // JSON API
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/check", get(handlers::check))
        .route("/api/v1/reference", get(handlers::reference_status))
        .route("/api/v1/reference/refresh", post(handlers::refresh_reference))
        // State and middleware
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
