//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{deploy, deployments, health};
use crate::state::WebhookState;

/// Create the webhook router with all routes and middleware.
///
/// # Routes
///
/// - `GET /` - Endpoint listing
/// - `GET /health` - Health check
/// - `POST /deploy` - Start a deployment
/// - `GET /deployments` - List deployments
/// - `GET /deployments/:id` - Get a deployment
/// - `GET /queue` - Pending queue
pub fn create_router(state: WebhookState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/deploy", post(deploy::deploy))
        .route("/deployments", get(deployments::list_deployments))
        .route("/deployments/:id", get(deployments::get_deployment))
        .route("/queue", get(deployments::get_queue))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
