//! Health check and root endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::WebhookState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Human-readable message.
    pub message: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Root endpoint response.
#[derive(Debug, Serialize)]
pub struct RootResponse {
    /// Service status.
    pub status: &'static str,
    /// Human-readable message.
    pub message: &'static str,
    /// Deployment mode.
    pub mode: String,
    /// Available endpoints and what they do.
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

/// Health check handler.
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {"status": "ok", "message": "Deployment API is running", "version": "0.1.0"}
/// ```
pub async fn health() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok",
        message: "Deployment API is running",
        version: env!("CARGO_PKG_VERSION"),
    };

    (StatusCode::OK, Json(response))
}

/// Root handler listing the endpoints.
pub async fn root(State(state): State<Arc<WebhookState>>) -> Json<RootResponse> {
    let endpoints = BTreeMap::from([
        ("/deploy", "POST - Start a new deployment"),
        ("/deployments/:id", "GET - Get deployment status"),
        ("/deployments", "GET - List all deployments"),
        ("/queue", "GET - View deployment queue"),
        ("/health", "GET - Health check"),
    ]);
    Json(RootResponse {
        status: "ok",
        message: "Deployment API root endpoint",
        mode: state.config.mode.to_string(),
        endpoints,
    })
}
