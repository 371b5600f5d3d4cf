//! `POST /deploy`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use berth_control::{DeployRequest, DeploySpec};

use crate::config::WebhookMode;
use crate::error::ApiError;
use crate::state::WebhookState;

/// Response for a queued deployment.
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    /// Always `pending`.
    pub status: &'static str,
    /// Human-readable message.
    pub message: &'static str,
    /// Identifier to poll `GET /deployments/:id` with.
    pub deployment_id: String,
    /// Tenant being deployed.
    pub tenant: String,
    /// When the deployment was accepted.
    pub created_at: DateTime<Utc>,
    /// Product label.
    pub product: String,
}

/// Response for a deployment run inside the request.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    /// `success` or `error`.
    pub status: &'static str,
    /// API URL through nginx, once the backend is deployed.
    pub backend_url: Option<String>,
    /// Frontend URL through nginx, once the frontend is deployed.
    pub frontend_url: Option<String>,
    /// Human-readable message.
    pub message: String,
}

/// Start a two-phase deployment.
///
/// # Example
///
/// ```text
/// POST /deploy
/// {"tenant": "acme", "backend_repo_url": "...", "backend_branch": "main",
///  "frontend_repo_url": "...", "frontend_branch": "main"}
///
/// Response (async mode): 200 OK
/// {"status": "pending", "message": "Deployment started", "deployment_id": "CD00001", ...}
/// ```
pub async fn deploy(
    State(state): State<Arc<WebhookState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let spec = match parse_request(&body).and_then(|req| req.validate().map_err(ApiError::from)) {
        Ok(spec) => spec,
        // Sync clients get one error shape for every failure.
        Err(e) if state.config.mode == WebhookMode::Sync => {
            return Ok(sync_error(e.status_code(), None, e.to_string()));
        }
        Err(e) => return Err(e),
    };

    match state.config.mode {
        WebhookMode::Async => {
            let record = state.queue.submit(spec)?;
            Ok(Json(QueuedResponse {
                status: "pending",
                message: "Deployment started",
                deployment_id: record.id.to_string(),
                tenant: record.tenant.to_string(),
                created_at: record.created_at,
                product: record.product,
            })
            .into_response())
        }
        WebhookMode::Sync => Ok(run_inline(&state, &spec).await),
    }
}

fn parse_request(body: &[u8]) -> Result<DeployRequest, ApiError> {
    let invalid = || ApiError::BadRequest("No JSON data provided or invalid JSON format".to_string());
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|_| invalid())?;
    if !value.is_object() {
        return Err(invalid());
    }
    serde_json::from_value(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request parameters: {e}")))
}

async fn run_inline(state: &WebhookState, spec: &DeploySpec) -> Response {
    info!(tenant = %spec.tenant, "Running deployment inline");

    let backend = match state.deployer.deploy_backend(&spec.tenant, &spec.backend).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(tenant = %spec.tenant, error = %e, "Backend deployment failed");
            return sync_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                format!("Backend deployment failed: {e}"),
            );
        }
    };

    match state.deployer.deploy_frontend(&spec.tenant, &spec.frontend).await {
        Ok(outcome) => Json(SyncResponse {
            status: "success",
            backend_url: Some(outcome.urls.api),
            frontend_url: Some(outcome.urls.frontend),
            message: "Deployment completed successfully".to_string(),
        })
        .into_response(),
        Err(e) => {
            error!(tenant = %spec.tenant, error = %e, "Frontend deployment failed");
            sync_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(backend.backend_url),
                format!("Frontend deployment failed: {e}"),
            )
        }
    }
}

fn sync_error(status: StatusCode, backend_url: Option<String>, message: String) -> Response {
    (
        status,
        Json(SyncResponse {
            status: "error",
            backend_url,
            frontend_url: None,
            message,
        }),
    )
        .into_response()
}
