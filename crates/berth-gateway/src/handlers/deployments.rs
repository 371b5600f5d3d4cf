//! Deployment status and queue endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use berth_control::{DeploymentRecord, QueueEntry};
use berth_core::DeploymentId;

use crate::error::ApiError;
use crate::state::WebhookState;

/// A deployment as listed by `GET /deployments`.
#[derive(Debug, Serialize)]
pub struct DeploymentSummary {
    /// The full record.
    #[serde(flatten)]
    pub record: DeploymentRecord,
    /// One-based queue position while pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
}

/// Response for `GET /deployments`.
#[derive(Debug, Serialize)]
pub struct ListDeploymentsResponse {
    /// Every deployment, oldest first.
    pub deployments: Vec<DeploymentSummary>,
    /// Deployments waiting for the worker.
    pub queue_length: usize,
}

/// Response for `GET /queue`.
#[derive(Debug, Serialize)]
pub struct QueueResponse {
    /// Deployments waiting for the worker.
    pub queue_length: usize,
    /// Whether the worker is running a deployment.
    pub is_processing: bool,
    /// Waiting deployments in order.
    pub queue: Vec<QueueEntry>,
}

/// Get one deployment.
///
/// Unknown or malformed ids are 404.
pub async fn get_deployment(
    State(state): State<Arc<WebhookState>>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentRecord>, ApiError> {
    let id: DeploymentId = id
        .parse()
        .map_err(|_| ApiError::NotFound("Deployment not found".to_string()))?;
    Ok(Json(state.registry().get(id)?))
}

/// List every deployment once, with queue positions for pending ones.
pub async fn list_deployments(State(state): State<Arc<WebhookState>>) -> Json<ListDeploymentsResponse> {
    let registry = state.registry();
    let queue = registry.queue();
    let positions: HashMap<DeploymentId, usize> =
        queue.iter().map(|entry| (entry.id, entry.position)).collect();

    let deployments = registry
        .list()
        .into_iter()
        .map(|record| DeploymentSummary {
            queue_position: positions.get(&record.id).copied(),
            record,
        })
        .collect();

    Json(ListDeploymentsResponse {
        deployments,
        queue_length: queue.len(),
    })
}

/// Show the pending queue.
pub async fn get_queue(State(state): State<Arc<WebhookState>>) -> Json<QueueResponse> {
    let registry = state.registry();
    let queue = registry.queue();
    Json(QueueResponse {
        queue_length: queue.len(),
        is_processing: registry.is_processing(),
        queue,
    })
}
