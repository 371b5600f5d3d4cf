//! Queued deployments executed one at a time by a background worker.

use std::sync::Arc;

use berth_core::DeploymentId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{ControlError, Result};
use crate::registry::DeploymentRegistry;
use crate::types::{DeploySpec, DeploymentRecord, DeploymentStatus};
use crate::workflow::Deployer;

struct Job {
    id: DeploymentId,
    spec: DeploySpec,
}

/// Accepts deployments and hands them to the single worker.
///
/// Deployments run strictly in submission order; a new one starts only
/// after the previous one has completed or failed.
#[derive(Clone)]
pub struct DeploymentQueue {
    registry: Arc<DeploymentRegistry>,
    sender: mpsc::UnboundedSender<Job>,
}

impl DeploymentQueue {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(registry: Arc<DeploymentRegistry>, deployer: Arc<dyn Deployer>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(receiver, registry.clone(), deployer));
        (Self { registry, sender }, worker)
    }

    /// Get the registry this queue records into.
    #[must_use]
    pub fn registry(&self) -> &Arc<DeploymentRegistry> {
        &self.registry
    }

    /// Record a pending deployment and queue it for the worker.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::QueueClosed` if the worker has stopped; the
    /// record is marked failed in that case.
    pub fn submit(&self, spec: DeploySpec) -> Result<DeploymentRecord> {
        let record = self.registry.enqueue(spec.tenant.clone());
        info!(
            deployment = %record.id,
            tenant = %record.tenant,
            queue_length = self.registry.queue_length(),
            "Deployment queued"
        );

        if self.sender.send(Job { id: record.id, spec }).is_err() {
            self.registry
                .finish(record.id, DeploymentStatus::Failed, "Deployment queue is closed")?;
            return Err(ControlError::QueueClosed);
        }
        Ok(record)
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    registry: Arc<DeploymentRegistry>,
    deployer: Arc<dyn Deployer>,
) {
    while let Some(job) = receiver.recv().await {
        registry.set_processing(true);
        let id = job.id;
        // Each job runs on its own task so a panicking phase fails the
        // deployment instead of killing the worker.
        let task = tokio::spawn(run_job(registry.clone(), deployer.clone(), job));
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(deployment = %id, error = %e, "Deployment bookkeeping failed"),
            Err(e) => {
                error!(deployment = %id, error = %e, "Deployment task aborted");
                if let Err(e) =
                    registry.finish(id, DeploymentStatus::Failed, format!("Deployment aborted: {e}"))
                {
                    error!(deployment = %id, error = %e, "Could not mark deployment failed");
                }
            }
        }
        registry.set_processing(false);
    }
    info!("Deployment worker stopped");
}

async fn run_job(registry: Arc<DeploymentRegistry>, deployer: Arc<dyn Deployer>, job: Job) -> Result<()> {
    let Job { id, spec } = job;
    registry.begin(id)?;
    info!(deployment = %id, tenant = %spec.tenant, "Starting deployment");

    let backend = match deployer.deploy_backend(&spec.tenant, &spec.backend).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(
                deployment = %id,
                error = %e,
                retriable = e.is_retriable(),
                "Backend deployment failed"
            );
            registry.record_backend(id, false, None)?;
            registry.finish(
                id,
                DeploymentStatus::Failed,
                format!("Backend deployment failed: {e}"),
            )?;
            return Ok(());
        }
    };
    registry.record_backend(id, true, Some(backend.backend_url))?;

    match deployer.deploy_frontend(&spec.tenant, &spec.frontend).await {
        Ok(outcome) => {
            registry.record_frontend(
                id,
                true,
                Some(outcome.urls.frontend.clone()),
                Some(outcome.urls.api.clone()),
            )?;
            registry.finish(
                id,
                DeploymentStatus::Completed,
                "Deployment completed successfully",
            )?;
            info!(deployment = %id, frontend = %outcome.urls.frontend, "Deployment completed");
        }
        Err(e) => {
            error!(
                deployment = %id,
                error = %e,
                retriable = e.is_retriable(),
                "Frontend deployment failed"
            );
            registry.record_frontend(id, false, None, None)?;
            registry.finish(
                id,
                DeploymentStatus::Failed,
                format!("Frontend deployment failed: {e}"),
            )?;
        }
    }
    Ok(())
}
