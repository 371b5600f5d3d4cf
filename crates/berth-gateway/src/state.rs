//! Webhook application state.

use std::sync::Arc;

use berth_control::{Deployer, DeploymentQueue, DeploymentRegistry};
use tokio::task::JoinHandle;

use crate::config::WebhookConfig;

/// Shared application state for the webhook handlers.
#[derive(Clone)]
pub struct WebhookState {
    /// Runs deployment phases; called inline in sync mode.
    pub deployer: Arc<dyn Deployer>,
    /// Accepts queued deployments in async mode.
    pub queue: DeploymentQueue,
    /// Webhook configuration.
    pub config: WebhookConfig,
}

impl WebhookState {
    /// Create the state and start the queue worker on the current runtime.
    #[must_use]
    pub fn new(
        deployer: Arc<dyn Deployer>,
        registry: Arc<DeploymentRegistry>,
        config: WebhookConfig,
    ) -> (Self, JoinHandle<()>) {
        let (queue, worker) = DeploymentQueue::spawn(registry, deployer.clone());
        (
            Self {
                deployer,
                queue,
                config,
            },
            worker,
        )
    }

    /// The deployment registry.
    #[must_use]
    pub fn registry(&self) -> &DeploymentRegistry {
        self.queue.registry()
    }
}
