//! Berth webhook service.
//!
//! Configuration comes from the environment; see `WebhookConfig::from_env`,
//! `RuntimeConfig::from_env` and `ControlConfig::from_env`.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use berth_control::{ControlConfig, DeploymentRegistry, DeploymentWorkflow};
use berth_gateway::{create_router, WebhookConfig, WebhookState};
use berth_runtime::{ProcessRunner, RuntimeConfig};
use berth_store::{FileConfigStore, TenantLayout};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,berth=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting berth webhook");

    let webhook_config = WebhookConfig::from_env();
    let runtime = RuntimeConfig::from_env();
    let control_config = ControlConfig::from_env();

    tracing::info!(
        listen_addr = %webhook_config.listen_addr,
        mode = %webhook_config.mode,
        tenants_root = %runtime.tenants_root.display(),
        domain = %runtime.domain,
        "Webhook configuration loaded"
    );
    if runtime.hosts_sudo_pass.is_none() {
        tracing::warn!("HOSTS_SUDO_PASS not set; hosts entries need a writable hosts file");
    }

    let store = Arc::new(FileConfigStore::new(
        TenantLayout::new(runtime.tenants_root.clone()),
        runtime.domain.clone(),
    ));
    let runner = Arc::new(ProcessRunner::new(runtime.command_timeout));
    let registry = Arc::new(DeploymentRegistry::new(control_config.product.clone()));
    let workflow = Arc::new(DeploymentWorkflow::new(store, runner, runtime, control_config)?);

    let listen_addr = webhook_config.listen_addr.clone();
    let (state, _worker) = WebhookState::new(workflow, registry, webhook_config);
    let app = create_router(state);

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
