//! HTTP webhook service for berth deployments.
//!
//! The webhook accepts a tenant and two repositories and runs the backend and
//! frontend deployment phases, either inside the request (sync mode) or on a
//! background worker that serializes deployments (async mode).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  CI systems / operators                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ POST /deploy
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       berth-gateway                         │
//! │   ┌───────────────┐  ┌──────────────┐  ┌────────────────┐   │
//! │   │ Router + CORS │  │   Handlers   │  │ Status/queue   │   │
//! │   │ limits, trace │  │ (sync/async) │  │   endpoints    │   │
//! │   └───────────────┘  └──────────────┘  └────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                │                               │
//!                ▼                               ▼
//!        ┌───────────────┐              ┌────────────────────┐
//!        │   Deployer    │◀── worker ───│ DeploymentRegistry │
//!        └───────────────┘              └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use berth_control::{ControlConfig, DeploymentRegistry, DeploymentWorkflow};
//! use berth_gateway::{create_router, WebhookConfig, WebhookState};
//! use berth_runtime::{ProcessRunner, RuntimeConfig};
//! use berth_store::{FileConfigStore, TenantLayout};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = RuntimeConfig::default();
//! let store = Arc::new(FileConfigStore::new(
//!     TenantLayout::new(runtime.tenants_root.clone()),
//!     runtime.domain.clone(),
//! ));
//! let runner = Arc::new(ProcessRunner::new(runtime.command_timeout));
//! let workflow = DeploymentWorkflow::new(store, runner, runtime, ControlConfig::default())?;
//!
//! let (state, _worker) = WebhookState::new(
//!     Arc::new(workflow),
//!     Arc::new(DeploymentRegistry::new("vsync")),
//!     WebhookConfig::default(),
//! );
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:9000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{WebhookConfig, WebhookMode};
pub use error::ApiError;
pub use routes::create_router;
pub use state::WebhookState;
