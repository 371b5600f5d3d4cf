//! Deployment control for berth.
//!
//! This crate turns the runtime building blocks into the operations users
//! invoke:
//!
//! - [`DeploymentWorkflow`]: the backend and frontend deployment phases
//! - [`DeploymentRegistry`] and [`DeploymentQueue`]: queued deployments with
//!   status tracking, executed by a single background worker
//! - [`TenantManager`]: tenant directories, start/stop, logs and
//!   plugin-driven app deploys
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌────────────────────┐
//! │ CLI/Webhook │────▶│ DeploymentQueue  │────▶│ DeploymentRegistry │
//! └─────────────┘     └──────────────────┘     └────────────────────┘
//!        │                     │ (worker)
//!        │                     ▼
//!        │            ┌──────────────────┐
//!        └───────────▶│     Deployer     │
//!                     └──────────────────┘
//!                              │
//!          ┌───────────┬───────┴─────┬─────────────┐
//!          ▼           ▼             ▼             ▼
//!     ConfigStore   Fetcher   ComposeClient   HealthProber
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use berth_control::{ControlConfig, DeploymentQueue, DeploymentRegistry, DeploymentWorkflow};
//! use berth_runtime::{ProcessRunner, RuntimeConfig};
//! use berth_store::{FileConfigStore, TenantLayout};
//!
//! let runtime = RuntimeConfig::from_env();
//! let store = Arc::new(FileConfigStore::new(
//!     TenantLayout::new(runtime.tenants_root.clone()),
//!     runtime.domain.clone(),
//! ));
//! let runner = Arc::new(ProcessRunner::new(runtime.command_timeout));
//! let workflow = Arc::new(DeploymentWorkflow::new(store, runner, runtime, ControlConfig::from_env())?);
//!
//! let registry = Arc::new(DeploymentRegistry::new("vsync"));
//! let (queue, _worker) = DeploymentQueue::spawn(registry, workflow);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod lifecycle;
pub mod queue;
pub mod registry;
pub mod tenants;
pub mod types;
pub mod workflow;

pub use error::{ControlError, Result};
pub use queue::DeploymentQueue;
pub use registry::DeploymentRegistry;
pub use tenants::{AppReport, DeployedApp, TenantInfo, TenantManager, TenantReport};
pub use types::{
    AccessUrls, BackendOutcome, ControlConfig, DeployRequest, DeploySpec, DeploymentRecord,
    DeploymentStatus, FrontendOutcome, QueueEntry, RepoRef,
};
pub use workflow::{Deployer, DeploymentWorkflow};

#[cfg(any(test, feature = "test-utils"))]
pub use workflow::mock::MockDeployer;
