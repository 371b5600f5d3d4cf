//! Container runtime, templating and probing for berth deployments.
//!
//! This crate wraps every external tool berth drives and renders the files
//! those tools consume:
//!
//! - [`CommandRunner`]: typed program execution with captured output and timeouts
//! - [`RepositoryFetcher`]: destructive `git clone` into a tenant directory
//! - [`render`]: compose, nginx and env file rendering
//! - [`ComposeClient`]: sequenced `up`/`stop`/`down`/`exec` against compose and docker
//! - [`HealthProber`]: bounded HTTP readiness polling
//! - [`HostsRegistrar`]: best-effort hosts file registration
//! - [`AppPlugin`]: lifecycle of plugin-managed applications
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                   Deployment Workflow                     │
//! └───────────────────────────────────────────────────────────┘
//!        │            │              │             │
//!        ▼            ▼              ▼             ▼
//!  ┌──────────┐ ┌───────────┐ ┌────────────┐ ┌────────────┐
//!  │Repository│ │  render   │ │  Compose   │ │  Health    │
//!  │ Fetcher  │ │ (compose, │ │  Client    │ │  Prober    │
//!  │          │ │ nginx,env)│ │            │ │            │
//!  └──────────┘ └───────────┘ └────────────┘ └────────────┘
//!        │                           │             │
//!        └──────────┬────────────────┘             ▼
//!                   ▼                        HTTP endpoints
//!            CommandRunner
//!        (git, docker, compose)
//! ```
//!
//! # Testing
//!
//! With the `test-utils` feature, `RecordingRunner` records commands instead
//! of running them and simulates `git clone` on the filesystem:
//!
//! ```ignore
//! use std::sync::Arc;
//! use berth_runtime::{ComposeBinary, ComposeClient, RecordingRunner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runner = Arc::new(RecordingRunner::new());
//! let compose = ComposeClient::new(ComposeBinary::Standalone, runner.clone());
//!
//! compose.down("tenants/acme/docker-compose.yml".as_ref()).await?;
//! assert_eq!(runner.commands(), vec!["docker-compose -f docker-compose.yml down"]);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod command;
pub mod compose;
pub mod error;
pub mod fetch;
pub mod health;
pub mod hosts;
pub mod orchestrator;
pub mod plugins;
pub mod render;
pub mod types;

pub use command::{non_fatal, CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use compose::ComposeFile;
pub use error::{Result, RuntimeError};
pub use fetch::{app_name_from_url, RepositoryFetcher};
pub use health::HealthProber;
pub use hosts::{HostsOutcome, HostsRegistrar};
pub use orchestrator::ComposeClient;
pub use plugins::{detect_kind, AppKind, AppPlugin, DockerPlugin, NodePlugin, PluginSet};
pub use types::{ComposeBinary, RuntimeConfig};

#[cfg(any(test, feature = "test-utils"))]
pub use command::mock::RecordingRunner;
