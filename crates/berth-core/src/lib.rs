//! Core types for berth.
//!
//! This crate provides the identifiers shared by every other berth crate:
//!
//! - [`TenantName`]: a validated tenant identifier. Every container, network,
//!   volume, hostname and directory belonging to a tenant is derived from it.
//! - [`DeploymentId`]: the sequential identifier issued to queued deployments
//!   (`CD00001`, `CD00002`, ...).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;

pub use error::CoreError;
pub use ids::{DeploymentId, IdError, TenantName};
