//! Error types for deployment control.
//!
//! This module defines every error a deployment phase, the deployment
//! registry or a tenant administration command can report.

use std::path::PathBuf;

use berth_core::{DeploymentId, TenantName};
use thiserror::Error;

use crate::types::DeploymentStatus;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in deployment control operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Required request fields were missing or empty, in declaration order.
    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingParameters(Vec<&'static str>),

    /// The tenant name or another identifier failed validation.
    #[error(transparent)]
    Core(#[from] berth_core::CoreError),

    /// The tenant has no directory under the tenants root.
    #[error("tenant {0} does not exist")]
    TenantNotFound(TenantName),

    /// The frontend phase ran before the backend phase produced a compose file.
    #[error("no compose file for tenant {0}; deploy the backend first")]
    BackendNotDeployed(TenantName),

    /// The requested deployment was not found.
    #[error("Deployment not found: {0}")]
    DeploymentNotFound(DeploymentId),

    /// The requested status transition is not valid.
    #[error("invalid status transition for deployment {id}: cannot transition from {from} to {to}")]
    InvalidTransition {
        /// The deployment being transitioned.
        id: DeploymentId,
        /// The current status.
        from: DeploymentStatus,
        /// The requested status.
        to: DeploymentStatus,
    },

    /// No plugin recognizes the application layout.
    #[error("no plugin can manage the application at {}", .0.display())]
    NoPlugin(PathBuf),

    /// The queue worker has stopped and cannot accept deployments.
    #[error("deployment queue is closed")]
    QueueClosed,

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] berth_store::StoreError),

    /// An external command or file operation failed.
    #[error("runtime error: {0}")]
    Runtime(#[from] berth_runtime::RuntimeError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<berth_core::IdError> for ControlError {
    fn from(err: berth_core::IdError) -> Self {
        Self::Core(err.into())
    }
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::MissingParameters(_) | Self::Core(_) => 400,
            Self::TenantNotFound(_) | Self::DeploymentNotFound(_) => 404,
            Self::BackendNotDeployed(_) | Self::InvalidTransition { .. } => 409,
            Self::NoPlugin(_) => 422,
            Self::QueueClosed => 503,
            Self::Store(_) | Self::Runtime(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Runtime(err) => err.is_retriable(),
            Self::QueueClosed => true,
            _ => false,
        }
    }
}
