//! HTTP request handlers.

pub mod deploy;
pub mod deployments;
pub mod health;
