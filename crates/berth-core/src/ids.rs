//! Core identifier types for berth.
//!
//! Tenant names end up in container names, compose service keys, SQL
//! identifiers, hostnames and filesystem paths, so they are validated once at
//! the edge and carried around as [`TenantName`] afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a tenant name.
///
/// Leaves room for the longest derived name (`<tenant>_transactional`) to stay
/// under Postgres' 63-byte identifier limit.
pub const MAX_TENANT_NAME_LEN: usize = 48;

/// Prefix of every deployment identifier.
const DEPLOYMENT_ID_PREFIX: &str = "CD";

/// Errors produced when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The tenant name was empty.
    #[error("tenant name must not be empty")]
    EmptyTenant,

    /// The tenant name exceeded [`MAX_TENANT_NAME_LEN`].
    #[error("tenant name too long: {len} characters (max {max})")]
    TenantTooLong {
        /// Actual length.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// The tenant name contained a character outside `[a-z0-9_-]`.
    #[error("invalid character {0:?} in tenant name")]
    InvalidTenantChar(char),

    /// The tenant name did not start with a letter or digit.
    #[error("tenant name must start with a lowercase letter or digit")]
    InvalidTenantStart,

    /// The deployment ID was not of the form `CD00001`.
    #[error("invalid deployment id: {0}")]
    InvalidDeploymentId(String),
}

/// A validated tenant name.
///
/// Allowed characters are lowercase ASCII letters, digits, `_` and `-`; the
/// first character must be a letter or digit.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantName(String);

impl TenantName {
    /// Parse and validate a tenant name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, too long, or contains characters
    /// that are unsafe in container names or paths.
    pub fn new(name: impl Into<String>) -> Result<Self, IdError> {
        let name = name.into();
        if name.is_empty() {
            return Err(IdError::EmptyTenant);
        }
        if name.len() > MAX_TENANT_NAME_LEN {
            return Err(IdError::TenantTooLong {
                len: name.len(),
                max: MAX_TENANT_NAME_LEN,
            });
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
        {
            return Err(IdError::InvalidTenantChar(c));
        }
        if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(IdError::InvalidTenantStart);
        }
        Ok(Self(name))
    }

    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of a tenant-scoped container or service, e.g. `acme_backend`.
    #[must_use]
    pub fn container(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.0)
    }
}

impl fmt::Debug for TenantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantName({})", self.0)
    }
}

impl fmt::Display for TenantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantName {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantName> for String {
    fn from(name: TenantName) -> Self {
        name.0
    }
}

impl AsRef<str> for TenantName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Sequential identifier of a queued deployment.
///
/// Rendered as `CD` followed by the sequence number zero-padded to five
/// digits. Numbers past 99999 keep growing in width rather than wrapping.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeploymentId(u64);

impl DeploymentId {
    /// Create a deployment ID from its sequence number.
    #[must_use]
    pub const fn from_seq(seq: u64) -> Self {
        Self(seq)
    }

    /// Return the sequence number.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeploymentId({self})")
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DEPLOYMENT_ID_PREFIX}{:05}", self.0)
    }
}

impl FromStr for DeploymentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix(DEPLOYMENT_ID_PREFIX)
            .filter(|d| d.len() >= 5 && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| IdError::InvalidDeploymentId(s.to_string()))?;
        digits
            .parse()
            .map(Self)
            .map_err(|_| IdError::InvalidDeploymentId(s.to_string()))
    }
}

impl TryFrom<String> for DeploymentId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeploymentId> for String {
    fn from(id: DeploymentId) -> Self {
        id.to_string()
    }
}
