//! Tenant configuration store for berth.
//!
//! Each tenant has one YAML file at `tenants/<t>/config/tenant_config.yaml`
//! holding its generated secrets, host ports and derived names. The file is
//! created on first use and only ever extended afterwards: secrets and ports,
//! once written, are reused by every later deployment.
//!
//! # Example
//!
//! ```no_run
//! use berth_core::TenantName;
//! use berth_store::{ConfigStore, FileConfigStore, TenantLayout};
//!
//! let store = FileConfigStore::new(TenantLayout::new("tenants"), "vsync");
//! let tenant = TenantName::new("acme").unwrap();
//!
//! let config = store.load_or_create(&tenant).unwrap();
//! println!("backend on port {}", config.backend_port);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod file;
pub mod layout;
pub mod ports;
pub mod secrets;
pub mod types;

pub use error::{Result, StoreError};
pub use file::FileConfigStore;
pub use layout::TenantLayout;
pub use ports::{PortAllocator, PortSet};
pub use types::TenantConfig;

use berth_core::TenantName;

/// The storage trait for tenant configuration.
///
/// This trait abstracts the storage layer so the workflow can be exercised
/// against a temporary directory in tests.
pub trait ConfigStore: Send + Sync {
    /// The directory layout this store writes into.
    fn layout(&self) -> &TenantLayout;

    /// Read a tenant's config without creating or modifying anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load(&self, tenant: &TenantName) -> Result<Option<TenantConfig>>;

    /// Read a tenant's config, filling in and persisting any missing fields.
    ///
    /// Existing secrets and ports are never replaced. A malformed file is
    /// logged and treated as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged config cannot be written or no port
    /// slot is free.
    fn load_or_create(&self, tenant: &TenantName) -> Result<TenantConfig>;

    /// Overwrite a tenant's config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn save(&self, tenant: &TenantName, config: &TenantConfig) -> Result<()>;

    /// List every tenant directory under the root, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be read.
    fn list_tenants(&self) -> Result<Vec<TenantName>>;
}
