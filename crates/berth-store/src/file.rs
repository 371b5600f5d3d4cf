//! File-backed configuration store.
//!
//! This module provides the `FileConfigStore` implementation of the `ConfigStore` trait.

use std::fs;
use std::path::Path;

use berth_core::TenantName;
use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::layout::TenantLayout;
use crate::ports::PortAllocator;
use crate::types::{raw_ports, RawConfig, TenantConfig};
use crate::ConfigStore;

/// Stores each tenant's configuration as YAML under the tenants tree.
pub struct FileConfigStore {
    layout: TenantLayout,
    domain: String,
    // Serializes read-allocate-write so two tenants created concurrently
    // cannot be handed the same port slot.
    write_lock: Mutex<()>,
}

impl FileConfigStore {
    /// Create a store over `layout`, deriving public hostnames under `domain`.
    pub fn new(layout: TenantLayout, domain: impl Into<String>) -> Self {
        Self {
            layout,
            domain: domain.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The domain tenant hostnames are derived under.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn read_raw(path: &Path) -> Result<Option<RawConfig>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        if contents.trim().is_empty() {
            return Ok(Some(RawConfig::new()));
        }
        serde_yaml::from_str(&contents)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn allocator_excluding(&self, tenant: &TenantName) -> Result<PortAllocator> {
        let mut allocator = PortAllocator::new();
        for other in self.list_tenants()? {
            if &other == tenant {
                continue;
            }
            match Self::read_raw(&self.layout.config_file(&other)) {
                Ok(Some(raw)) => raw_ports(&raw)
                    .into_iter()
                    .for_each(|port| allocator.reserve_port(port)),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(tenant = %other, error = %e, "Skipping unreadable tenant config");
                }
            }
        }
        Ok(allocator)
    }
}

impl ConfigStore for FileConfigStore {
    fn layout(&self) -> &TenantLayout {
        &self.layout
    }

    fn load(&self, tenant: &TenantName) -> Result<Option<TenantConfig>> {
        let path = self.layout.config_file(tenant);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        serde_yaml::from_str(&contents)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn load_or_create(&self, tenant: &TenantName) -> Result<TenantConfig> {
        let _guard = self.write_lock.lock();
        let path = self.layout.config_file(tenant);

        let raw = match Self::read_raw(&path) {
            Ok(Some(raw)) => {
                tracing::debug!(tenant = %tenant, path = %path.display(), "Read existing tenant config");
                raw
            }
            Ok(None) => RawConfig::new(),
            Err(e) => {
                tracing::warn!(
                    tenant = %tenant,
                    path = %path.display(),
                    error = %e,
                    "Tenant config unreadable, regenerating"
                );
                RawConfig::new()
            }
        };

        let config = TenantConfig::resolve(tenant, &self.domain, raw, || {
            self.allocator_excluding(tenant)?.allocate(tenant)
        })?;
        self.save(tenant, &config)?;

        tracing::info!(
            tenant = %tenant,
            backend_port = config.backend_port,
            frontend_port = config.frontend_port,
            nginx_port = config.nginx_port,
            "Tenant config ready"
        );
        Ok(config)
    }

    fn save(&self, tenant: &TenantName, config: &TenantConfig) -> Result<()> {
        let dir = self.layout.config_dir(tenant);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let yaml =
            serde_yaml::to_string(config).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let path = self.layout.config_file(tenant);
        fs::write(&path, yaml).map_err(|e| StoreError::io(&path, e))
    }

    fn list_tenants(&self) -> Result<Vec<TenantName>> {
        let root = self.layout.root();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(root, e)),
        };

        let mut tenants = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match TenantName::new(name.as_str()) {
                Ok(tenant) => tenants.push(tenant),
                Err(e) => tracing::debug!(dir = %name, error = %e, "Ignoring non-tenant directory"),
            }
        }
        tenants.sort();
        Ok(tenants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{preferred_slot, slot_of, PortSet};
    use tempfile::TempDir;

    fn create_test_store() -> (FileConfigStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FileConfigStore::new(TenantLayout::new(dir.path()), "vsync");
        (store, dir)
    }

    fn tenant(name: &str) -> TenantName {
        TenantName::new(name).unwrap()
    }

    #[test]
    fn load_missing_returns_none() {
        let (store, _dir) = create_test_store();
        assert!(store.load(&tenant("acme")).unwrap().is_none());
    }

    #[test]
    fn load_or_create_persists() {
        let (store, _dir) = create_test_store();
        let acme = tenant("acme");

        let created = store.load_or_create(&acme).unwrap();
        assert!(store.layout().config_file(&acme).exists());

        let loaded = store.load(&acme).unwrap().unwrap();
        assert_eq!(loaded, created);
    }

    #[test]
    fn successive_loads_are_identical() {
        let (store, _dir) = create_test_store();
        let acme = tenant("acme");

        let first = store.load_or_create(&acme).unwrap();
        let second = store.load_or_create(&acme).unwrap();

        assert_eq!(first.db_pass, second.db_pass);
        assert_eq!(first.redis_pass, second.redis_pass);
        assert_eq!(first.session_secret, second.session_secret);
        assert_eq!(first.ports(), second.ports());
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_keys_survive_rewrite() {
        let (store, _dir) = create_test_store();
        let acme = tenant("acme");
        let path = store.layout().config_file(&acme);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "db_pass: existing\nbilling_plan: gold\n").unwrap();

        let config = store.load_or_create(&acme).unwrap();
        assert_eq!(config.db_pass, "existing");

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("billing_plan: gold"));
        assert!(written.contains("db_pass: existing"));
    }

    #[test]
    fn malformed_file_is_regenerated() {
        let (store, _dir) = create_test_store();
        let acme = tenant("acme");
        let path = store.layout().config_file(&acme);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "::: not yaml [").unwrap();

        let config = store.load_or_create(&acme).unwrap();
        assert_eq!(config.db_name, "acme_db");
        assert!(store.load(&acme).unwrap().is_some());
    }

    #[test]
    fn tenants_get_distinct_slots() {
        let (store, _dir) = create_test_store();
        let names = ["acme", "globex", "initech", "umbrella", "hooli", "soylent"];

        let mut slots: Vec<u16> = names
            .iter()
            .map(|n| store.load_or_create(&tenant(n)).unwrap())
            .map(|c| slot_of(c.backend_port).unwrap())
            .collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), names.len());
    }

    #[test]
    fn taken_preferred_slot_moves_new_tenant() {
        let (store, _dir) = create_test_store();
        let acme = tenant("acme");
        let squatter = tenant("squatter");
        let preferred = preferred_slot(&acme);

        let mut taken = store.load_or_create(&squatter).unwrap();
        let ports = PortSet::for_slot(preferred);
        taken.backend_port = ports.backend;
        taken.frontend_port = ports.frontend;
        taken.nginx_port = ports.nginx;
        store.save(&squatter, &taken).unwrap();

        let config = store.load_or_create(&acme).unwrap();
        assert_ne!(slot_of(config.backend_port), Some(preferred));
    }

    #[test]
    fn list_tenants_skips_invalid_dirs() {
        let (store, dir) = create_test_store();
        store.load_or_create(&tenant("beta")).unwrap();
        store.load_or_create(&tenant("alpha")).unwrap();
        fs::create_dir_all(dir.path().join("Not A Tenant")).unwrap();
        fs::write(dir.path().join("stray.txt"), "x").unwrap();

        assert_eq!(
            store.list_tenants().unwrap(),
            vec![tenant("alpha"), tenant("beta")]
        );
    }
}
