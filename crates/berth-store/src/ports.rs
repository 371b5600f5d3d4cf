//! Port slot allocation.
//!
//! Each tenant owns one slot in `0..SLOT_COUNT`. The slot fixes all three of
//! its host ports:
//!
//! | Port     | Value                 |
//! |----------|-----------------------|
//! | backend  | `BACKEND_BASE + slot` |
//! | frontend | `FRONTEND_BASE + slot`|
//! | nginx    | `NGINX_BASE + slot`   |
//!
//! The preferred slot is a blake3 hash of the tenant name, so a tenant gets the
//! same ports on every machine as long as nobody else holds them. Collisions
//! probe forward (wrapping) to the next slot not held by a persisted tenant.

use std::collections::BTreeSet;

use berth_core::TenantName;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Number of port slots.
pub const SLOT_COUNT: u16 = 1000;

/// First backend port.
pub const BACKEND_BASE: u16 = 5000;

/// First frontend port.
pub const FRONTEND_BASE: u16 = 6000;

/// First nginx port.
pub const NGINX_BASE: u16 = 8000;

/// The host ports published for one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet {
    /// Host port mapped to the backend container.
    pub backend: u16,
    /// Host port mapped to the frontend container.
    pub frontend: u16,
    /// Host port mapped to the nginx container.
    pub nginx: u16,
}

impl PortSet {
    /// The ports belonging to `slot`.
    #[must_use]
    pub const fn for_slot(slot: u16) -> Self {
        Self {
            backend: BACKEND_BASE + slot,
            frontend: FRONTEND_BASE + slot,
            nginx: NGINX_BASE + slot,
        }
    }
}

/// The slot a port falls into, if it lies inside one of the managed bands.
#[must_use]
pub fn slot_of(port: u16) -> Option<u16> {
    [BACKEND_BASE, FRONTEND_BASE, NGINX_BASE]
        .into_iter()
        .find(|base| (*base..*base + SLOT_COUNT).contains(&port))
        .map(|base| port - base)
}

/// The hash-derived slot a tenant prefers.
#[must_use]
pub fn preferred_slot(tenant: &TenantName) -> u16 {
    let hash = blake3::hash(tenant.as_str().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    let slot = u64::from_le_bytes(head) % u64::from(SLOT_COUNT);
    u16::try_from(slot).unwrap_or_default()
}

/// Tracks which slots are taken and hands out free ones.
#[derive(Debug, Default, Clone)]
pub struct PortAllocator {
    taken: BTreeSet<u16>,
}

impl PortAllocator {
    /// Create an allocator with no slots taken.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the slot a persisted port falls into as taken.
    ///
    /// Ports outside the managed bands are ignored.
    pub fn reserve_port(&mut self, port: u16) {
        if let Some(slot) = slot_of(port) {
            self.taken.insert(slot);
        }
    }

    /// Number of slots currently taken.
    #[must_use]
    pub fn taken(&self) -> usize {
        self.taken.len()
    }

    /// Pick the first free slot at or after the tenant's preferred slot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PortsExhausted` if every slot is taken.
    pub fn allocate(&self, tenant: &TenantName) -> Result<u16> {
        let start = preferred_slot(tenant);
        (0..SLOT_COUNT)
            .map(|offset| (start + offset) % SLOT_COUNT)
            .find(|slot| !self.taken.contains(slot))
            .ok_or(StoreError::PortsExhausted(self.taken.len()))
    }
}
