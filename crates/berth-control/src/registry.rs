//! In-memory deployment bookkeeping shared by HTTP handlers and the queue worker.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use berth_core::{DeploymentId, TenantName};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::error::{ControlError, Result};
use crate::lifecycle;
use crate::types::{DeploymentRecord, DeploymentStatus, QueueEntry};

/// Deployment records, the id counter and the pending queue.
///
/// Records are never removed for the lifetime of the registry. Ids are
/// issued from a single counter, so they are sequential across tenants.
pub struct DeploymentRegistry {
    product: String,
    counter: AtomicU64,
    records: RwLock<BTreeMap<DeploymentId, DeploymentRecord>>,
    queue: Mutex<VecDeque<DeploymentId>>,
    processing: AtomicBool,
}

impl DeploymentRegistry {
    /// Create an empty registry labelling records with `product`.
    #[must_use]
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            counter: AtomicU64::new(0),
            records: RwLock::new(BTreeMap::new()),
            queue: Mutex::new(VecDeque::new()),
            processing: AtomicBool::new(false),
        }
    }

    /// Product label attached to records.
    #[must_use]
    pub fn product(&self) -> &str {
        &self.product
    }

    fn next_id(&self) -> DeploymentId {
        DeploymentId::from_seq(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Record a new pending deployment for `tenant` and append it to the queue.
    pub fn enqueue(&self, tenant: TenantName) -> DeploymentRecord {
        let id = self.next_id();
        let record = DeploymentRecord::pending(id, tenant, self.product.clone());
        self.records.write().insert(id, record.clone());
        self.queue.lock().push_back(id);
        record
    }

    /// Get a deployment by id.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::DeploymentNotFound` for unknown ids.
    pub fn get(&self, id: DeploymentId) -> Result<DeploymentRecord> {
        self.records
            .read()
            .get(&id)
            .cloned()
            .ok_or(ControlError::DeploymentNotFound(id))
    }

    /// Every deployment, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<DeploymentRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Number of deployments waiting for the worker.
    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.queue.lock().len()
    }

    /// Waiting deployments in queue order.
    #[must_use]
    pub fn queue(&self) -> Vec<QueueEntry> {
        let queue = self.queue.lock().clone();
        let records = self.records.read();
        queue
            .into_iter()
            .enumerate()
            .filter_map(|(i, id)| {
                records.get(&id).map(|record| QueueEntry {
                    id,
                    tenant: record.tenant.clone(),
                    position: i + 1,
                    created_at: Some(record.created_at),
                })
            })
            .collect()
    }

    /// Whether the worker is running a deployment.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Set by the worker around each deployment.
    pub fn set_processing(&self, processing: bool) {
        self.processing.store(processing, Ordering::SeqCst);
    }

    /// Remove `id` from the queue and mark it running.
    ///
    /// # Errors
    ///
    /// Returns an error if the deployment is unknown or not pending.
    pub fn begin(&self, id: DeploymentId) -> Result<DeploymentRecord> {
        let record = self.update(id, |record| {
            record.status =
                lifecycle::validate_transition(id, record.status, DeploymentStatus::Running)?;
            record.start_time = Some(Utc::now());
            record.message = "Deployment running".to_string();
            Ok(())
        })?;
        self.dequeue(id);
        Ok(record)
    }

    /// Record the end of the backend phase.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::DeploymentNotFound` for unknown ids.
    pub fn record_backend(
        &self,
        id: DeploymentId,
        success: bool,
        backend_url: Option<String>,
    ) -> Result<DeploymentRecord> {
        self.update(id, |record| {
            record.backend_complete = true;
            record.backend_success = success;
            if backend_url.is_some() {
                record.backend_url = backend_url;
            }
            Ok(())
        })
    }

    /// Record the end of the frontend phase.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::DeploymentNotFound` for unknown ids.
    pub fn record_frontend(
        &self,
        id: DeploymentId,
        success: bool,
        frontend_url: Option<String>,
        backend_url: Option<String>,
    ) -> Result<DeploymentRecord> {
        self.update(id, |record| {
            record.frontend_complete = true;
            record.frontend_success = success;
            if frontend_url.is_some() {
                record.frontend_url = frontend_url;
            }
            if backend_url.is_some() {
                record.backend_url = backend_url;
            }
            Ok(())
        })
    }

    /// Move a deployment to `Completed` or `Failed` with a final message.
    ///
    /// # Errors
    ///
    /// Returns an error if the deployment is unknown or the transition is not allowed.
    pub fn finish(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
        message: impl Into<String>,
    ) -> Result<DeploymentRecord> {
        let message = message.into();
        let record = self.update(id, |record| {
            record.status = lifecycle::validate_transition(id, record.status, status)?;
            record.end_time = Some(Utc::now());
            record.message = message;
            Ok(())
        })?;
        self.dequeue(id);
        Ok(record)
    }

    fn dequeue(&self, id: DeploymentId) {
        self.queue.lock().retain(|queued| *queued != id);
    }

    fn update(
        &self,
        id: DeploymentId,
        f: impl FnOnce(&mut DeploymentRecord) -> Result<()>,
    ) -> Result<DeploymentRecord> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or(ControlError::DeploymentNotFound(id))?;
        f(record)?;
        Ok(record.clone())
    }
}

impl Default for DeploymentRegistry {
    fn default() -> Self {
        Self::new("vsync")
    }
}
