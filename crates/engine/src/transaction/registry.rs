//! Branch pool registry and branch acquisition
//!
//! Callers address a resource manager either by descriptor or by holding a
//! data source handle, so two independent maps exist:
//! - descriptor → pool, where the pool's data source comes from the driver
//! - handle identity → pool, where the caller's data source is used directly
//!
//! Both follow the same pool-per-target discipline. Pool creation is mutually
//! exclusive per key through the map entry lock.

use super::branch::BranchConnection;
use super::context::Transaction;
use super::pool::BranchPool;
use dashmap::DashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};
use xapool_core::{Driver, Phase, TargetDescriptor, TargetHandle, XaError, XaResult};
use xapool_pool::DEFAULT_MAX_IDLE;

/// How a branch acquisition names its resource manager
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BranchTarget {
    /// Resolve through the driver by descriptor
    Descriptor(TargetDescriptor),
    /// Use a caller-held data source, keyed by identity
    Handle(TargetHandle),
}

impl From<TargetDescriptor> for BranchTarget {
    fn from(target: TargetDescriptor) -> Self {
        BranchTarget::Descriptor(target)
    }
}

impl From<&TargetDescriptor> for BranchTarget {
    fn from(target: &TargetDescriptor) -> Self {
        BranchTarget::Descriptor(target.clone())
    }
}

impl From<TargetHandle> for BranchTarget {
    fn from(handle: TargetHandle) -> Self {
        BranchTarget::Handle(handle)
    }
}

impl From<&TargetHandle> for BranchTarget {
    fn from(handle: &TargetHandle) -> Self {
        BranchTarget::Handle(handle.clone())
    }
}

impl FromStr for BranchTarget {
    type Err = XaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(BranchTarget::Descriptor)
    }
}

/// Registry of [`BranchPool`]s keyed by descriptor and by handle identity
pub struct BranchPoolRegistry {
    driver: Arc<dyn Driver>,
    by_descriptor: DashMap<TargetDescriptor, Arc<BranchPool>>,
    by_handle: DashMap<TargetHandle, Arc<BranchPool>>,
    max_idle: usize,
}

impl BranchPoolRegistry {
    /// Registry whose pools keep up to [`DEFAULT_MAX_IDLE`] idle connections
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_max_idle(driver, DEFAULT_MAX_IDLE)
    }

    /// Registry whose pools keep up to `max_idle` idle connections
    pub fn with_max_idle(driver: Arc<dyn Driver>, max_idle: usize) -> Self {
        Self {
            driver,
            by_descriptor: DashMap::new(),
            by_handle: DashMap::new(),
            max_idle,
        }
    }

    /// Acquire a branch connection for `txn`
    ///
    /// Under the transaction's enlistment lock: checks that the transaction
    /// accepts branches, takes or opens a physical connection, starts the
    /// next branch id on it and registers the wrapper with the transaction.
    /// A transaction that is finalizing or failed is rejected before any
    /// connection leaves the pool.
    ///
    /// # Errors
    ///
    /// Returns [`XaError::Acquisition`] if no connection can be obtained,
    /// [`XaError::Phase`] if the resource manager rejects the start, and
    /// [`XaError::Misuse`] if the transaction is finalizing or failed.
    pub fn acquire(
        &self,
        txn: &Transaction,
        target: impl Into<BranchTarget>,
    ) -> XaResult<BranchConnection> {
        let pool = self.pool(&target.into())?;
        let branch = txn.enlist(|xid| {
            let mut connection = pool.take()?;
            if let Err(source) = connection.start(&xid) {
                // Unknown association state on the RM side, so never pooled
                warn!(
                    target: "xapool::txn",
                    xid = %xid,
                    pool = %pool.name(),
                    error = %source,
                    "Branch start rejected, discarding connection"
                );
                return Err(XaError::Phase {
                    phase: Phase::Start,
                    xid,
                    source,
                });
            }
            Ok(BranchConnection::new(xid, connection, Arc::clone(&pool)))
        })?;
        debug!(target: "xapool::txn", xid = %branch.xid(), pool = %branch.pool_name(), "Branch started");
        Ok(branch)
    }

    /// Pool for `target`, created on first use
    ///
    /// # Errors
    ///
    /// Returns [`XaError::Acquisition`] if the driver cannot provide a data
    /// source for a descriptor.
    pub fn pool(&self, target: &BranchTarget) -> XaResult<Arc<BranchPool>> {
        match target {
            BranchTarget::Descriptor(descriptor) => self.descriptor_pool(descriptor),
            BranchTarget::Handle(handle) => Ok(self.handle_pool(handle)),
        }
    }

    fn descriptor_pool(&self, descriptor: &TargetDescriptor) -> XaResult<Arc<BranchPool>> {
        if let Some(pool) = self.by_descriptor.get(descriptor) {
            return Ok(Arc::clone(pool.value()));
        }
        let entry = self
            .by_descriptor
            .entry(descriptor.clone())
            .or_try_insert_with(|| {
                let source = self.driver.xa_data_source(descriptor).map_err(|source| {
                    XaError::Acquisition {
                        target: descriptor.to_string(),
                        source,
                    }
                })?;
                debug!(target: "xapool::pool", target_db = %descriptor, "Creating branch pool");
                Ok::<_, XaError>(Arc::new(BranchPool::new(source, self.max_idle)))
            })?;
        Ok(Arc::clone(entry.value()))
    }

    fn handle_pool(&self, handle: &TargetHandle) -> Arc<BranchPool> {
        if let Some(pool) = self.by_handle.get(handle) {
            return Arc::clone(pool.value());
        }
        let entry = self.by_handle.entry(handle.clone()).or_insert_with(|| {
            debug!(target: "xapool::pool", source = %handle.source().name(), "Creating branch pool");
            Arc::new(BranchPool::new(Arc::clone(handle.source()), self.max_idle))
        });
        Arc::clone(entry.value())
    }

    /// Number of descriptor-keyed pools
    pub fn descriptor_pools(&self) -> usize {
        self.by_descriptor.len()
    }

    /// Number of handle-keyed pools
    pub fn handle_pools(&self) -> usize {
        self.by_handle.len()
    }
}

impl fmt::Debug for BranchPoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchPoolRegistry")
            .field("descriptor_pools", &self.by_descriptor.len())
            .field("handle_pools", &self.by_handle.len())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}
