//! Per-target pool of idle physical connections
//!
//! Opening a physical connection is expensive, so released connections are
//! parked in a free set and handed out again on the next acquisition.
//!
//! # Locking
//!
//! The free set lock is held only to pop or push a connection. Opening and
//! configuring a connection happen outside it.

use crate::connection::LogicalConnection;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use xapool_core::{
    Driver, IsolationLevel, PhysicalConnection, TargetDescriptor, XaError, XaResult,
};

/// Default bound on idle connections kept per pool
///
/// Workers normally hold one or two connections per target at a time, so a
/// handful of idle ones covers steady state.
pub const DEFAULT_MAX_IDLE: usize = 8;

/// Isolation level every logical connection is configured with
pub const POOL_ISOLATION: IsolationLevel = IsolationLevel::ReadCommitted;

/// Pool of physical connections to one target descriptor
pub struct ConnectionPool {
    target: TargetDescriptor,
    driver: Arc<dyn Driver>,
    idle: Mutex<Vec<Box<dyn PhysicalConnection>>>,
    max_idle: usize,
    opened: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

/// Counters describing a pool's activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Physical connections opened through the driver
    pub opened: u64,
    /// Acquisitions served from the free set
    pub reused: u64,
    /// Released connections dropped because the free set was full
    pub discarded: u64,
    /// Connections currently idle
    pub idle: usize,
}

impl ConnectionPool {
    /// Create an empty pool for `target`
    pub fn new(target: TargetDescriptor, driver: Arc<dyn Driver>, max_idle: usize) -> Self {
        Self {
            target,
            driver,
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
            opened: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Target this pool connects to
    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// Take an idle connection or open a new one, configured for pool use
    ///
    /// # Errors
    ///
    /// Returns [`XaError::Acquisition`] if the driver cannot open or configure
    /// the connection.
    pub fn acquire(self: &Arc<Self>) -> XaResult<LogicalConnection> {
        let parked = self.idle.lock().pop();
        let mut physical = match parked {
            Some(physical) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                trace!(target: "xapool::pool", connection = %physical.id(), "Reusing idle connection");
                physical
            }
            None => {
                let physical = self
                    .driver
                    .connect(&self.target)
                    .map_err(|source| self.acquisition_error(source))?;
                self.opened.fetch_add(1, Ordering::Relaxed);
                debug!(
                    target: "xapool::pool",
                    target_db = %self.target,
                    connection = %physical.id(),
                    "Opened physical connection"
                );
                physical
            }
        };

        physical
            .set_auto_commit(false)
            .and_then(|_| physical.set_isolation(POOL_ISOLATION))
            .map_err(|source| self.acquisition_error(source))?;

        Ok(LogicalConnection::new(physical, Arc::clone(self)))
    }

    /// Park a physical connection in the free set
    ///
    /// The caller is responsible for having rolled it back.
    pub(crate) fn release(&self, physical: Box<dyn PhysicalConnection>) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(physical);
        } else {
            drop(idle);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                target: "xapool::pool",
                connection = %physical.id(),
                "Free set full, dropping connection"
            );
        }
    }

    /// Number of idle connections
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Bound on idle connections
    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            opened: self.opened.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            idle: self.idle_count(),
        }
    }

    fn acquisition_error(&self, source: xapool_core::DriverError) -> XaError {
        XaError::Acquisition {
            target: self.target.to_string(),
            source,
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("target", &self.target)
            .field("stats", &self.stats())
            .finish()
    }
}
