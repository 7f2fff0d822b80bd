//! Pool of XA-capable physical connections for one data source
//!
//! Same discipline as the plain [`ConnectionPool`](xapool_pool::ConnectionPool):
//! a bounded free set guarded by a short-lived lock, connections opened and
//! configured outside it. Connections come back only through the
//! coordinator's finalize path, after their branch has been decided.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use xapool_core::{XaConnection, XaDataSource, XaError, XaResult};
use xapool_pool::{PoolStats, POOL_ISOLATION};

/// Free set of XA connections opened from one [`XaDataSource`]
pub struct BranchPool {
    name: String,
    source: Arc<dyn XaDataSource>,
    idle: Mutex<Vec<Box<dyn XaConnection>>>,
    max_idle: usize,
    opened: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

impl BranchPool {
    /// Create an empty pool over `source`
    pub fn new(source: Arc<dyn XaDataSource>, max_idle: usize) -> Self {
        Self {
            name: source.name(),
            source,
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
            opened: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Name of the underlying data source
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take an idle connection or open a new one
    ///
    /// The connection is configured with auto-commit off and read-committed
    /// isolation, like every pooled connection.
    pub(crate) fn take(&self) -> XaResult<Box<dyn XaConnection>> {
        let parked = self.idle.lock().pop();
        let mut connection = match parked {
            Some(connection) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                trace!(target: "xapool::pool", pool = %self.name, connection = %connection.id(), "Reusing idle XA connection");
                connection
            }
            None => {
                let connection = self.source.open().map_err(|source| XaError::Acquisition {
                    target: self.name.clone(),
                    source,
                })?;
                self.opened.fetch_add(1, Ordering::Relaxed);
                debug!(target: "xapool::pool", pool = %self.name, connection = %connection.id(), "Opened XA connection");
                connection
            }
        };

        connection
            .set_auto_commit(false)
            .and_then(|_| connection.set_isolation(POOL_ISOLATION))
            .map_err(|source| XaError::Acquisition {
                target: self.name.clone(),
                source,
            })?;
        Ok(connection)
    }

    /// Return a connection whose branch has been decided
    pub(crate) fn recycle(&self, connection: Box<dyn XaConnection>) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(connection);
        } else {
            drop(idle);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(target: "xapool::pool", pool = %self.name, connection = %connection.id(), "Free set full, dropping XA connection");
        }
    }

    /// Number of idle connections
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
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
}

impl fmt::Debug for BranchPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchPool")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish()
    }
}
