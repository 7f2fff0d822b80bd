//! Registry of connection pools, one per target descriptor
//!
//! The registry is a service owned by the hosting process and injected where
//! needed; nothing here is global. Pools are created lazily on the first
//! acquisition for a descriptor and live as long as the registry.
//!
//! Creation is mutually exclusive per descriptor: the map entry's shard lock
//! is held while the (cheap, connection-free) pool object is built, so two
//! threads racing on a new descriptor always end up sharing one pool.

use crate::connection::LogicalConnection;
use crate::pool::{ConnectionPool, DEFAULT_MAX_IDLE};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use xapool_core::{Driver, TargetDescriptor, XaResult};

/// Descriptor-keyed set of [`ConnectionPool`]s
pub struct PoolRegistry {
    driver: Arc<dyn Driver>,
    pools: DashMap<TargetDescriptor, Arc<ConnectionPool>>,
    max_idle: usize,
}

impl PoolRegistry {
    /// Registry whose pools keep up to [`DEFAULT_MAX_IDLE`] idle connections
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_max_idle(driver, DEFAULT_MAX_IDLE)
    }

    /// Registry whose pools keep up to `max_idle` idle connections
    pub fn with_max_idle(driver: Arc<dyn Driver>, max_idle: usize) -> Self {
        Self {
            driver,
            pools: DashMap::new(),
            max_idle,
        }
    }

    /// Acquire a logical connection to `target`
    ///
    /// # Errors
    ///
    /// Returns an error if a physical connection cannot be obtained.
    pub fn acquire(&self, target: &TargetDescriptor) -> XaResult<LogicalConnection> {
        self.pool(target).acquire()
    }

    /// Pool for `target`, created on first use
    pub fn pool(&self, target: &TargetDescriptor) -> Arc<ConnectionPool> {
        if let Some(pool) = self.get(target) {
            return pool;
        }
        let entry = self.pools.entry(target.clone()).or_insert_with(|| {
            debug!(target: "xapool::pool", target_db = %target, "Creating connection pool");
            Arc::new(ConnectionPool::new(
                target.clone(),
                Arc::clone(&self.driver),
                self.max_idle,
            ))
        });
        Arc::clone(entry.value())
    }

    /// Existing pool for `target`, if any
    pub fn get(&self, target: &TargetDescriptor) -> Option<Arc<ConnectionPool>> {
        self.pools.get(target).map(|pool| Arc::clone(pool.value()))
    }

    /// Number of pools created so far
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// True if no pool has been created yet
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.pools.len())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}
