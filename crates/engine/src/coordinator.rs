//! Transaction coordinator for managing transaction lifecycle
//!
//! The TransactionCoordinator is the downstream entry point. It owns:
//! - The transaction id source
//! - The plain connection pool registry
//! - The branch connection pool registry
//! - Transaction metrics (started, committed, aborted, failed)
//!
//! Every registry is owned by a coordinator instance; nothing here is global.

use crate::config::XaConfig;
use crate::transaction::{BranchConnection, BranchPoolRegistry, BranchTarget, Transaction};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use xapool_core::{Driver, IdSource, TargetDescriptor, XaResult};
use xapool_pool::{LogicalConnection, PoolRegistry};

/// Transaction coordinator
///
/// # Memory Ordering
///
/// The metric counters use Relaxed ordering. They are observational only and
/// do not synchronize any other memory.
pub struct TransactionCoordinator {
    /// Transaction id allocation
    ids: Arc<dyn IdSource>,
    /// Plain connection pools, one per descriptor
    pools: PoolRegistry,
    /// XA connection pools, by descriptor and by data source handle
    branch_pools: BranchPoolRegistry,
    /// Unit-of-work counters shared with every transaction begun here
    counters: Arc<TransactionCounters>,
}

/// Unit-of-work counters
///
/// A unit of work starts when a transaction is begun or when a closed
/// transaction enlists its first new branch, and ends when a finalize that
/// found it open completes. Finalize calls rejected up front, or run on an
/// already closed transaction, are not counted.
#[derive(Debug, Default)]
pub(crate) struct TransactionCounters {
    /// Open units of work
    active_count: AtomicU64,
    /// Total units started
    total_started: AtomicU64,
    /// Total commits where every branch voted commit or read-only
    total_committed: AtomicU64,
    /// Total rollbacks, including commits defeated by an abort vote
    total_aborted: AtomicU64,
    /// Total finalizations that stopped on an error
    total_failed: AtomicU64,
}

impl TransactionCounters {
    pub(crate) fn record_start(&self) {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.record_end(&self.total_committed);
    }

    pub(crate) fn record_abort(&self) {
        self.record_end(&self.total_aborted);
    }

    pub(crate) fn record_failure(&self) {
        self.record_end(&self.total_failed);
    }

    fn record_end(&self, outcome: &AtomicU64) {
        // Use fetch_update for saturating decrement to prevent underflow
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
        outcome.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TransactionMetrics {
        let started = self.total_started.load(Ordering::Relaxed);
        let committed = self.total_committed.load(Ordering::Relaxed);

        TransactionMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: started,
            total_committed: committed,
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }
}

impl TransactionCoordinator {
    /// Create a coordinator over `driver`
    ///
    /// # Errors
    ///
    /// Returns [`XaError::Config`](xapool_core::XaError::Config) if `config`
    /// does not validate.
    pub fn new(driver: Arc<dyn Driver>, config: &XaConfig) -> XaResult<Self> {
        let ids = config.id_source()?;
        Self::with_id_source(driver, config, ids)
    }

    /// Create a coordinator drawing transaction ids from `ids`
    ///
    /// The config's `id_source` and `txn_id_modulus` are ignored.
    pub fn with_id_source(
        driver: Arc<dyn Driver>,
        config: &XaConfig,
        ids: Arc<dyn IdSource>,
    ) -> XaResult<Self> {
        config.validate()?;
        let max_idle = config.max_idle_per_pool;
        Ok(Self {
            ids,
            pools: PoolRegistry::with_max_idle(Arc::clone(&driver), max_idle),
            branch_pools: BranchPoolRegistry::with_max_idle(driver, max_idle),
            counters: Arc::new(TransactionCounters::default()),
        })
    }

    /// Begin a new distributed transaction
    pub fn begin(&self) -> Arc<Transaction> {
        let id = self.ids.next_id();
        self.counters.record_start();
        debug!(target: "xapool::txn", txn_id = %id, "Transaction started");
        Arc::new(Transaction::counted(id, Arc::clone(&self.counters)))
    }

    /// Acquire a plain pooled connection
    pub fn acquire(&self, target: &TargetDescriptor) -> XaResult<LogicalConnection> {
        self.pools.acquire(target)
    }

    /// Acquire a branch connection enlisted in `txn`
    pub fn acquire_branch(
        &self,
        txn: &Transaction,
        target: impl Into<BranchTarget>,
    ) -> XaResult<BranchConnection> {
        self.branch_pools.acquire(txn, target)
    }

    /// Commit `txn`
    ///
    /// See [`Transaction::commit`]. Transactions begun by this coordinator
    /// record their outcome in [`metrics`](Self::metrics).
    pub fn commit(&self, txn: &Transaction) -> XaResult<bool> {
        let result = txn.commit();
        match &result {
            Ok(true) => info!(target: "xapool::txn", txn_id = %txn.id(), "Transaction committed"),
            Ok(false) => info!(target: "xapool::txn", txn_id = %txn.id(), "Transaction aborted by vote"),
            Err(e) => warn!(target: "xapool::txn", txn_id = %txn.id(), error = %e, "Transaction commit failed"),
        }
        result
    }

    /// Roll back `txn`
    ///
    /// See [`Transaction::rollback`].
    pub fn rollback(&self, txn: &Transaction) -> XaResult<()> {
        let result = txn.rollback();
        match &result {
            Ok(()) => info!(target: "xapool::txn", txn_id = %txn.id(), "Transaction rolled back"),
            Err(e) => warn!(target: "xapool::txn", txn_id = %txn.id(), error = %e, "Transaction rollback failed"),
        }
        result
    }

    /// Get transaction metrics
    ///
    /// Returns current snapshot of unit-of-work statistics.
    pub fn metrics(&self) -> TransactionMetrics {
        self.counters.snapshot()
    }

    /// Plain connection pool registry
    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    /// Branch connection pool registry
    pub fn branch_pools(&self) -> &BranchPoolRegistry {
        &self.branch_pools
    }
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("pools", &self.pools)
            .field("branch_pools", &self.branch_pools)
            .field("metrics", &self.metrics())
            .finish()
    }
}

/// Transaction metrics
///
/// Counts units of work. A transaction reused after it closes starts a new
/// unit when it enlists its next branch.
#[derive(Debug, Clone)]
pub struct TransactionMetrics {
    /// Units of work started and not yet finalized
    pub active_count: u64,
    /// Total number of units of work started
    pub total_started: u64,
    /// Total number of transactions committed
    pub total_committed: u64,
    /// Total number of transactions aborted or rolled back
    pub total_aborted: u64,
    /// Total number of finalizations that returned an error
    pub total_failed: u64,
    /// Commit success rate (committed / started)
    pub commit_rate: f64,
}

impl TransactionMetrics {
    /// Total transactions that completed (committed + aborted + failed)
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted + self.total_failed
    }

    /// Abort rate (aborted / started)
    pub fn abort_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_aborted as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}
