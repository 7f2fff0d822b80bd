//! Branch connections
//!
//! A [`BranchConnection`] is the caller's view of one branch of a distributed
//! transaction. Its public surface is narrow: callers can run
//! statements and inspect identity, nothing else. There is no `close`,
//! `commit` or `rollback`; a branch's outcome is decided only by its owning
//! [`Transaction`](super::Transaction).
//!
//! ```compile_fail
//! # fn misuse(branch: &mut xapool_engine::BranchConnection) {
//! branch.commit();
//! # }
//! ```
//!
//! ```compile_fail
//! # fn misuse(branch: &mut xapool_engine::BranchConnection) {
//! branch.close();
//! # }
//! ```
//!
//! # Branch State Machine
//!
//! ```text
//! Active --end--> Ended --prepare--> Prepared --commit--> Committed
//!                                            \--rollback--> RolledBack
//! any --recycle--> Recycled
//! ```
//!
//! Phase-2 calls are legal only on a branch whose recorded outcome is
//! [`PrepareOutcome::Commit`].

use super::pool::BranchPool;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use xapool_core::{
    BranchId, Phase, PrepareOutcome, Row, TxnId, XaConnection, XaError, XaResult, Xid,
};
use xapool_pool::Session;

/// Lifecycle state of a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchState {
    /// Started and accepting work
    Active,
    /// Work marked complete
    Ended,
    /// Prepare has run; see the recorded outcome
    Prepared,
    /// Durably committed
    Committed,
    /// Rolled back after voting to commit
    RolledBack,
    /// Physical connection returned to its pool
    Recycled,
}

struct BranchSlot {
    state: BranchState,
    outcome: Option<PrepareOutcome>,
    connection: Option<Box<dyn XaConnection>>,
}

struct BranchInner {
    xid: Xid,
    pool: Arc<BranchPool>,
    slot: Mutex<BranchSlot>,
}

/// One branch of a distributed transaction, bound to one physical connection
pub struct BranchConnection {
    inner: Arc<BranchInner>,
}

impl BranchConnection {
    pub(crate) fn new(xid: Xid, connection: Box<dyn XaConnection>, pool: Arc<BranchPool>) -> Self {
        Self {
            inner: Arc::new(BranchInner {
                xid,
                pool,
                slot: Mutex::new(BranchSlot {
                    state: BranchState::Active,
                    outcome: None,
                    connection: Some(connection),
                }),
            }),
        }
    }

    /// Second handle to the same branch, kept by the owning transaction
    pub(crate) fn share(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Branch identifier
    pub fn xid(&self) -> Xid {
        self.inner.xid
    }

    /// Owning transaction's id
    pub fn transaction_id(&self) -> TxnId {
        self.inner.xid.txn_id
    }

    /// This branch's id within its transaction
    pub fn branch_id(&self) -> BranchId {
        self.inner.xid.branch_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> BranchState {
        self.inner.slot.lock().state
    }

    /// Outcome recorded by the last prepare, if prepare has run
    pub fn prepare_outcome(&self) -> Option<PrepareOutcome> {
        self.inner.slot.lock().outcome.clone()
    }

    /// Name of the pool this branch's connection returns to
    pub fn pool_name(&self) -> &str {
        self.inner.pool.name()
    }

    pub(crate) fn end(&self) -> XaResult<()> {
        let xid = self.inner.xid;
        let mut slot = self.inner.slot.lock();
        if slot.state != BranchState::Active {
            return Err(XaError::protocol(
                xid,
                format!("cannot end a branch that is {:?}", slot.state),
            ));
        }
        connection(&mut slot, xid)?
            .end(&xid)
            .map_err(|source| XaError::Phase {
                phase: Phase::End,
                xid,
                source,
            })?;
        slot.state = BranchState::Ended;
        trace!(target: "xapool::txn", xid = %xid, "Branch ended");
        Ok(())
    }

    pub(crate) fn prepare(&self) -> XaResult<PrepareOutcome> {
        let xid = self.inner.xid;
        let mut slot = self.inner.slot.lock();
        if slot.state != BranchState::Ended {
            return Err(XaError::protocol(
                xid,
                format!("cannot prepare a branch that is {:?}", slot.state),
            ));
        }
        let outcome = match connection(&mut slot, xid)?.prepare(&xid) {
            Ok(vote) => PrepareOutcome::from(vote),
            Err(source) => PrepareOutcome::Abort(source),
        };
        slot.state = BranchState::Prepared;
        slot.outcome = Some(outcome.clone());
        trace!(target: "xapool::txn", xid = %xid, outcome = ?outcome, "Branch prepared");
        Ok(outcome)
    }

    pub(crate) fn commit_branch(&self) -> XaResult<()> {
        self.decide(Phase::Commit)
    }

    pub(crate) fn rollback_branch(&self) -> XaResult<()> {
        self.decide(Phase::Rollback)
    }

    fn decide(&self, phase: Phase) -> XaResult<()> {
        let xid = self.inner.xid;
        let mut slot = self.inner.slot.lock();
        if slot.state != BranchState::Prepared || slot.outcome != Some(PrepareOutcome::Commit) {
            return Err(XaError::protocol(
                xid,
                format!(
                    "{} requires a branch prepared with a commit vote, branch is {:?} with outcome {:?}",
                    phase, slot.state, slot.outcome
                ),
            ));
        }
        let conn = connection(&mut slot, xid)?;
        let result = match phase {
            Phase::Commit => conn.commit_branch(&xid),
            _ => conn.rollback_branch(&xid),
        };
        result.map_err(|source| XaError::Phase { phase, xid, source })?;
        slot.state = match phase {
            Phase::Commit => BranchState::Committed,
            _ => BranchState::RolledBack,
        };
        Ok(())
    }

    /// Return the physical connection to its origin pool
    pub(crate) fn recycle(&self) {
        let connection = {
            let mut slot = self.inner.slot.lock();
            slot.state = BranchState::Recycled;
            slot.connection.take()
        };
        if let Some(connection) = connection {
            self.inner.pool.recycle(connection);
        }
    }

    fn active_connection<'a>(
        slot: &'a mut BranchSlot,
        xid: Xid,
    ) -> XaResult<&'a mut Box<dyn XaConnection>> {
        if slot.state != BranchState::Active {
            return Err(XaError::misuse(format!(
                "branch {} is {:?} and no longer accepts work",
                xid, slot.state
            )));
        }
        connection(slot, xid)
    }
}

fn connection(slot: &mut BranchSlot, xid: Xid) -> XaResult<&mut Box<dyn XaConnection>> {
    slot.connection
        .as_mut()
        .ok_or_else(|| XaError::misuse(format!("branch {} has no connection", xid)))
}

impl Session for BranchConnection {
    fn execute(&mut self, statement: &str) -> XaResult<u64> {
        let xid = self.inner.xid;
        let mut slot = self.inner.slot.lock();
        Self::active_connection(&mut slot, xid)?
            .execute(statement)
            .map_err(|source| XaError::Connection {
                operation: "execute",
                source,
            })
    }

    fn query(&mut self, statement: &str) -> XaResult<Vec<Row>> {
        let xid = self.inner.xid;
        let mut slot = self.inner.slot.lock();
        Self::active_connection(&mut slot, xid)?
            .query(statement)
            .map_err(|source| XaError::Connection {
                operation: "query",
                source,
            })
    }
}

impl fmt::Debug for BranchConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchConnection")
            .field("xid", &self.inner.xid)
            .field("pool", &self.inner.pool.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xapool_core::testing::{MemoryDataSource, Op};
    use xapool_core::{DriverError, XaDataSource};

    fn branch(source: &Arc<MemoryDataSource>, b: u32) -> BranchConnection {
        let pool = Arc::new(BranchPool::new(source.clone(), 8));
        let xid = Xid::new(TxnId::new(1), BranchId::new(b));
        let mut conn = source.open().unwrap();
        conn.start(&xid).unwrap();
        BranchConnection::new(xid, conn, pool)
    }

    #[test]
    fn test_full_commit_path() {
        let source = MemoryDataSource::new("orders");
        let mut b = branch(&source, 1);
        b.execute("INSERT INTO items VALUES a").unwrap();

        b.end().unwrap();
        assert_eq!(b.prepare().unwrap(), PrepareOutcome::Commit);
        b.commit_branch().unwrap();
        assert_eq!(b.state(), BranchState::Committed);
        b.recycle();
        assert_eq!(b.state(), BranchState::Recycled);
        assert_eq!(source.database().rows("items").len(), 1);
    }

    #[test]
    fn test_end_twice_is_protocol_violation() {
        let source = MemoryDataSource::new("orders");
        let b = branch(&source, 1);
        b.end().unwrap();
        let err = b.end().unwrap_err();
        assert!(matches!(err, XaError::ProtocolViolation { .. }));
        assert_eq!(source.database().count(Op::End), 1);
    }

    #[test]
    fn test_prepare_before_end_is_protocol_violation() {
        let source = MemoryDataSource::new("orders");
        let b = branch(&source, 1);
        let err = b.prepare().unwrap_err();
        assert!(matches!(err, XaError::ProtocolViolation { .. }));
        assert_eq!(source.database().count(Op::Prepare), 0);
    }

    #[test]
    fn test_prepare_error_is_recorded_as_abort() {
        let source = MemoryDataSource::new("orders");
        let mut b = branch(&source, 1);
        b.execute("INSERT INTO items VALUES a").unwrap();
        source
            .database()
            .inject(Op::Prepare, DriverError::resource_manager("deadlock victim"));

        b.end().unwrap();
        let outcome = b.prepare().unwrap();
        assert!(matches!(outcome, PrepareOutcome::Abort(_)));
        assert_eq!(b.prepare_outcome(), Some(outcome));
    }

    #[test]
    fn test_phase_two_on_read_only_is_rejected() {
        let source = MemoryDataSource::new("orders");
        let b = branch(&source, 1);
        b.end().unwrap();
        assert_eq!(b.prepare().unwrap(), PrepareOutcome::ReadOnly);

        assert!(matches!(
            b.commit_branch().unwrap_err(),
            XaError::ProtocolViolation { .. }
        ));
        assert!(matches!(
            b.rollback_branch().unwrap_err(),
            XaError::ProtocolViolation { .. }
        ));
        assert_eq!(source.database().count(Op::CommitBranch), 0);
        assert_eq!(source.database().count(Op::RollbackBranch), 0);
    }

    #[test]
    fn test_work_after_end_is_misuse() {
        let source = MemoryDataSource::new("orders");
        let mut b = branch(&source, 1);
        b.end().unwrap();
        assert!(b.execute("INSERT INTO items VALUES a").unwrap_err().is_misuse());
        b.prepare().unwrap();
        b.recycle();
        assert!(b.query("SELECT * FROM items").unwrap_err().is_misuse());
    }

    #[test]
    fn test_recycle_returns_connection_to_pool() {
        let source = MemoryDataSource::new("orders");
        let b = branch(&source, 1);
        b.end().unwrap();
        b.prepare().unwrap();
        b.recycle();
        assert_eq!(b.inner.pool.idle_count(), 1);

        // second recycle has nothing left to return
        b.recycle();
        assert_eq!(b.inner.pool.idle_count(), 1);
    }

    #[test]
    fn test_commit_failure_keeps_prepared_state() {
        let source = MemoryDataSource::new("orders");
        let mut b = branch(&source, 1);
        b.execute("INSERT INTO items VALUES a").unwrap();
        b.end().unwrap();
        b.prepare().unwrap();
        source
            .database()
            .inject(Op::CommitBranch, DriverError::connect("link lost"));

        let err = b.commit_branch().unwrap_err();
        assert!(matches!(
            err,
            XaError::Phase {
                phase: Phase::Commit,
                ..
            }
        ));
        assert_eq!(b.state(), BranchState::Prepared);
    }
}
