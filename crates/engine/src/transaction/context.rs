//! Distributed transaction and its two-phase commit
//!
//! A [`Transaction`] owns the ordered list of branches registered by branch
//! acquisitions and drives them through the protocol when it finalizes.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. end() every branch
//! 2. prepare() every branch, recording each outcome
//! 3. all_votes_ok = every outcome is Commit or ReadOnly
//! 4. every Commit branch: commit_branch() if all_votes_ok, else rollback_branch()
//! 5. recycle() every branch
//! 6. clear the branch list, return all_votes_ok
//! ```
//!
//! Rollback runs the same sequence with step 4 always rolling back.
//! Branches are processed strictly in registration order, one at a time.
//!
//! A protocol or phase error stops the sequence and is returned as is. The
//! transaction moves to `Failed`, keeps its branches registered, and accepts
//! no further work; there is no retry.

use super::branch::BranchConnection;
use crate::coordinator::TransactionCounters;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use xapool_core::{BranchId, PrepareOutcome, TxnId, XaError, XaResult, Xid};

/// Lifecycle state of a transaction
///
/// State transitions:
/// - `Active` → `Ending` → `Preparing` → `Committing` | `RollingBack` → `Closed`
/// - any finalizing state → `Failed` (error during finalize)
/// - `Closed` → `Active` (a new unit of work enlists a branch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Accepting branch registrations
    Active,
    /// Ending branches
    Ending,
    /// Collecting votes
    Preparing,
    /// Applying a commit decision
    Committing,
    /// Applying a rollback decision
    RollingBack,
    /// Finalized; branch list empty
    Closed,
    /// Finalize stopped on an error; remaining branches stay registered
    Failed,
}

impl TransactionState {
    fn is_finalizing(self) -> bool {
        matches!(
            self,
            TransactionState::Ending
                | TransactionState::Preparing
                | TransactionState::Committing
                | TransactionState::RollingBack
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Commit,
    Rollback,
}

#[derive(Default)]
struct Branches {
    list: Vec<BranchConnection>,
    last_id: u32,
}

/// A distributed transaction spanning any number of branches
///
/// Lock order is `state` then `branches`.
pub struct Transaction {
    id: TxnId,
    state: Mutex<TransactionState>,
    branches: Mutex<Branches>,
    counters: Option<Arc<TransactionCounters>>,
}

impl Transaction {
    /// Create an empty transaction
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            state: Mutex::new(TransactionState::Active),
            branches: Mutex::new(Branches::default()),
            counters: None,
        }
    }

    /// Transaction whose units of work are counted in `counters`
    pub(crate) fn counted(id: TxnId, counters: Arc<TransactionCounters>) -> Self {
        Self {
            counters: Some(counters),
            ..Self::new(id)
        }
    }

    /// Transaction id
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Number of registered branches
    pub fn branch_count(&self) -> usize {
        self.branches.lock().list.len()
    }

    /// Registered branches in registration order
    pub fn branch_xids(&self) -> Vec<Xid> {
        self.branches
            .lock()
            .list
            .iter()
            .map(BranchConnection::xid)
            .collect()
    }

    /// Enlist a new branch
    ///
    /// `start` receives the next branch id and must return a started branch.
    /// The state lock is held across allocation, `start` and registration,
    /// so a concurrent finalize can neither reset the id counter nor miss
    /// the branch. The id is consumed only if `start` succeeds.
    pub(crate) fn enlist<F>(&self, start: F) -> XaResult<BranchConnection>
    where
        F: FnOnce(Xid) -> XaResult<BranchConnection>,
    {
        let mut state = self.state.lock();
        self.check_accepting(*state)?;

        let next = self.branches.lock().last_id + 1;
        let branch = start(Xid::new(self.id, BranchId::new(next)))?;

        {
            let mut branches = self.branches.lock();
            branches.last_id = next;
            branches.list.push(branch.share());
        }
        if *state == TransactionState::Closed {
            if let Some(counters) = &self.counters {
                counters.record_start();
            }
            debug!(target: "xapool::txn", txn_id = %self.id, "Transaction reopened");
        }
        *state = TransactionState::Active;
        Ok(branch)
    }

    fn check_accepting(&self, state: TransactionState) -> XaResult<()> {
        if state.is_finalizing() || state == TransactionState::Failed {
            return Err(XaError::misuse(format!(
                "transaction {} is {:?} and cannot take new branches",
                self.id, state
            )));
        }
        Ok(())
    }

    /// Run two-phase commit across all registered branches
    ///
    /// Returns `Ok(true)` if every branch voted commit or read-only and the
    /// commit decision was applied, `Ok(false)` if any branch voted to abort
    /// and the branches that voted commit were rolled back.
    ///
    /// # Errors
    ///
    /// Returns the first protocol or phase error; the transaction is then
    /// `Failed`.
    pub fn commit(&self) -> XaResult<bool> {
        self.finalize(Decision::Commit)
    }

    /// Roll back all registered branches
    ///
    /// Branches are ended and prepared first, then each branch that voted
    /// commit is rolled back.
    ///
    /// # Errors
    ///
    /// Returns the first protocol or phase error; the transaction is then
    /// `Failed`.
    pub fn rollback(&self) -> XaResult<()> {
        self.finalize(Decision::Rollback).map(|_| ())
    }

    fn finalize(&self, decision: Decision) -> XaResult<bool> {
        let (branches, unit_open) = self.begin_finalize()?;
        let result = self.run_protocol(&branches, decision);
        let mut state = self.state.lock();
        match &result {
            Ok(all_votes_ok) => {
                let mut registered = self.branches.lock();
                registered.list.clear();
                registered.last_id = 0;
                *state = TransactionState::Closed;
                info!(
                    target: "xapool::txn",
                    txn_id = %self.id,
                    branches = branches.len(),
                    decision = ?decision,
                    all_votes_ok = *all_votes_ok,
                    "Transaction finalized"
                );
            }
            Err(e) => {
                warn!(
                    target: "xapool::txn",
                    txn_id = %self.id,
                    phase = ?*state,
                    error = %e,
                    "Transaction finalize failed"
                );
                *state = TransactionState::Failed;
            }
        }
        drop(state);

        if let (true, Some(counters)) = (unit_open, &self.counters) {
            match &result {
                Ok(true) if decision == Decision::Commit => counters.record_commit(),
                Ok(_) => counters.record_abort(),
                Err(_) => counters.record_failure(),
            }
        }
        result
    }

    /// Returns the branch snapshot and whether a unit of work was open
    fn begin_finalize(&self) -> XaResult<(Vec<BranchConnection>, bool)> {
        let mut state = self.state.lock();
        let unit_open = match *state {
            TransactionState::Active => true,
            TransactionState::Closed => false,
            other => {
                return Err(XaError::misuse(format!(
                    "transaction {} is {:?} and cannot be finalized",
                    self.id, other
                )))
            }
        };
        *state = TransactionState::Ending;
        let branches = self
            .branches
            .lock()
            .list
            .iter()
            .map(BranchConnection::share)
            .collect();
        Ok((branches, unit_open))
    }

    fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    fn run_protocol(&self, branches: &[BranchConnection], decision: Decision) -> XaResult<bool> {
        for branch in branches {
            branch.end()?;
        }

        self.set_state(TransactionState::Preparing);
        let mut outcomes = Vec::with_capacity(branches.len());
        for branch in branches {
            outcomes.push(branch.prepare()?);
        }

        let all_votes_ok = outcomes.iter().all(PrepareOutcome::is_ok);
        let commit = decision == Decision::Commit && all_votes_ok;
        debug!(
            target: "xapool::txn",
            txn_id = %self.id,
            all_votes_ok,
            commit,
            "Votes collected"
        );

        self.set_state(if commit {
            TransactionState::Committing
        } else {
            TransactionState::RollingBack
        });
        for (branch, outcome) in branches.iter().zip(&outcomes) {
            if !outcome.needs_decision() {
                continue;
            }
            if commit {
                branch.commit_branch()?;
            } else {
                branch.rollback_branch()?;
            }
        }

        for branch in branches {
            branch.recycle();
        }
        Ok(all_votes_ok)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("branches", &self.branch_xids())
            .finish()
    }
}
