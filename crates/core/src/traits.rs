//! Connectivity contract consumed by the pools and the coordinator
//!
//! These traits are the seam to a relational driver. The pools never talk to
//! a database directly; they open, configure and recycle whatever the driver
//! hands them.
//!
//! Thread safety: drivers and data sources are shared across threads
//! (`Send + Sync`). Physical connections move between threads with their
//! owning wrapper (`Send`) but are only ever used by one owner at a time.

use crate::error::DriverResult;
use crate::types::{ConnectionId, IsolationLevel, TargetDescriptor, Vote, Xid};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One result row, column values rendered as text
pub type Row = Vec<String>;

/// A heavyweight, driver-owned connection
pub trait PhysicalConnection: Send {
    /// Stable identity of this connection
    fn id(&self) -> ConnectionId;

    /// Toggle auto-commit
    ///
    /// # Errors
    ///
    /// Returns an error if the driver rejects the setting.
    fn set_auto_commit(&mut self, enabled: bool) -> DriverResult<()>;

    /// Set the transaction isolation level
    ///
    /// # Errors
    ///
    /// Returns an error if the driver rejects the level.
    fn set_isolation(&mut self, level: IsolationLevel) -> DriverResult<()>;

    /// Execute a statement, returning the number of affected rows
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    fn execute(&mut self, statement: &str) -> DriverResult<u64>;

    /// Run a query and collect its rows
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query(&mut self, statement: &str) -> DriverResult<Vec<Row>>;

    /// Commit the local transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the commit is rejected.
    fn commit(&mut self) -> DriverResult<()>;

    /// Roll back the local transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback is rejected.
    fn rollback(&mut self) -> DriverResult<()>;
}

/// A physical connection that can take part in a distributed transaction
///
/// The `Xid` passed to every call is the branch bound by `start`.
pub trait XaConnection: PhysicalConnection {
    /// Bind this connection to a branch; subsequent work belongs to it
    fn start(&mut self, xid: &Xid) -> DriverResult<()>;

    /// Mark the branch's work complete
    fn end(&mut self, xid: &Xid) -> DriverResult<()>;

    /// Ask the resource manager to vote
    ///
    /// An `Err` is a vote to abort.
    fn prepare(&mut self, xid: &Xid) -> DriverResult<Vote>;

    /// Durably commit a prepared branch
    fn commit_branch(&mut self, xid: &Xid) -> DriverResult<()>;

    /// Roll back a prepared branch
    fn rollback_branch(&mut self, xid: &Xid) -> DriverResult<()>;
}

/// Factory for XA connections to one resource manager
///
/// Callers that hold a data source can address a branch pool by its identity
/// (see [`TargetHandle`]).
pub trait XaDataSource: Send + Sync {
    /// Human-readable name used in logs and errors
    fn name(&self) -> String;

    /// Open a new XA-capable physical connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    fn open(&self) -> DriverResult<Box<dyn XaConnection>>;
}

/// Entry point of a relational driver
pub trait Driver: Send + Sync {
    /// Open a plain physical connection to `target`
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    fn connect(&self, target: &TargetDescriptor) -> DriverResult<Box<dyn PhysicalConnection>>;

    /// Obtain an XA data source for `target`
    ///
    /// # Errors
    ///
    /// Returns an error if the target does not support distributed transactions.
    fn xa_data_source(&self, target: &TargetDescriptor) -> DriverResult<Arc<dyn XaDataSource>>;
}

/// Identity-keyed reference to an [`XaDataSource`]
///
/// Two handles are equal exactly when they point at the same data source
/// allocation, independent of what the source describes.
#[derive(Clone)]
pub struct TargetHandle(Arc<dyn XaDataSource>);

impl TargetHandle {
    /// Wrap a data source
    pub fn new(source: Arc<dyn XaDataSource>) -> Self {
        Self(source)
    }

    /// The wrapped data source
    pub fn source(&self) -> &Arc<dyn XaDataSource> {
        &self.0
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for TargetHandle {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for TargetHandle {}

impl Hash for TargetHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TargetHandle").field(&self.0.name()).finish()
    }
}

impl<S: XaDataSource + 'static> From<Arc<S>> for TargetHandle {
    fn from(source: Arc<S>) -> Self {
        Self(source)
    }
}
