//! Caller-facing logical connections
//!
//! A [`LogicalConnection`] owns one physical connection for as long as the
//! caller holds it. Closing it never persists uncommitted work: the physical
//! connection is rolled back before it re-enters the pool's free set.

use crate::pool::ConnectionPool;
use std::fmt;
use std::sync::Arc;
use tracing::warn;
use xapool_core::{ConnectionId, PhysicalConnection, Row, XaError, XaResult};

/// Statement execution shared by every connection kind handed to callers
pub trait Session {
    /// Execute a statement, returning the number of affected rows
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is no longer usable or the driver
    /// rejects the statement.
    fn execute(&mut self, statement: &str) -> XaResult<u64>;

    /// Run a query and collect its rows
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is no longer usable or the driver
    /// rejects the query.
    fn query(&mut self, statement: &str) -> XaResult<Vec<Row>>;
}

/// A pooled connection with auto-commit off and read-committed isolation
///
/// Dropping an open connection closes it. Prefer calling [`close`](Self::close)
/// to observe release errors.
pub struct LogicalConnection {
    physical: Option<Box<dyn PhysicalConnection>>,
    pool: Arc<ConnectionPool>,
    id: ConnectionId,
}

impl LogicalConnection {
    pub(crate) fn new(physical: Box<dyn PhysicalConnection>, pool: Arc<ConnectionPool>) -> Self {
        let id = physical.id();
        Self {
            physical: Some(physical),
            pool,
            id,
        }
    }

    /// Identity of the underlying physical connection
    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    /// True once [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.physical.is_none()
    }

    /// Pool this connection returns to
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Commit work done so far
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or the commit is rejected.
    pub fn commit(&mut self) -> XaResult<()> {
        self.physical()?
            .commit()
            .map_err(|source| XaError::Connection {
                operation: "commit",
                source,
            })
    }

    /// Discard work done so far
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or the rollback is rejected.
    pub fn rollback(&mut self) -> XaResult<()> {
        self.physical()?
            .rollback()
            .map_err(|source| XaError::Connection {
                operation: "rollback",
                source,
            })
    }

    /// Roll back and hand the physical connection back to the pool
    ///
    /// Idempotent: closing an already closed connection does nothing. If the
    /// rollback fails the physical connection is discarded instead of pooled.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback is rejected.
    pub fn close(&mut self) -> XaResult<()> {
        let Some(mut physical) = self.physical.take() else {
            return Ok(());
        };
        match physical.rollback() {
            Ok(()) => {
                self.pool.release(physical);
                Ok(())
            }
            Err(source) => {
                warn!(
                    target: "xapool::pool",
                    connection = %self.id,
                    error = %source,
                    "Rollback on close failed, discarding connection"
                );
                Err(XaError::Connection {
                    operation: "rollback",
                    source,
                })
            }
        }
    }

    fn physical(&mut self) -> XaResult<&mut Box<dyn PhysicalConnection>> {
        let id = self.id;
        self.physical
            .as_mut()
            .ok_or_else(|| XaError::misuse(format!("connection {} is closed", id)))
    }
}

impl Session for LogicalConnection {
    fn execute(&mut self, statement: &str) -> XaResult<u64> {
        self.physical()?
            .execute(statement)
            .map_err(|source| XaError::Connection {
                operation: "execute",
                source,
            })
    }

    fn query(&mut self, statement: &str) -> XaResult<Vec<Row>> {
        self.physical()?
            .query(statement)
            .map_err(|source| XaError::Connection {
                operation: "query",
                source,
            })
    }
}

impl Drop for LogicalConnection {
    fn drop(&mut self) {
        // close() already logs a failed rollback
        let _ = self.close();
    }
}

impl fmt::Debug for LogicalConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalConnection")
            .field("id", &self.id)
            .field("target", self.pool.target())
            .field("closed", &self.is_closed())
            .finish()
    }
}
