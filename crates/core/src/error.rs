//! Error types for xapool
//!
//! Two layers of errors exist:
//! - [`DriverError`]: what the connectivity layer reports (network, auth,
//!   resource-manager rejections).
//! - [`XaError`]: what the pool and coordinator report to callers. Driver
//!   errors are wrapped with the operation and target or branch they hit.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::Xid;
use std::fmt;
use thiserror::Error;

/// Result type alias for driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Result type alias for pool and coordinator operations
pub type XaResult<T> = std::result::Result<T, XaError>;

/// Broad classification of a driver failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    /// Could not reach or authenticate against the target
    Connect,
    /// Statement rejected or failed while executing
    Statement,
    /// The resource manager rejected a branch operation
    ResourceManager,
    /// Anything else surfaced by the driver
    Other,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverErrorKind::Connect => "connect",
            DriverErrorKind::Statement => "statement",
            DriverErrorKind::ResourceManager => "resource manager",
            DriverErrorKind::Other => "driver",
        };
        f.write_str(name)
    }
}

/// Error reported by the connectivity layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct DriverError {
    /// Classification of the failure
    pub kind: DriverErrorKind,
    /// Driver-supplied message
    pub message: String,
}

impl DriverError {
    /// Create a driver error of the given kind
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Connection could not be established
    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Connect, message)
    }

    /// Statement failed
    pub fn statement(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Statement, message)
    }

    /// Resource manager rejected a branch operation
    pub fn resource_manager(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::ResourceManager, message)
    }
}

/// Protocol phase a branch operation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Binding a branch to a connection
    Start,
    /// Marking branch work complete
    End,
    /// Vote request
    Prepare,
    /// Durable commit of a prepared branch
    Commit,
    /// Rollback of a prepared branch
    Rollback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::End => "end",
            Phase::Prepare => "prepare",
            Phase::Commit => "commit",
            Phase::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// Errors raised by pools and the transaction coordinator
#[derive(Debug, Error)]
pub enum XaError {
    /// A physical connection could not be obtained or bound to a branch
    #[error("failed to acquire connection for {target}: {source}")]
    Acquisition {
        /// Target the acquisition was for (credentials redacted)
        target: String,
        /// Underlying driver failure
        #[source]
        source: DriverError,
    },

    /// A plain connection operation (rollback, commit, configure) failed
    #[error("connection {operation} failed: {source}")]
    Connection {
        /// Operation that failed
        operation: &'static str,
        /// Underlying driver failure
        #[source]
        source: DriverError,
    },

    /// The resource manager rejected a branch phase
    #[error("{phase} failed for branch {xid}: {source}")]
    Phase {
        /// Phase that failed
        phase: Phase,
        /// Branch the phase was applied to
        xid: Xid,
        /// Underlying driver failure
        #[source]
        source: DriverError,
    },

    /// The branch state machine was driven out of order
    #[error("protocol violation on branch {xid}: {reason}")]
    ProtocolViolation {
        /// Offending branch
        xid: Xid,
        /// What was attempted
        reason: String,
    },

    /// Caller used a connection in a way its lifecycle forbids
    #[error("misuse: {0}")]
    Misuse(String),

    /// Target descriptor could not be parsed
    #[error("invalid target descriptor: {0}")]
    InvalidDescriptor(String),

    /// Configuration file or value rejected
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl XaError {
    /// Build a protocol violation for `xid`
    pub fn protocol(xid: Xid, reason: impl Into<String>) -> Self {
        XaError::ProtocolViolation {
            xid,
            reason: reason.into(),
        }
    }

    /// Build a misuse error
    pub fn misuse(message: impl Into<String>) -> Self {
        XaError::Misuse(message.into())
    }

    /// The driver failure behind this error, if any
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            XaError::Acquisition { source, .. }
            | XaError::Connection { source, .. }
            | XaError::Phase { source, .. } => Some(source),
            _ => None,
        }
    }

    /// True for errors caused by calling code rather than infrastructure
    pub fn is_misuse(&self) -> bool {
        matches!(self, XaError::Misuse(_))
    }
}
