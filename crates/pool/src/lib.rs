//! Connection pooling for xapool
//!
//! This crate implements the plain (non-distributed) side of the system:
//! - ConnectionPool: free set of idle physical connections for one target
//! - LogicalConnection: caller-facing connection, rolled back on close
//! - PoolRegistry: descriptor-keyed pools, created lazily
//! - Session: statement execution shared with branch connections
//!
//! Every logical connection runs with auto-commit off and read-committed
//! isolation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod pool;
pub mod registry;

pub use connection::{LogicalConnection, Session};
pub use pool::{ConnectionPool, PoolStats, DEFAULT_MAX_IDLE, POOL_ISOLATION};
pub use registry::PoolRegistry;
