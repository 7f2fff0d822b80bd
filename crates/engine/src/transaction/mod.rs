//! Distributed transactions
//!
//! This module provides:
//! - [`Transaction`]: branch registry and the two-phase commit driver
//! - [`BranchConnection`]: capability-restricted view of one branch
//! - [`BranchPool`] / [`BranchPoolRegistry`]: pooling of XA connections
//!
//! # Architecture
//!
//! ```text
//! BranchPoolRegistry --acquire--> Transaction::enlist (state lock held)
//!                                    |
//!                                    +--> BranchPool::take --> XaConnection::start
//!                                    +--> register BranchConnection
//!
//! Transaction::commit: end all, prepare all, decide, recycle all
//! ```

pub mod branch;
pub mod context;
pub mod pool;
pub mod registry;

pub use branch::{BranchConnection, BranchState};
pub use context::{Transaction, TransactionState};
pub use pool::BranchPool;
pub use registry::{BranchPoolRegistry, BranchTarget};
