//! Distributed transaction engine for xapool
//!
//! This crate orchestrates the lower layers:
//! - Transaction: two-phase commit across registered branches
//! - Branch pools: XA connection pooling by descriptor or data source handle
//! - Coordinator: id allocation, both pool registries, metrics
//! - Config: `xapool.toml`
//!
//! The engine is the only component that drives the XA protocol; branch
//! connections handed to callers can run statements and nothing else.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod transaction;

pub use config::{XaConfig, CONFIG_FILE_NAME};
pub use coordinator::{TransactionCoordinator, TransactionMetrics};
pub use transaction::{
    BranchConnection, BranchPool, BranchPoolRegistry, BranchState, BranchTarget, Transaction,
    TransactionState,
};
