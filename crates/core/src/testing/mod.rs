//! Testing utilities for code built on the connectivity contract
//!
//! - **Memory driver**: a complete in-memory implementation of
//!   [`Driver`](crate::traits::Driver), [`XaDataSource`](crate::traits::XaDataSource)
//!   and [`XaConnection`](crate::traits::XaConnection), with a call journal
//!   and one-shot fault injection.
//!
//! Compiled only for this crate's own tests or with the `testing` feature.
//! Downstream crates enable it from their dev-dependencies:
//!
//! ```toml
//! [dev-dependencies]
//! xapool-core = { path = "../core", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use xapool_core::testing::{MemoryDataSource, Op};
//! use xapool_core::DriverError;
//!
//! let source = MemoryDataSource::new("orders");
//! source.database().inject(Op::Prepare, DriverError::resource_manager("disk full"));
//! // ... drive a transaction, then inspect the journal
//! assert_eq!(source.database().count(Op::Prepare), 1);
//! ```

mod memory;

pub use memory::{
    JournalEntry, MemoryConnection, MemoryDataSource, MemoryDatabase, MemoryDriver, Op,
};
