//! Core types and traits for xapool
//!
//! This crate defines the foundational types used throughout the system:
//! - TxnId, BranchId, Xid: distributed transaction and branch identity
//! - TargetDescriptor, TargetHandle: the two ways a pool can be keyed
//! - Vote, PrepareOutcome: results of the prepare phase
//! - Error: DriverError (connectivity layer) and XaError (pools, coordinator)
//! - Traits: the connectivity contract (Driver, XaDataSource, PhysicalConnection, XaConnection)
//! - Ids: injectable transaction id sources
//! - Testing: in-memory reference driver, behind the `testing` feature

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ids;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod traits;
pub mod types;

pub use error::{DriverError, DriverErrorKind, DriverResult, Phase, XaError, XaResult};
pub use ids::{IdSource, RandomIds, SequentialIds, DEFAULT_ID_MODULUS};
pub use traits::{Driver, PhysicalConnection, Row, TargetHandle, XaConnection, XaDataSource};
pub use types::{
    BranchId, ConnectionId, IsolationLevel, PrepareOutcome, TargetDescriptor, TxnId, Vote, Xid,
};
