//! xapool - two-phase-commit transaction coordinator with connection pooling
//!
//! xapool keeps one pool of physical database connections per target and
//! coordinates distributed transactions across several resource managers
//! with the XA two-phase commit protocol.
//!
//! # Quick Start
//!
//! ```
//! use xapool::testing::MemoryDriver;
//! use xapool::{Session, TargetDescriptor, TransactionCoordinator, XaConfig};
//!
//! # fn main() -> xapool::XaResult<()> {
//! let coordinator = TransactionCoordinator::new(MemoryDriver::new(), &XaConfig::default())?;
//! let orders: TargetDescriptor = "xa://app:secret@db1:5432/orders".parse()?;
//! let billing: TargetDescriptor = "xa://app:secret@db2:5432/billing".parse()?;
//!
//! let txn = coordinator.begin();
//! coordinator.acquire_branch(&txn, &orders)?.execute("INSERT INTO orders VALUES 1")?;
//! coordinator.acquire_branch(&txn, &billing)?.execute("INSERT INTO invoices VALUES 1")?;
//!
//! assert!(coordinator.commit(&txn)?);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `xapool-core`: identifiers, errors, the driver contract, id sources and
//!   the in-memory reference driver
//! - `xapool-pool`: plain per-descriptor connection pools
//! - `xapool-engine`: branch pools, transactions and the coordinator

pub use xapool_core::*;
pub use xapool_engine::*;
pub use xapool_pool::*;
