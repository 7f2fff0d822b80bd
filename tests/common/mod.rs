//! Shared test utilities for the integration suites.
//!
//! Import via `mod common;` from any test's main.rs.

#![allow(dead_code)]

use std::sync::{Arc, Once};
pub use xapool::testing::{MemoryDataSource, MemoryDriver, Op};
pub use xapool::{
    BranchConnection, DriverError, Session, TargetDescriptor, TargetHandle, Transaction,
    TransactionCoordinator, XaConfig, XaError,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output to the test harness.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

// ============================================================================
// Fixtures
// ============================================================================

/// Coordinator over a fresh in-memory driver, with default config.
pub struct TestEnv {
    pub driver: Arc<MemoryDriver>,
    pub coordinator: TransactionCoordinator,
}

impl TestEnv {
    pub fn new() -> Self {
        init_tracing();
        let driver = MemoryDriver::new();
        let coordinator = TransactionCoordinator::new(driver.clone(), &XaConfig::default())
            .expect("default config is valid");
        Self {
            driver,
            coordinator,
        }
    }

    /// Open a branch on `source` and run `statement` in it.
    pub fn branch(
        &self,
        txn: &Transaction,
        source: &Arc<MemoryDataSource>,
        statement: Option<&str>,
    ) -> BranchConnection {
        let mut branch = self
            .coordinator
            .acquire_branch(txn, TargetHandle::from(source.clone()))
            .expect("branch acquisition");
        match statement {
            Some(s) if s.starts_with("SELECT") => {
                branch.query(s).expect("query");
            }
            Some(s) => {
                branch.execute(s).expect("execute");
            }
            None => {}
        }
        branch
    }
}

/// Descriptor for a named database on a shared test host.
pub fn target(database: &str) -> TargetDescriptor {
    TargetDescriptor::new("app", "secret", "db.local", 5432, database)
}

/// `n` independent resource managers.
pub fn resource_managers(n: usize) -> Vec<Arc<MemoryDataSource>> {
    (0..n)
        .map(|i| MemoryDataSource::new(format!("rm{}", i)))
        .collect()
}

/// A write that makes its branch vote commit.
pub const WRITE: &str = "INSERT INTO ledger VALUES entry";

/// A read that makes its branch vote read-only.
pub const READ: &str = "SELECT * FROM ledger";
