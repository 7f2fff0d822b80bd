//! What callers can and cannot do with a branch connection

use crate::common::*;
use xapool::{BranchState, TransactionState};

#[test]
fn branch_rejects_work_after_finalize() {
    let env = TestEnv::new();
    let rm = MemoryDataSource::new("orders");
    let txn = env.coordinator.begin();
    let mut branch = env.branch(&txn, &rm, Some(WRITE));

    assert!(env.coordinator.commit(&txn).unwrap());

    assert_eq!(branch.state(), BranchState::Recycled);
    assert!(branch.execute(WRITE).unwrap_err().is_misuse());
    assert!(branch.query(READ).unwrap_err().is_misuse());
    assert_eq!(rm.database().rows("ledger").len(), 1);
}

#[test]
fn branch_identity_matches_transaction() {
    let env = TestEnv::new();
    let rm = MemoryDataSource::new("orders");
    let txn = env.coordinator.begin();

    let b1 = env.branch(&txn, &rm, None);
    let b2 = env.branch(&txn, &rm, None);

    assert_eq!(b1.transaction_id(), txn.id());
    assert_eq!(b2.transaction_id(), txn.id());
    assert_eq!(b1.branch_id().as_u32(), 1);
    assert_eq!(b2.branch_id().as_u32(), 2);
    assert_eq!(txn.branch_xids(), vec![b1.xid(), b2.xid()]);
    assert_eq!(b1.pool_name(), "memory:orders");
}

#[test]
fn dropping_a_branch_does_not_decide_it() {
    let env = TestEnv::new();
    let rm = MemoryDataSource::new("orders");
    let txn = env.coordinator.begin();

    drop(env.branch(&txn, &rm, Some(WRITE)));
    assert_eq!(txn.branch_count(), 1);
    assert_eq!(rm.database().count(Op::End), 0);

    assert!(env.coordinator.commit(&txn).unwrap());
    assert_eq!(rm.database().rows("ledger").len(), 1);
}

#[test]
fn rejected_start_leaves_transaction_usable() {
    let env = TestEnv::new();
    let rm = MemoryDataSource::new("orders");
    rm.database()
        .inject(Op::Start, DriverError::resource_manager("too many branches"));
    let txn = env.coordinator.begin();

    let err = env
        .coordinator
        .acquire_branch(&txn, TargetHandle::from(rm.clone()))
        .unwrap_err();
    assert!(matches!(err, XaError::Phase { .. }));
    assert_eq!(txn.branch_count(), 0);
    assert_eq!(txn.state(), TransactionState::Active);

    env.branch(&txn, &rm, Some(WRITE));
    assert!(env.coordinator.commit(&txn).unwrap());
    assert_eq!(rm.database().rows("ledger").len(), 1);
}

#[test]
fn failed_transaction_refuses_new_branches() {
    let env = TestEnv::new();
    let rm = MemoryDataSource::new("orders");
    let txn = env.coordinator.begin();
    env.branch(&txn, &rm, Some(WRITE));
    rm.database()
        .inject(Op::End, DriverError::connect("link lost"));

    assert!(env.coordinator.commit(&txn).is_err());
    assert_eq!(txn.state(), TransactionState::Failed);

    for _ in 0..3 {
        let err = env
            .coordinator
            .acquire_branch(&txn, TargetHandle::from(rm.clone()))
            .unwrap_err();
        assert!(err.is_misuse());
    }
    // rejected before any connection was opened or started
    assert_eq!(rm.database().opened_connections(), 1);
    assert_eq!(rm.database().count(Op::Start), 1);
    assert_eq!(txn.branch_count(), 1);
}

#[test]
fn reused_transaction_metrics_track_units_of_work() {
    let env = TestEnv::new();
    let rm = MemoryDataSource::new("orders");
    let txn = env.coordinator.begin();

    for _ in 0..3 {
        env.branch(&txn, &rm, Some(WRITE));
        assert!(env.coordinator.commit(&txn).unwrap());
    }

    let metrics = env.coordinator.metrics();
    assert_eq!(metrics.total_started, 3);
    assert_eq!(metrics.total_committed, 3);
    assert_eq!(metrics.active_count, 0);
    assert_eq!(metrics.commit_rate, 1.0);
    assert_eq!(rm.database().rows("ledger").len(), 3);
}
