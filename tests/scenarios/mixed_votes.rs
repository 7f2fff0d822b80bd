//! Read-only and abort votes

use crate::common::*;
use xapool::PrepareOutcome;

#[test]
fn read_only_branch_gets_no_phase_two() {
    let env = TestEnv::new();
    let rms = resource_managers(3);
    let txn = env.coordinator.begin();
    let b1 = env.branch(&txn, &rms[0], Some(WRITE));
    let b2 = env.branch(&txn, &rms[1], Some(READ));
    let b3 = env.branch(&txn, &rms[2], Some(WRITE));

    assert!(env.coordinator.commit(&txn).unwrap());

    assert_eq!(b2.prepare_outcome(), Some(PrepareOutcome::ReadOnly));
    assert_eq!(rms[0].database().count_for(Op::CommitBranch, b1.xid()), 1);
    assert_eq!(rms[2].database().count_for(Op::CommitBranch, b3.xid()), 1);
    assert_eq!(rms[1].database().count_for(Op::CommitBranch, b2.xid()), 0);
    assert_eq!(rms[1].database().count_for(Op::RollbackBranch, b2.xid()), 0);
}

#[test]
fn prepare_error_rolls_back_commit_voters() {
    let env = TestEnv::new();
    let rms = resource_managers(2);
    let txn = env.coordinator.begin();
    let b1 = env.branch(&txn, &rms[0], Some(WRITE));
    let b2 = env.branch(&txn, &rms[1], Some(WRITE));
    rms[1].database().inject_for(
        Op::Prepare,
        b2.xid(),
        DriverError::resource_manager("unique constraint violated"),
    );

    assert!(!env.coordinator.commit(&txn).unwrap());

    assert_eq!(rms[0].database().count_for(Op::RollbackBranch, b1.xid()), 1);
    assert_eq!(rms[0].database().count_for(Op::CommitBranch, b1.xid()), 0);
    assert_eq!(rms[1].database().count_for(Op::CommitBranch, b2.xid()), 0);
    assert_eq!(rms[1].database().count_for(Op::RollbackBranch, b2.xid()), 0);
    assert!(matches!(b2.prepare_outcome(), Some(PrepareOutcome::Abort(_))));
    assert!(rms[0].database().rows("ledger").is_empty());
    assert!(rms[1].database().rows("ledger").is_empty());
    assert_eq!(txn.branch_count(), 0);
}

#[test]
fn abort_vote_with_read_only_branch() {
    let env = TestEnv::new();
    let rms = resource_managers(3);
    let txn = env.coordinator.begin();
    let writer = env.branch(&txn, &rms[0], Some(WRITE));
    let reader = env.branch(&txn, &rms[1], Some(READ));
    let failing = env.branch(&txn, &rms[2], Some(WRITE));
    rms[2]
        .database()
        .inject(Op::Prepare, DriverError::connect("connection reset"));

    assert!(!env.coordinator.commit(&txn).unwrap());

    assert_eq!(rms[0].database().count_for(Op::RollbackBranch, writer.xid()), 1);
    assert_eq!(rms[1].database().count_for(Op::RollbackBranch, reader.xid()), 0);
    assert_eq!(rms[2].database().count_for(Op::RollbackBranch, failing.xid()), 0);
    assert_eq!(env.coordinator.metrics().total_aborted, 1);
}

#[test]
fn connections_are_reusable_after_an_abort_vote() {
    let env = TestEnv::new();
    let rm = MemoryDataSource::new("orders");

    let txn = env.coordinator.begin();
    env.branch(&txn, &rm, Some(WRITE));
    rm.database()
        .inject(Op::Prepare, DriverError::resource_manager("deadlock victim"));
    assert!(!env.coordinator.commit(&txn).unwrap());

    let txn = env.coordinator.begin();
    env.branch(&txn, &rm, Some(WRITE));
    assert!(env.coordinator.commit(&txn).unwrap());

    assert_eq!(rm.database().opened_connections(), 1);
    assert_eq!(rm.database().rows("ledger").len(), 1);
}
