//! All-commit transactions, registry reset and branch id restart

use crate::common::*;

#[test]
fn all_commit_votes_commit_every_branch() {
    for n in 0..5 {
        let env = TestEnv::new();
        let rms = resource_managers(n);
        let txn = env.coordinator.begin();
        let branches: Vec<_> = rms
            .iter()
            .map(|rm| env.branch(&txn, rm, Some(WRITE)))
            .collect();

        assert!(env.coordinator.commit(&txn).unwrap());

        for (rm, branch) in rms.iter().zip(&branches) {
            let db = rm.database();
            assert_eq!(db.count_for(Op::CommitBranch, branch.xid()), 1);
            assert_eq!(db.count_for(Op::RollbackBranch, branch.xid()), 0);
            assert_eq!(db.rows("ledger").len(), 1);
        }
        // one recycle per branch: every connection is back in its pool
        for rm in &rms {
            let pool = env
                .coordinator
                .branch_pools()
                .pool(&TargetHandle::from(rm.clone()).into())
                .unwrap();
            assert_eq!(pool.idle_count(), 1);
        }
    }
}

#[test]
fn several_branches_on_one_resource_manager() {
    let env = TestEnv::new();
    let rm = MemoryDataSource::new("orders");
    let txn = env.coordinator.begin();
    let branches: Vec<_> = (0..3)
        .map(|_| env.branch(&txn, &rm, Some(WRITE)))
        .collect();

    assert!(env.coordinator.commit(&txn).unwrap());
    assert_eq!(rm.database().rows("ledger").len(), 3);
    assert_eq!(rm.database().opened_connections(), 3);
    for branch in &branches {
        assert_eq!(rm.database().count_for(Op::CommitBranch, branch.xid()), 1);
    }
}

#[test]
fn registry_is_empty_after_finalize_and_ids_restart() {
    let env = TestEnv::new();
    let rm = MemoryDataSource::new("orders");
    let txn = env.coordinator.begin();

    env.branch(&txn, &rm, Some(WRITE));
    env.branch(&txn, &rm, Some(WRITE));
    assert_eq!(txn.branch_count(), 2);
    assert!(env.coordinator.commit(&txn).unwrap());
    assert_eq!(txn.branch_count(), 0);

    let again = env.branch(&txn, &rm, None);
    assert_eq!(again.branch_id().as_u32(), 1);

    env.coordinator.rollback(&txn).unwrap();
    assert_eq!(txn.branch_count(), 0);
    assert_eq!(env.branch(&txn, &rm, None).branch_id().as_u32(), 1);
}

#[test]
fn rollback_ends_and_prepares_before_rolling_back() {
    let env = TestEnv::new();
    let rms = resource_managers(2);
    let txn = env.coordinator.begin();
    let writer = env.branch(&txn, &rms[0], Some(WRITE));
    let reader = env.branch(&txn, &rms[1], Some(READ));

    env.coordinator.rollback(&txn).unwrap();

    let writer_calls: Vec<Op> = rms[0]
        .database()
        .xa_calls()
        .into_iter()
        .filter(|(op, xid)| *xid == writer.xid() && *op != Op::Execute)
        .map(|(op, _)| op)
        .collect();
    assert_eq!(
        writer_calls,
        vec![Op::Start, Op::End, Op::Prepare, Op::RollbackBranch]
    );
    assert_eq!(rms[1].database().count_for(Op::Prepare, reader.xid()), 1);
    assert_eq!(rms[1].database().count_for(Op::RollbackBranch, reader.xid()), 0);
    assert!(rms[0].database().rows("ledger").is_empty());
}

#[test]
fn descriptor_and_handle_routes_use_separate_pools() {
    let env = TestEnv::new();
    let orders = target("orders");
    let shared = env.driver.database(&orders);
    let handle = TargetHandle::from(MemoryDataSource::over(shared.clone()));

    let txn = env.coordinator.begin();
    let mut by_descriptor = env.coordinator.acquire_branch(&txn, &orders).unwrap();
    let mut by_handle = env.coordinator.acquire_branch(&txn, &handle).unwrap();
    by_descriptor.execute(WRITE).unwrap();
    by_handle.execute(WRITE).unwrap();

    assert!(env.coordinator.commit(&txn).unwrap());
    assert_eq!(shared.rows("ledger").len(), 2);
    assert_eq!(env.coordinator.branch_pools().descriptor_pools(), 1);
    assert_eq!(env.coordinator.branch_pools().handle_pools(), 1);
}
