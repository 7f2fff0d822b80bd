//! Plain pool reuse and rollback-before-reuse

use crate::common::*;

#[test]
fn sequential_acquisitions_reuse_the_physical_connection() {
    let env = TestEnv::new();
    let orders = target("orders");

    let mut c1 = env.coordinator.acquire(&orders).unwrap();
    let first = c1.connection_id();
    c1.close().unwrap();

    let c2 = env.coordinator.acquire(&orders).unwrap();
    assert_eq!(c2.connection_id(), first);
    assert_eq!(env.driver.database(&orders).opened_connections(), 1);
}

#[test]
fn unclosed_work_is_rolled_back_before_reuse() {
    let env = TestEnv::new();
    let orders = target("orders");

    let mut c1 = env.coordinator.acquire(&orders).unwrap();
    c1.execute(WRITE).unwrap();
    assert_eq!(c1.query(READ).unwrap().len(), 1);
    c1.close().unwrap();

    let mut c2 = env.coordinator.acquire(&orders).unwrap();
    assert_eq!(c2.connection_id(), c1.connection_id());
    assert!(c2.query(READ).unwrap().is_empty());
    assert!(env.driver.database(&orders).rows("ledger").is_empty());
}

#[test]
fn dropped_connection_is_rolled_back_and_pooled() {
    let env = TestEnv::new();
    let orders = target("orders");

    {
        let mut c1 = env.coordinator.acquire(&orders).unwrap();
        c1.execute(WRITE).unwrap();
    }

    let mut c2 = env.coordinator.acquire(&orders).unwrap();
    assert!(c2.query(READ).unwrap().is_empty());
    assert_eq!(env.driver.database(&orders).opened_connections(), 1);
    assert_eq!(env.driver.database(&orders).count(Op::Rollback), 1);
}

#[test]
fn committed_work_survives_close() {
    let env = TestEnv::new();
    let orders = target("orders");

    let mut c1 = env.coordinator.acquire(&orders).unwrap();
    c1.execute(WRITE).unwrap();
    c1.commit().unwrap();
    c1.close().unwrap();

    assert_eq!(env.driver.database(&orders).rows("ledger").len(), 1);
}

#[test]
fn closed_connection_rejects_work() {
    let env = TestEnv::new();
    let mut conn = env.coordinator.acquire(&target("orders")).unwrap();
    conn.close().unwrap();
    conn.close().unwrap();

    assert!(conn.execute(WRITE).unwrap_err().is_misuse());
    assert!(conn.commit().unwrap_err().is_misuse());
}

#[test]
fn distinct_descriptors_get_distinct_pools() {
    let env = TestEnv::new();
    let orders = target("orders");
    let replica = TargetDescriptor::new("app", "secret", "replica.local", 5432, "orders");

    let a = env.coordinator.acquire(&orders).unwrap();
    let b = env.coordinator.acquire(&replica).unwrap();

    assert!(!std::sync::Arc::ptr_eq(a.pool(), b.pool()));
    assert_eq!(env.coordinator.pools().len(), 2);
}
