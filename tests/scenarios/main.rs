//! Scenario Tests
//!
//! End-to-end behaviour of pools and distributed transactions through the
//! `xapool` facade, using the in-memory reference driver.

#[path = "../common/mod.rs"]
mod common;

mod branch_lifecycle;
mod mixed_votes;
mod plain_pool;
mod two_phase_commit;
