//! Core types for xapool
//!
//! This module defines the foundational types:
//! - TxnId / BranchId / Xid: identity of a distributed transaction and its branches
//! - ConnectionId: identity of a physical connection
//! - TargetDescriptor: the (user, credential, host, port, database) pool key
//! - IsolationLevel: isolation levels a driver can be asked for
//! - Vote / PrepareOutcome: results of the prepare phase

use crate::error::{DriverError, XaError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a distributed transaction
///
/// Unique within the process lifetime. Produced by an [`IdSource`](crate::ids::IdSource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw id
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a branch within one transaction
///
/// Assigned sequentially as branches register, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BranchId(u32);

impl BranchId {
    /// First branch id handed out by a transaction
    pub const FIRST: BranchId = BranchId(1);

    /// Wrap a raw id
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Branch identifier as seen by a resource manager
///
/// Binds one branch of one transaction. Drivers that speak a wire-level XA
/// dialect can use [`Xid::global_id`] and [`Xid::branch_qualifier`] as the
/// gtrid / bqual byte strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Xid {
    /// Owning transaction
    pub txn_id: TxnId,
    /// Branch within the transaction
    pub branch_id: BranchId,
}

impl Xid {
    /// Create a branch identifier
    pub const fn new(txn_id: TxnId, branch_id: BranchId) -> Self {
        Self { txn_id, branch_id }
    }

    /// Global transaction id bytes (big-endian)
    pub fn global_id(&self) -> [u8; 8] {
        self.txn_id.as_u64().to_be_bytes()
    }

    /// Branch qualifier bytes (big-endian)
    pub fn branch_qualifier(&self) -> [u8; 4] {
        self.branch_id.as_u32().to_be_bytes()
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.txn_id, self.branch_id)
    }
}

/// Identity of a physical connection, stable for its whole life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw id
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Isolation level requested from the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Dirty reads allowed
    ReadUncommitted,
    /// Only committed data is visible (the pool contract)
    ReadCommitted,
    /// Repeated reads return the same rows
    RepeatableRead,
    /// Full serializability
    Serializable,
}

/// Description of a connection target
///
/// Equality and hashing cover all five fields, so two descriptors built from
/// equal values always resolve to the same pool.
///
/// Textual form: `xa://user:credential@host:port/database`. `Display` redacts
/// the credential so descriptors can be logged.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TargetDescriptor {
    /// Login user
    pub user: String,
    /// Login credential
    pub credential: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database name
    pub database: String,
}

const SCHEME: &str = "xa://";

impl TargetDescriptor {
    /// Build a descriptor from its parts
    pub fn new(
        user: impl Into<String>,
        credential: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            credential: credential.into(),
            host: host.into(),
            port,
            database: database.into(),
        }
    }
}

// Hand-written so credentials never reach logs through `{:?}`
impl fmt::Debug for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetDescriptor")
            .field("user", &self.user)
            .field("credential", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:***@{}:{}/{}",
            SCHEME, self.user, self.host, self.port, self.database
        )
    }
}

impl FromStr for TargetDescriptor {
    type Err = XaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| XaError::InvalidDescriptor(reason.to_string());

        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("expected the xa:// scheme"))?;
        let (auth, location) = rest
            .rsplit_once('@')
            .ok_or_else(|| invalid("missing user@ section"))?;
        let (user, credential) = auth.split_once(':').unwrap_or((auth, ""));
        let (host_port, database) = location
            .split_once('/')
            .ok_or_else(|| invalid("missing /database"))?;
        let (host, port) = host_port
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing :port"))?;
        let port: u16 = port
            .parse()
            .map_err(|_| invalid("port is not a number in 0..=65535"))?;

        if user.is_empty() {
            return Err(invalid("user is empty"));
        }
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        if database.is_empty() {
            return Err(invalid("database is empty"));
        }

        Ok(Self::new(user, credential, host, port, database))
    }
}

/// Successful answer of a resource manager to prepare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vote {
    /// Branch holds durable changes and can commit them
    Commit,
    /// Branch made no durable change; it needs no phase-2 call
    ReadOnly,
}

/// Recorded outcome of a branch's prepare call
///
/// A driver error during prepare is the resource manager voting to abort, so
/// it is recorded here rather than raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Voted to commit
    Commit,
    /// Voted read-only
    ReadOnly,
    /// Prepare failed; the branch cannot commit
    Abort(DriverError),
}

impl PrepareOutcome {
    /// True when the outcome does not block a global commit
    pub fn is_ok(&self) -> bool {
        matches!(self, PrepareOutcome::Commit | PrepareOutcome::ReadOnly)
    }

    /// True when the branch must receive a phase-2 decision
    pub fn needs_decision(&self) -> bool {
        matches!(self, PrepareOutcome::Commit)
    }
}

impl From<Vote> for PrepareOutcome {
    fn from(vote: Vote) -> Self {
        match vote {
            Vote::Commit => PrepareOutcome::Commit,
            Vote::ReadOnly => PrepareOutcome::ReadOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_descriptor() {
        let d: TargetDescriptor = "xa://app:s3cret@db.local:5432/orders".parse().unwrap();
        assert_eq!(d.user, "app");
        assert_eq!(d.credential, "s3cret");
        assert_eq!(d.host, "db.local");
        assert_eq!(d.port, 5432);
        assert_eq!(d.database, "orders");
    }

    #[test]
    fn test_parse_descriptor_without_credential() {
        let d: TargetDescriptor = "xa://app@localhost:3306/inventory".parse().unwrap();
        assert_eq!(d.user, "app");
        assert_eq!(d.credential, "");
    }

    #[test]
    fn test_credential_may_contain_at_sign() {
        let d: TargetDescriptor = "xa://app:p@ss@localhost:1/db".parse().unwrap();
        assert_eq!(d.credential, "p@ss");
        assert_eq!(d.host, "localhost");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "postgres://app@h:1/db",
            "xa://h:1/db",
            "xa://app@h/db",
            "xa://app@h:99999/db",
            "xa://app@h:1",
            "xa://app@h:1/",
            "xa://@h:1/db",
            "xa://app@:1/db",
        ] {
            let err = bad.parse::<TargetDescriptor>().unwrap_err();
            assert!(matches!(err, XaError::InvalidDescriptor(_)), "{}", bad);
        }
    }

    #[test]
    fn test_equal_tuples_hash_together() {
        let a: TargetDescriptor = "xa://app:pw@h:1/db".parse().unwrap();
        let b = TargetDescriptor::new("app", "pw", "h", 1, "db");
        let c = TargetDescriptor::new("app", "other", "h", 1, "db");

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }

    #[test]
    fn test_display_and_debug_redact_credential() {
        let d = TargetDescriptor::new("app", "topsecret", "h", 1, "db");
        assert_eq!(d.to_string(), "xa://app:***@h:1/db");
        assert!(!format!("{:?}", d).contains("topsecret"));
    }

    #[test]
    fn test_xid_display_and_bytes() {
        let xid = Xid::new(TxnId::new(258), BranchId::new(3));
        assert_eq!(xid.to_string(), "258.3");
        assert_eq!(xid.global_id(), [0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(xid.branch_qualifier(), [0, 0, 0, 3]);
    }

    #[test]
    fn test_prepare_outcome_rules() {
        assert!(PrepareOutcome::Commit.is_ok());
        assert!(PrepareOutcome::ReadOnly.is_ok());
        assert!(!PrepareOutcome::Abort(DriverError::resource_manager("no")).is_ok());

        assert!(PrepareOutcome::Commit.needs_decision());
        assert!(!PrepareOutcome::ReadOnly.needs_decision());
        assert!(!PrepareOutcome::Abort(DriverError::resource_manager("no")).needs_decision());

        assert_eq!(PrepareOutcome::from(Vote::ReadOnly), PrepareOutcome::ReadOnly);
    }
}
