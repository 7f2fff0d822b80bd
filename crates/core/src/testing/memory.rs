//! In-memory reference driver
//!
//! Implements the full connectivity contract against process memory:
//! committed tables per database, uncommitted writes per connection, and XA
//! branch bookkeeping. Every call is journaled and any call can be made to
//! fail once through fault injection.
//!
//! # Statements
//!
//! A tiny grammar, tokens separated by whitespace:
//!
//! ```text
//! INSERT INTO <table> VALUES <v1> [<v2> ...]
//! DELETE FROM <table>
//! SELECT * FROM <table>
//! ```

use crate::error::{DriverError, DriverResult};
use crate::traits::{Driver, PhysicalConnection, Row, XaConnection, XaDataSource};
use crate::types::{ConnectionId, IsolationLevel, TargetDescriptor, Vote, Xid};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Driver operation, as recorded in the journal and matched by faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Opening a physical connection
    Connect,
    /// `set_auto_commit`
    SetAutoCommit,
    /// `set_isolation`
    SetIsolation,
    /// `execute`
    Execute,
    /// `query`
    Query,
    /// Local `commit`
    Commit,
    /// Local `rollback`
    Rollback,
    /// XA `start`
    Start,
    /// XA `end`
    End,
    /// XA `prepare`
    Prepare,
    /// XA `commit_branch`
    CommitBranch,
    /// XA `rollback_branch`
    RollbackBranch,
}

/// One journaled driver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Connection the call was made on (`None` for failed connects)
    pub connection: Option<ConnectionId>,
    /// Operation
    pub op: Op,
    /// Branch the call targeted, for XA operations
    pub xid: Option<Xid>,
}

#[derive(Debug, Clone)]
struct Fault {
    op: Op,
    xid: Option<Xid>,
    error: DriverError,
}

#[derive(Debug, Clone)]
enum Write {
    Insert { table: String, row: Row },
    Delete { table: String },
}

/// A named in-memory database shared by all its connections
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    tables: Mutex<HashMap<String, Vec<Row>>>,
    journal: Mutex<Vec<JournalEntry>>,
    faults: Mutex<Vec<Fault>>,
    opened: AtomicUsize,
}

impl MemoryDatabase {
    /// Create an empty database
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            tables: Mutex::new(HashMap::new()),
            journal: Mutex::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
            opened: AtomicUsize::new(0),
        })
    }

    /// Database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Committed rows of `table`
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    /// Number of physical connections opened so far
    pub fn opened_connections(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Make the next call of `op` on this database fail with `error`
    pub fn inject(&self, op: Op, error: DriverError) {
        self.faults.lock().push(Fault {
            op,
            xid: None,
            error,
        });
    }

    /// Make the next call of `op` for branch `xid` fail with `error`
    pub fn inject_for(&self, op: Op, xid: Xid, error: DriverError) {
        self.faults.lock().push(Fault {
            op,
            xid: Some(xid),
            error,
        });
    }

    /// Snapshot of all calls made so far
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().clone()
    }

    /// Number of calls of `op`
    pub fn count(&self, op: Op) -> usize {
        self.journal.lock().iter().filter(|e| e.op == op).count()
    }

    /// Number of calls of `op` targeting branch `xid`
    pub fn count_for(&self, op: Op, xid: Xid) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|e| e.op == op && e.xid == Some(xid))
            .count()
    }

    /// XA operations in call order, as `(op, xid)` pairs
    pub fn xa_calls(&self) -> Vec<(Op, Xid)> {
        self.journal
            .lock()
            .iter()
            .filter_map(|e| e.xid.map(|xid| (e.op, xid)))
            .collect()
    }

    /// Forget journaled calls (faults and data are kept)
    pub fn clear_journal(&self) {
        self.journal.lock().clear();
    }

    fn enter(&self, connection: Option<ConnectionId>, op: Op, xid: Option<Xid>) -> DriverResult<()> {
        self.journal.lock().push(JournalEntry {
            connection,
            op,
            xid,
        });
        let mut faults = self.faults.lock();
        let hit = faults
            .iter()
            .position(|f| f.op == op && (f.xid.is_none() || f.xid == xid));
        match hit {
            Some(index) => Err(faults.remove(index).error),
            None => Ok(()),
        }
    }

    fn apply(&self, writes: &[Write]) {
        let mut tables = self.tables.lock();
        apply_writes(&mut tables, writes);
    }

    fn open_connection(self: &Arc<Self>) -> DriverResult<MemoryConnection> {
        self.enter(None, Op::Connect, None)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            db: Arc::clone(self),
            auto_commit: true,
            isolation: IsolationLevel::RepeatableRead,
            pending: Vec::new(),
            branch: None,
        })
    }
}

fn apply_writes(tables: &mut HashMap<String, Vec<Row>>, writes: &[Write]) {
    for write in writes {
        match write {
            Write::Insert { table, row } => {
                tables.entry(table.clone()).or_default().push(row.clone());
            }
            Write::Delete { table } => {
                tables.remove(table);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchPhase {
    Active,
    Ended,
    Prepared,
}

#[derive(Debug)]
struct BoundBranch {
    xid: Xid,
    phase: BranchPhase,
}

enum Statement {
    Insert { table: String, row: Row },
    Delete { table: String },
    Select { table: String },
}

fn parse(statement: &str) -> DriverResult<Statement> {
    let tokens: Vec<&str> = statement.split_whitespace().collect();
    let upper: Vec<String> = tokens.iter().map(|t| t.to_ascii_uppercase()).collect();
    let words: Vec<&str> = upper.iter().map(String::as_str).collect();
    match words.as_slice() {
        ["INSERT", "INTO", _, "VALUES", _, ..] => Ok(Statement::Insert {
            table: tokens[2].to_string(),
            row: tokens[4..].iter().map(|v| v.to_string()).collect(),
        }),
        ["DELETE", "FROM", _] => Ok(Statement::Delete {
            table: tokens[2].to_string(),
        }),
        ["SELECT", "*", "FROM", _] => Ok(Statement::Select {
            table: tokens[3].to_string(),
        }),
        _ => Err(DriverError::statement(format!(
            "unsupported statement: {}",
            statement
        ))),
    }
}

/// Physical connection to a [`MemoryDatabase`]
///
/// Reads see committed rows plus this connection's own pending writes.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    db: Arc<MemoryDatabase>,
    auto_commit: bool,
    isolation: IsolationLevel,
    pending: Vec<Write>,
    branch: Option<BoundBranch>,
}

impl MemoryConnection {
    /// Current auto-commit setting
    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Current isolation level
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    fn enter(&self, op: Op, xid: Option<Xid>) -> DriverResult<()> {
        self.db.enter(Some(self.id), op, xid)
    }

    fn visible(&self, table: &str) -> Vec<Row> {
        let mut view = self.db.tables.lock().clone();
        apply_writes(&mut view, &self.pending);
        view.remove(table).unwrap_or_default()
    }

    fn buffer(&mut self, write: Write) {
        self.pending.push(write);
        if self.auto_commit && self.branch.is_none() {
            let writes = std::mem::take(&mut self.pending);
            self.db.apply(&writes);
        }
    }

    fn expect_branch(&self, xid: &Xid, phase: BranchPhase) -> DriverResult<()> {
        match &self.branch {
            Some(b) if b.xid == *xid && b.phase == phase => Ok(()),
            Some(b) if b.xid == *xid => Err(DriverError::resource_manager(format!(
                "branch {} is {:?}, expected {:?}",
                xid, b.phase, phase
            ))),
            _ => Err(DriverError::resource_manager(format!(
                "branch {} is not bound to this connection",
                xid
            ))),
        }
    }

    fn ensure_local(&self, what: &str) -> DriverResult<()> {
        match &self.branch {
            Some(b) => Err(DriverError::resource_manager(format!(
                "local {} not allowed while branch {} is bound",
                what, b.xid
            ))),
            None => Ok(()),
        }
    }
}

impl PhysicalConnection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn set_auto_commit(&mut self, enabled: bool) -> DriverResult<()> {
        self.enter(Op::SetAutoCommit, None)?;
        self.auto_commit = enabled;
        Ok(())
    }

    fn set_isolation(&mut self, level: IsolationLevel) -> DriverResult<()> {
        self.enter(Op::SetIsolation, None)?;
        self.isolation = level;
        Ok(())
    }

    fn execute(&mut self, statement: &str) -> DriverResult<u64> {
        self.enter(Op::Execute, self.branch.as_ref().map(|b| b.xid))?;
        if let Some(b) = &self.branch {
            if b.phase != BranchPhase::Active {
                return Err(DriverError::resource_manager(format!(
                    "branch {} no longer accepts work",
                    b.xid
                )));
            }
        }
        match parse(statement)? {
            Statement::Insert { table, row } => {
                self.buffer(Write::Insert { table, row });
                Ok(1)
            }
            Statement::Delete { table } => {
                let affected = self.visible(&table).len() as u64;
                self.buffer(Write::Delete { table });
                Ok(affected)
            }
            Statement::Select { .. } => Err(DriverError::statement(
                "SELECT must go through query()",
            )),
        }
    }

    fn query(&mut self, statement: &str) -> DriverResult<Vec<Row>> {
        self.enter(Op::Query, self.branch.as_ref().map(|b| b.xid))?;
        match parse(statement)? {
            Statement::Select { table } => Ok(self.visible(&table)),
            _ => Err(DriverError::statement("query() only accepts SELECT")),
        }
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.enter(Op::Commit, None)?;
        self.ensure_local("commit")?;
        let writes = std::mem::take(&mut self.pending);
        self.db.apply(&writes);
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.enter(Op::Rollback, None)?;
        self.ensure_local("rollback")?;
        self.pending.clear();
        Ok(())
    }
}

impl XaConnection for MemoryConnection {
    fn start(&mut self, xid: &Xid) -> DriverResult<()> {
        self.enter(Op::Start, Some(*xid))?;
        if let Some(b) = &self.branch {
            return Err(DriverError::resource_manager(format!(
                "connection already bound to branch {}",
                b.xid
            )));
        }
        // Work done before start is not part of the branch
        self.pending.clear();
        self.branch = Some(BoundBranch {
            xid: *xid,
            phase: BranchPhase::Active,
        });
        Ok(())
    }

    fn end(&mut self, xid: &Xid) -> DriverResult<()> {
        self.enter(Op::End, Some(*xid))?;
        self.expect_branch(xid, BranchPhase::Active)?;
        if let Some(b) = self.branch.as_mut() {
            b.phase = BranchPhase::Ended;
        }
        Ok(())
    }

    fn prepare(&mut self, xid: &Xid) -> DriverResult<Vote> {
        if let Err(e) = self.enter(Op::Prepare, Some(*xid)) {
            // A failed prepare is a rollback vote; the resource manager drops the branch
            if self.branch.as_ref().map(|b| b.xid) == Some(*xid) {
                self.branch = None;
                self.pending.clear();
            }
            return Err(e);
        }
        self.expect_branch(xid, BranchPhase::Ended)?;
        if self.pending.is_empty() {
            self.branch = None;
            return Ok(Vote::ReadOnly);
        }
        if let Some(b) = self.branch.as_mut() {
            b.phase = BranchPhase::Prepared;
        }
        Ok(Vote::Commit)
    }

    fn commit_branch(&mut self, xid: &Xid) -> DriverResult<()> {
        self.enter(Op::CommitBranch, Some(*xid))?;
        self.expect_branch(xid, BranchPhase::Prepared)?;
        let writes = std::mem::take(&mut self.pending);
        self.db.apply(&writes);
        self.branch = None;
        Ok(())
    }

    fn rollback_branch(&mut self, xid: &Xid) -> DriverResult<()> {
        self.enter(Op::RollbackBranch, Some(*xid))?;
        self.expect_branch(xid, BranchPhase::Prepared)?;
        self.pending.clear();
        self.branch = None;
        Ok(())
    }
}

/// XA data source over one [`MemoryDatabase`]
#[derive(Debug)]
pub struct MemoryDataSource {
    db: Arc<MemoryDatabase>,
}

impl MemoryDataSource {
    /// Data source over a fresh database called `name`
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::over(MemoryDatabase::new(name))
    }

    /// Data source over an existing database
    pub fn over(db: Arc<MemoryDatabase>) -> Arc<Self> {
        Arc::new(Self { db })
    }

    /// Backing database
    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.db
    }
}

impl XaDataSource for MemoryDataSource {
    fn name(&self) -> String {
        format!("memory:{}", self.db.name)
    }

    fn open(&self) -> DriverResult<Box<dyn XaConnection>> {
        Ok(Box::new(self.db.open_connection()?))
    }
}

/// Driver resolving each distinct descriptor to its own [`MemoryDatabase`]
#[derive(Debug, Default)]
pub struct MemoryDriver {
    databases: Mutex<HashMap<TargetDescriptor, Arc<MemoryDatabase>>>,
    data_sources_created: AtomicUsize,
}

impl MemoryDriver {
    /// Create a driver with no databases
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Database behind `target`, created on first use
    pub fn database(&self, target: &TargetDescriptor) -> Arc<MemoryDatabase> {
        let mut databases = self.databases.lock();
        Arc::clone(
            databases
                .entry(target.clone())
                .or_insert_with(|| MemoryDatabase::new(target.database.clone())),
        )
    }

    /// How many XA data sources this driver has handed out
    pub fn data_sources_created(&self) -> usize {
        self.data_sources_created.load(Ordering::SeqCst)
    }
}

impl Driver for MemoryDriver {
    fn connect(&self, target: &TargetDescriptor) -> DriverResult<Box<dyn PhysicalConnection>> {
        Ok(Box::new(self.database(target).open_connection()?))
    }

    fn xa_data_source(&self, target: &TargetDescriptor) -> DriverResult<Arc<dyn XaDataSource>> {
        self.data_sources_created.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryDataSource::over(self.database(target)))
    }
}
