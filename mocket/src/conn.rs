//! Fake connections and transactions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use educe::Educe;

use crate::{
    Catcher, Error, FakeResult, FaultPolicy, NoFaults, Result, RowCursor, Statement, Value,
};

#[derive(Debug, Default)]
struct ConnState {
    closed: AtomicBool,
    in_tx: AtomicBool,
}

/// A fake connection answering every statement from its [`Catcher`].
///
/// ```
/// use std::sync::Arc;
/// use mocket::{record, Catcher, Conn, Expectation};
///
/// let catcher = Arc::new(Catcher::new());
/// catcher.register(
///     Expectation::new()
///         .with_query("SELECT * FROM users")
///         .with_reply([record! { "id" => 1, "name" => "a" }]),
/// );
///
/// let conn = Conn::new(catcher);
/// let rows = conn.query("SELECT * FROM users", &[])?.collect_rows()?;
/// assert_eq!(rows[0].to_string(), "1 a");
/// # Ok::<(), mocket::Error>(())
/// ```
#[derive(Educe)]
#[educe(Debug)]
pub struct Conn {
    catcher: Arc<Catcher>,
    #[educe(Debug(ignore))]
    faults: Arc<dyn FaultPolicy>,
    state: Arc<ConnState>,
}

impl Conn {
    pub fn new(catcher: Arc<Catcher>) -> Self {
        Conn {
            catcher,
            faults: Arc::new(NoFaults),
            state: Arc::default(),
        }
    }

    /// Replaces the fault policy consulted by this connection.
    #[must_use]
    pub fn with_faults(mut self, faults: impl FaultPolicy + 'static) -> Self {
        self.faults = Arc::new(faults);
        self
    }

    pub fn catcher(&self) -> &Arc<Catcher> {
        &self.catcher
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    pub fn prepare(&self, sql: impl Into<String>) -> Result<Statement> {
        self.check_open()?;
        Ok(Statement::new(self.catcher.clone(), self.faults.clone(), sql))
    }

    /// Prepares, executes and closes a statement that returns no rows.
    pub fn exec(&self, sql: &str, args: &[Value]) -> Result<FakeResult> {
        let mut stmt = self.prepare(sql)?;
        let result = stmt.exec(args);
        stmt.close();
        result
    }

    /// Prepares, queries and closes a statement that returns rows.
    pub fn query(&self, sql: &str, args: &[Value]) -> Result<RowCursor> {
        let mut stmt = self.prepare(sql)?;
        let cursor = stmt.query(args);
        stmt.close();
        cursor
    }

    /// Starts a transaction. Only one may be active per connection.
    pub fn begin(&self) -> Result<Transaction> {
        self.check_open()?;
        if self.state.in_tx.swap(true, Ordering::SeqCst) {
            return Err(Error::TransactionInProgress);
        }
        tracing::debug!("begin transaction");
        Ok(Transaction {
            conn: Arc::downgrade(&self.state),
            faults: self.faults.clone(),
        })
    }

    pub fn in_transaction(&self) -> bool {
        self.state.in_tx.load(Ordering::SeqCst)
    }

    /// Closes the connection. Idempotent.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

/// A transaction on a [`Conn`].
///
/// Holds only a weak reference to its connection. Dropping it without
/// committing clears the connection's transaction marker as well.
#[derive(Educe)]
#[educe(Debug)]
pub struct Transaction {
    conn: Weak<ConnState>,
    #[educe(Debug(ignore))]
    faults: Arc<dyn FaultPolicy>,
}

impl Transaction {
    fn clear(&self) {
        if let Some(state) = self.conn.upgrade() {
            state.in_tx.store(false, Ordering::SeqCst);
        }
    }

    pub fn commit(self) -> Result<()> {
        self.clear();
        tracing::debug!("commit transaction");
        if self.faults.before_commit() {
            return Err(Error::BadConnection);
        }
        Ok(())
    }

    pub fn rollback(self) -> Result<()> {
        self.clear();
        tracing::debug!("rollback transaction");
        if self.faults.before_rollback() {
            return Err(Error::BadConnection);
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.clear();
    }
}
