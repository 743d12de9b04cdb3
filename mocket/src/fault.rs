//! Connection-wide failure injection.

use std::fmt;
use std::sync::Arc;

use educe::Educe;

/// Decides when a connection simulates a broken transport.
///
/// Every decision point defaults to "healthy". A `true` answer makes the
/// operation fail with [`Error::BadConnection`](crate::Error::BadConnection).
pub trait FaultPolicy: Send + Sync {
    /// Consulted after the expectation lookup of an exec call.
    fn exec_bad_connection(&self, _sql: &str) -> bool {
        false
    }

    /// Consulted after the expectation lookup of a query call.
    fn query_bad_connection(&self, _sql: &str) -> bool {
        false
    }

    /// Consulted after a commit cleared the current transaction.
    fn before_commit(&self) -> bool {
        false
    }

    /// Consulted after a rollback cleared the current transaction.
    fn before_rollback(&self) -> bool {
        false
    }
}

/// A policy that never injects a fault.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultPolicy for NoFaults {}

type SqlHook = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type TxHook = Arc<dyn Fn() -> bool + Send + Sync>;

fn fmt_hook<T>(hook: &Option<T>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(if hook.is_some() { "Some(<hook>)" } else { "None" })
}

/// A policy assembled from optional closures, one per decision point.
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let broken = Arc::new(AtomicBool::new(false));
/// let flag = broken.clone();
/// let faults = mocket::FaultHooks::new().on_commit(move || flag.load(Ordering::SeqCst));
/// # let _ = (faults, broken);
/// ```
#[derive(Clone, Default, Educe)]
#[educe(Debug)]
pub struct FaultHooks {
    #[educe(Debug(method = "fmt_hook"))]
    exec: Option<SqlHook>,
    #[educe(Debug(method = "fmt_hook"))]
    query: Option<SqlHook>,
    #[educe(Debug(method = "fmt_hook"))]
    commit: Option<TxHook>,
    #[educe(Debug(method = "fmt_hook"))]
    rollback: Option<TxHook>,
}

impl FaultHooks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_exec(mut self, hook: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.exec = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_query(mut self, hook: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.query = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_commit(mut self, hook: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.commit = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_rollback(mut self, hook: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.rollback = Some(Arc::new(hook));
        self
    }
}

impl FaultPolicy for FaultHooks {
    fn exec_bad_connection(&self, sql: &str) -> bool {
        self.exec.as_ref().is_some_and(|hook| hook(sql))
    }

    fn query_bad_connection(&self, sql: &str) -> bool {
        self.query.as_ref().is_some_and(|hook| hook(sql))
    }

    fn before_commit(&self) -> bool {
        self.commit.as_ref().is_some_and(|hook| hook())
    }

    fn before_rollback(&self) -> bool {
        self.rollback.as_ref().is_some_and(|hook| hook())
    }
}
