//! The catalog of registered expectations and the matching engine.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use educe::Educe;
use itertools::Itertools;
use regex::Regex;

use crate::{Error, Record, Result, SharedError, Value};

/// Invoked with the resolved SQL and the bound arguments on every successful match.
pub type Callback = Arc<dyn Fn(&str, &[Value]) + Send + Sync>;

/// A failure-injection hook. Returning `true` simulates a bad connection.
pub type Hook = Arc<dyn Fn() -> bool + Send + Sync>;

type TextPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type ArgsPredicate = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

/// How an expectation compares itself against the SQL text.
#[derive(Clone, Educe)]
#[educe(Debug)]
pub enum Pattern {
    /// Accepts any SQL.
    Any,
    Exact(String),
    /// Accepts SQL containing the pattern. An empty pattern accepts anything.
    Contains(String),
    Regex(Regex),
    Custom(#[educe(Debug(ignore))] TextPredicate),
}

impl Pattern {
    pub fn regex(re: &str) -> Result<Self, regex::Error> {
        Ok(Pattern::Regex(Regex::new(re)?))
    }

    pub fn custom(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Pattern::Custom(Arc::new(f))
    }

    pub fn is_match(&self, sql: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(s) => sql == s,
            Pattern::Contains(s) => sql.contains(s.as_str()),
            Pattern::Regex(re) => re.is_match(sql),
            Pattern::Custom(f) => f(sql),
        }
    }
}

/// Plain strings match by substring.
impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Pattern::Contains(s.to_owned())
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Pattern::Contains(s)
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern::Regex(re)
    }
}

/// How an expectation compares itself against the bound arguments.
#[derive(Clone, Educe)]
#[educe(Debug)]
pub enum ArgsMatcher {
    /// Same length, and every argument equal at its position.
    Exact(Vec<Value>),
    Custom(#[educe(Debug(ignore))] ArgsPredicate),
}

impl ArgsMatcher {
    pub fn is_match(&self, args: &[Value]) -> bool {
        match self {
            ArgsMatcher::Exact(expected) => expected.as_slice() == args,
            ArgsMatcher::Custom(f) => f(args),
        }
    }
}

fn fmt_hook(hook: &Option<Hook>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(if hook.is_some() { "Some(<hook>)" } else { "None" })
}

fn fmt_callback(callback: &Option<Callback>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(if callback.is_some() { "Some(<callback>)" } else { "None" })
}

/// Per-response failure injection.
#[derive(Clone, Default, Educe)]
#[educe(Debug)]
pub struct Exceptions {
    #[educe(Debug(method = "fmt_hook"))]
    pub exec_bad_connection: Option<Hook>,
    #[educe(Debug(method = "fmt_hook"))]
    pub query_bad_connection: Option<Hook>,
}

/// What a matched expectation hands back to the statement.
///
/// The default response is what unmatched queries get: no rows, zero
/// counters, no error.
#[derive(Clone, Default, Educe)]
#[educe(Debug)]
pub struct Response {
    /// Stacked result sets; the query path replays them in order.
    pub result_sets: Vec<Vec<Record>>,
    pub error: Option<SharedError>,
    #[educe(Debug(method = "fmt_callback"))]
    pub callback: Option<Callback>,
    /// Zero means "generate one".
    pub last_insert_id: i64,
    pub rows_affected: u64,
    pub exceptions: Exceptions,
    /// Fails advancing onto the given row of the first result set.
    pub row_error: Option<(usize, SharedError)>,
}

impl Response {
    /// Records of the first result set.
    pub fn rows(&self) -> &[Record] {
        self.result_sets.first().map(Vec::as_slice).unwrap_or_default()
    }
}

/// A registered (matcher, response) pair.
#[derive(Clone, Debug)]
pub struct Expectation {
    pattern: Pattern,
    args: Option<ArgsMatcher>,
    once: bool,
    triggered: bool,
    response: Response,
}

impl Default for Expectation {
    fn default() -> Self {
        Self::new()
    }
}

impl Expectation {
    /// An expectation accepting any SQL with the empty response.
    pub fn new() -> Self {
        Expectation {
            pattern: Pattern::Any,
            args: None,
            once: false,
            triggered: false,
            response: Response::default(),
        }
    }

    /// Sets the text pattern. Plain strings match by substring.
    #[must_use]
    pub fn with_query(mut self, pattern: impl Into<Pattern>) -> Self {
        self.pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn with_exact_query(self, sql: impl Into<String>) -> Self {
        self.with_query(Pattern::Exact(sql.into()))
    }

    /// Requires the bound arguments to equal `args`, position by position.
    #[must_use]
    pub fn with_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args = Some(ArgsMatcher::Exact(args.into_iter().map(Into::into).collect()));
        self
    }

    #[must_use]
    pub fn with_args_matching(
        mut self,
        f: impl Fn(&[Value]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.args = Some(ArgsMatcher::Custom(Arc::new(f)));
        self
    }

    /// Sets the records of the first result set.
    #[must_use]
    pub fn with_reply(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        let records = records.into_iter().collect();
        match self.response.result_sets.first_mut() {
            Some(first) => *first = records,
            None => self.response.result_sets.push(records),
        }
        self
    }

    /// Appends another stacked result set after the existing ones.
    #[must_use]
    pub fn and_result_set(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        if self.response.result_sets.is_empty() {
            self.response.result_sets.push(vec![]);
        }
        self.response.result_sets.push(records.into_iter().collect());
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.response.error = Some(Arc::new(error));
        self
    }

    /// Makes the cursor fail when it advances onto row `pos`.
    #[must_use]
    pub fn with_row_error(
        mut self,
        pos: usize,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.response.row_error = Some((pos, Arc::new(error)));
        self
    }

    #[must_use]
    pub fn with_callback(mut self, f: impl Fn(&str, &[Value]) + Send + Sync + 'static) -> Self {
        self.response.callback = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_id(mut self, last_insert_id: i64) -> Self {
        self.response.last_insert_id = last_insert_id;
        self
    }

    #[must_use]
    pub fn with_rows_affected(mut self, rows_affected: u64) -> Self {
        self.response.rows_affected = rows_affected;
        self
    }

    #[must_use]
    pub fn with_exec_exception(mut self, hook: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.response.exceptions.exec_bad_connection = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_query_exception(
        mut self,
        hook: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.response.exceptions.query_bad_connection = Some(Arc::new(hook));
        self
    }

    /// Makes the expectation match at most once.
    #[must_use]
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn is_match(&self, sql: &str, args: &[Value]) -> bool {
        if self.once && self.triggered {
            return false;
        }
        self.pattern.is_match(sql) && self.args.as_ref().map_or(true, |m| m.is_match(args))
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    pub fn response(&self) -> &Response {
        &self.response
    }
}

/// Registered expectations. `generation` changes on every reset, which
/// invalidates indices taken from an earlier snapshot.
#[derive(Debug, Default)]
struct Catalog {
    generation: u64,
    expectations: Vec<Expectation>,
}

/// The catalog of registered expectations.
///
/// Shared between the test and every [`Conn`](crate::Conn) through an `Arc`.
/// Registration order decides precedence: the first expectation that
/// accepts a query answers it.
#[derive(Debug, Default)]
pub struct Catcher {
    catalog: Mutex<Catalog>,
    misses: AtomicU64,
    strict: bool,
}

impl Catcher {
    /// Creates a permissive catcher: unmatched queries get the empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catcher failing unmatched queries with [`Error::Unmatched`].
    pub fn strict() -> Self {
        Self::new().with_strict(true)
    }

    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Catalog> {
        // expectations stay consistent even if a callback panicked mid-test
        self.catalog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an expectation after all registered ones.
    pub fn register(&self, expectation: Expectation) -> &Self {
        tracing::debug!(?expectation, "registering expectation");
        self.lock().expectations.push(expectation);
        self
    }

    /// Appends all expectations, keeping their order.
    pub fn attach(&self, expectations: impl IntoIterator<Item = Expectation>) -> &Self {
        self.lock().expectations.extend(expectations);
        self
    }

    /// Drops every expectation and the miss counter.
    pub fn reset(&self) {
        let mut catalog = self.lock();
        catalog.expectations.clear();
        catalog.generation += 1;
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.lock().expectations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().expectations.is_empty()
    }

    /// Number of queries that matched no expectation since the last reset.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns the response of the first expectation accepting `sql` and
    /// `args`, marking one-shot expectations as triggered.
    ///
    /// Matchers run without the catalog lock held, so custom predicates may
    /// call back into the catcher.
    pub fn lookup(&self, sql: &str, args: &[Value]) -> Option<Response> {
        tracing::debug!(sql, args = %args.iter().join(", "), "checking query");

        loop {
            let (generation, snapshot) = {
                let catalog = self.lock();
                (catalog.generation, catalog.expectations.clone())
            };
            let index = snapshot.iter().position(|e| e.is_match(sql, args))?;

            let mut catalog = self.lock();
            if catalog.generation != generation {
                continue;
            }
            // registration only appends, so `index` still names the same expectation
            let matched = &mut catalog.expectations[index];
            if matched.once && matched.triggered {
                // a concurrent lookup consumed it first
                continue;
            }
            matched.triggered = true;
            tracing::debug!(sql, index, "matched expectation");
            return Some(matched.response.clone());
        }
    }

    /// Resolves a query to a response.
    ///
    /// A miss is counted and logged. It yields the empty response, or
    /// [`Error::Unmatched`] for a strict catcher.
    pub fn find_response(&self, sql: &str, args: &[Value]) -> Result<Response> {
        if let Some(response) = self.lookup(sql, args) {
            return Ok(response);
        }

        let misses = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(sql, misses, "no expectation matched query");
        if self.strict {
            Err(Error::Unmatched {
                sql: sql.to_owned(),
            })
        } else {
            Ok(Response::default())
        }
    }
}
