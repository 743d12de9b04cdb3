//! Prepared statements and their execution state machine.

use std::fmt;
use std::sync::Arc;

use educe::Educe;
use rand::Rng;

use crate::substitution::{count_placeholders, substitute};
use crate::{
    Callback, Catcher, Error, FakeResult, FaultPolicy, Record, Response, Result, RowCursor,
    Value,
};

/// The first keyword of a statement, upper-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    Other(String),
}

impl Command {
    pub fn parse(sql: &str) -> Self {
        let keyword = sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();
        match keyword.as_str() {
            "SELECT" => Command::Select,
            "INSERT" => Command::Insert,
            "UPDATE" => Command::Update,
            "DELETE" => Command::Delete,
            "MERGE" => Command::Merge,
            _ => Command::Other(keyword),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Select => write!(f, "SELECT"),
            Command::Insert => write!(f, "INSERT"),
            Command::Update => write!(f, "UPDATE"),
            Command::Delete => write!(f, "DELETE"),
            Command::Merge => write!(f, "MERGE"),
            Command::Other(keyword) => write!(f, "{keyword}"),
        }
    }
}

/// A prepared statement.
///
/// The SQL template is never rewritten: every call derives its own SQL text,
/// so a statement can be reused with different arguments.
///
/// Statements can be chained with [`Statement::then`] to answer one call
/// with several result sets.
#[derive(Educe)]
#[educe(Debug(bound()))]
pub struct Statement {
    #[educe(Debug(ignore))]
    catcher: Arc<Catcher>,
    #[educe(Debug(ignore))]
    faults: Arc<dyn FaultPolicy>,
    template: String,
    command: Command,
    placeholders: usize,
    next: Option<Box<Statement>>,
    closed: bool,
}

impl Statement {
    pub(crate) fn new(
        catcher: Arc<Catcher>,
        faults: Arc<dyn FaultPolicy>,
        sql: impl Into<String>,
    ) -> Self {
        let template = sql.into();
        Statement {
            catcher,
            faults,
            command: Command::parse(&template),
            placeholders: count_placeholders(&template),
            template,
            next: None,
            closed: false,
        }
    }

    /// Appends `next` at the end of the chain.
    #[must_use]
    pub fn then(mut self, next: Statement) -> Self {
        self.next = Some(Box::new(match self.next.take() {
            Some(tail) => (*tail).then(next),
            None => next,
        }));
        self
    }

    pub fn sql(&self) -> &str {
        &self.template
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Number of placeholders, counted once at prepare time.
    pub fn num_input(&self) -> usize {
        self.placeholders
    }

    pub fn next(&self) -> Option<&Statement> {
        self.next.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closes the statement and everything chained after it. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
        if let Some(next) = &mut self.next {
            next.close();
        }
    }

    fn chain(&self) -> impl Iterator<Item = &Statement> {
        std::iter::successors(Some(self), |stmt| stmt.next())
    }

    /// Splits `args` over the chain: each statement takes as many as it has
    /// placeholders, the last one takes the rest.
    fn split_args<'a>(
        &'a self,
        args: &'a [Value],
    ) -> impl Iterator<Item = (&'a Statement, &'a [Value])> {
        let mut rest = args;
        self.chain().map(move |stmt| {
            let own = if stmt.next.is_none() {
                rest
            } else {
                &rest[..stmt.placeholders.min(rest.len())]
            };
            rest = &rest[own.len()..];
            (stmt, own)
        })
    }

    /// Looks the call up and applies fault hooks and the registered error.
    /// The callback is left to the caller, which fires it once the whole
    /// chain succeeded.
    fn resolve(&self, sql: &str, args: &[Value], query: bool) -> Result<Response> {
        if self.closed {
            return Err(Error::StatementClosed);
        }

        let response = self.catcher.find_response(sql, args)?;

        let hook = if query {
            &response.exceptions.query_bad_connection
        } else {
            &response.exceptions.exec_bad_connection
        };
        let policy = if query {
            self.faults.query_bad_connection(sql)
        } else {
            self.faults.exec_bad_connection(sql)
        };
        if policy || hook.as_ref().is_some_and(|hook| hook()) {
            tracing::debug!(sql, "injecting bad connection");
            return Err(Error::BadConnection);
        }

        if let Some(error) = &response.error {
            return Err(Error::Registered(error.clone()));
        }
        Ok(response)
    }

    fn exec_one(&self, response: &Response) -> Result<FakeResult> {
        match &self.command {
            Command::Insert => {
                let id = match response.last_insert_id {
                    0 => rand::thread_rng().gen_range(1..=i64::MAX),
                    id => id,
                };
                Ok(FakeResult::new(id, 1))
            }
            Command::Update | Command::Delete | Command::Merge => {
                Ok(FakeResult::rows_affected_only(response.rows_affected))
            }
            other => Err(Error::UnimplementedCommand(other.to_string())),
        }
    }

    /// Executes a statement that returns no rows.
    ///
    /// The template is matched as is, without argument substitution. On a
    /// chain every statement runs in order and the last result is returned.
    /// Callbacks fire only when every statement of the chain succeeded.
    pub fn exec(&self, args: &[Value]) -> Result<FakeResult> {
        if self.closed {
            return Err(Error::StatementClosed);
        }

        let mut last = FakeResult::rows_affected_only(0);
        let mut fired = vec![];
        for (stmt, args) in self.split_args(args) {
            let sql = stmt.template.as_str();
            tracing::debug!(command = %stmt.command, sql, "exec");

            let response = stmt.resolve(sql, args, false)?;
            last = stmt.exec_one(&response)?;
            fired.push((sql.to_owned(), args, response.callback));
        }

        run_callbacks(fired);
        Ok(last)
    }

    /// Executes a statement that returns rows.
    ///
    /// Arguments are substituted into the template before matching. On a
    /// chain each statement contributes its result sets to the cursor, in
    /// chain order. Callbacks fire only when every statement of the chain
    /// succeeded.
    pub fn query(&self, args: &[Value]) -> Result<RowCursor> {
        if self.closed {
            return Err(Error::StatementClosed);
        }

        let mut sets: Vec<Vec<Record>> = vec![];
        let mut row_error = None;
        let mut fired = vec![];
        for (stmt, args) in self.split_args(args) {
            let sql = substitute(&stmt.template, args);
            tracing::debug!(command = %stmt.command, sql = %sql, "query");

            let response = stmt.resolve(&sql, args, true)?;
            if sets.is_empty() {
                row_error = response.row_error;
            }
            if response.result_sets.is_empty() {
                sets.push(vec![]);
            } else {
                sets.extend(response.result_sets);
            }
            fired.push((sql, args, response.callback));
        }

        run_callbacks(fired);
        let cursor = RowCursor::from_sets(sets.iter().map(Vec::as_slice));
        Ok(match row_error {
            Some((pos, error)) => cursor.with_error_at(pos, Error::Registered(error)),
            None => cursor,
        })
    }
}

fn run_callbacks(fired: Vec<(String, &[Value], Option<Callback>)>) {
    for (sql, args, callback) in fired {
        if let Some(callback) = callback {
            callback(&sql, args);
        }
    }
}
