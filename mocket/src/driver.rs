//! Plugging a fake connection into code that expects a database.

use async_trait::async_trait;
use itertools::Itertools;

use crate::{Command, Conn, Error, Value};

/// The output of running one SQL statement.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DBOutput {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// A statement in the query has completed.
    ///
    /// The number of rows modified is returned.
    StatementComplete(u64),
}

/// The async database interface.
#[async_trait]
pub trait AsyncDB: Send {
    /// The error type of SQL execution.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Async run a SQL query and return the output.
    async fn run(&mut self, sql: &str) -> Result<DBOutput, Self::Error>;

    /// Engine name of current database.
    fn engine_name(&self) -> &str {
        ""
    }
}

/// The database interface.
pub trait DB: Send {
    /// The error type of SQL execution.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run a SQL query and return the output.
    fn run(&mut self, sql: &str) -> Result<DBOutput, Self::Error>;

    /// Engine name of current database.
    fn engine_name(&self) -> &str {
        ""
    }
}

/// Compat-layer for the new AsyncDB and DB trait
#[async_trait]
impl<D> AsyncDB for D
where
    D: DB,
{
    type Error = <D as DB>::Error;

    async fn run(&mut self, sql: &str) -> Result<DBOutput, Self::Error> {
        <D as DB>::run(self, sql)
    }

    fn engine_name(&self) -> &str {
        <D as DB>::engine_name(self)
    }
}

/// Data-modifying statements go through the exec path, everything else is
/// queried. Nulls render as `NULL`.
impl DB for Conn {
    type Error = Error;

    fn run(&mut self, sql: &str) -> Result<DBOutput, Error> {
        match Command::parse(sql) {
            Command::Insert | Command::Update | Command::Delete | Command::Merge => {
                let result = self.exec(sql, &[])?;
                Ok(DBOutput::StatementComplete(result.rows_affected()))
            }
            Command::Select | Command::Other(_) => {
                let mut cursor = self.query(sql, &[])?;
                let columns = cursor.columns().to_vec();
                let rows = cursor
                    .collect_rows()?
                    .iter()
                    .map(|row| row.values().iter().map(Value::to_string).collect_vec())
                    .collect_vec();
                Ok(DBOutput::Rows { columns, rows })
            }
        }
    }

    fn engine_name(&self) -> &str {
        "mocket"
    }
}
