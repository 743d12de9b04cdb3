//! Replaying registered records as a forward-only row cursor.

use std::fmt;

use itertools::Itertools;

use crate::{Error, Record, Result, Value};

/// One materialized row, in the column order of its cursor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.values.iter().join(" "))
    }
}

impl<V: Into<Value>> FromIterator<V> for Row {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Row {
            values: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl ResultSet {
    /// Columns come from the first record, in its key order. Every record is
    /// projected onto them: absent keys become `Null`, extra keys are dropped.
    fn from_records(records: &[Record]) -> Self {
        let columns = records
            .first()
            .map(|first| first.keys().map(str::to_owned).collect_vec())
            .unwrap_or_default();

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|col| record.get(col).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        ResultSet { columns, rows }
    }
}

/// A forward-only cursor over one or more stacked result sets.
///
/// The cursor starts before the first row of the first set. Moving to the
/// next set is always explicit, see [`RowCursor::next_result_set`].
#[derive(Debug, Clone)]
pub struct RowCursor {
    sets: Vec<ResultSet>,
    pos_set: usize,
    /// Index of the next row to hand out in the current set.
    pos_row: usize,
    error: Option<(usize, Error)>,
    error_pos: Option<usize>,
    closed: bool,
}

impl RowCursor {
    /// Builds a cursor over a single result set.
    pub fn new(records: &[Record]) -> Self {
        Self::from_sets([records])
    }

    /// Builds a cursor over stacked result sets. An empty input yields one
    /// empty set.
    pub fn from_sets<'a>(sets: impl IntoIterator<Item = &'a [Record]>) -> Self {
        let mut sets = sets.into_iter().map(ResultSet::from_records).collect_vec();
        if sets.is_empty() {
            sets.push(ResultSet::default());
        }
        RowCursor {
            sets,
            pos_set: 0,
            pos_row: 0,
            error: None,
            error_pos: None,
            closed: false,
        }
    }

    /// Makes advancing onto row `pos` of the current set fail with `error`
    /// instead of producing the row.
    #[must_use]
    pub fn with_error_at(mut self, pos: usize, error: Error) -> Self {
        self.error = Some((pos, error));
        self
    }

    fn current(&self) -> &ResultSet {
        &self.sets[self.pos_set]
    }

    /// Column names of the current result set.
    pub fn columns(&self) -> &[String] {
        &self.current().columns
    }

    /// Position of the column named `name` in the current result set.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns().iter().position(|c| c == name)
    }

    /// Advances to the next row.
    ///
    /// Returns `Ok(None)` once the current set is exhausted. An injected
    /// error is returned at its position and recorded in
    /// [`RowCursor::error_position`]; the following call moves on.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Err(Error::CursorClosed);
        }

        let pos = self.pos_row;
        let len = self.current().rows.len();
        if pos >= len {
            return Ok(None);
        }
        self.pos_row += 1;

        if let Some((error_pos, error)) = &self.error {
            if *error_pos == pos {
                self.error_pos = Some(pos);
                return Err(error.clone());
            }
        }
        Ok(Some(self.current().rows[pos].clone()))
    }

    /// Drains the remaining rows of the current set.
    pub fn collect_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = vec![];
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Row position at which the injected error was returned, if it was.
    pub fn error_position(&self) -> Option<usize> {
        self.error_pos
    }

    pub fn has_next_result_set(&self) -> bool {
        self.pos_set + 1 < self.sets.len()
    }

    /// Moves before the first row of the next stacked set.
    pub fn next_result_set(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::CursorClosed);
        }
        if !self.has_next_result_set() {
            return Err(Error::NoMoreResultSets);
        }
        self.pos_set += 1;
        self.pos_row = 0;
        self.error = None;
        Ok(())
    }

    /// Stops iteration for good. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Iterator for RowCursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        self.next_row().transpose()
    }
}
