use crate::{Error, Result};

/// The outcome of an exec call: INSERT, UPDATE, DELETE or MERGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeResult {
    last_insert_id: Option<i64>,
    rows_affected: u64,
}

impl FakeResult {
    pub fn new(last_insert_id: i64, rows_affected: u64) -> Self {
        FakeResult {
            last_insert_id: Some(last_insert_id),
            rows_affected,
        }
    }

    /// A result that only carries an affected-row count.
    pub fn rows_affected_only(rows_affected: u64) -> Self {
        FakeResult {
            last_insert_id: None,
            rows_affected,
        }
    }

    pub fn last_insert_id(&self) -> Result<i64> {
        self.last_insert_id.ok_or(Error::LastInsertIdUnsupported)
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }
}
