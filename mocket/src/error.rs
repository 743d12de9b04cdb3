use std::sync::Arc;

/// A registered business error, shared between the expectation and every
/// call that returns it.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// The error type of every fake driver operation.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    #[error("statement has been closed")]
    StatementClosed,
    #[error("connection has been closed")]
    ConnectionClosed,
    #[error("cursor has been closed")]
    CursorClosed,
    /// Simulated transport failure. Callers are expected to apply their own
    /// reconnect policy.
    #[error("bad connection")]
    BadConnection,
    #[error("unimplemented statement exec command type of {0:?}")]
    UnimplementedCommand(String),
    #[error("last insert id is not supported for this statement")]
    LastInsertIdUnsupported,
    #[error("no more result sets")]
    NoMoreResultSets,
    #[error("a transaction is already in progress")]
    TransactionInProgress,
    /// Only produced by a strict [`Catcher`](crate::Catcher).
    #[error("no expectation matched query:\n[SQL] {sql}")]
    Unmatched { sql: String },
    /// The error registered on the matched expectation, returned verbatim.
    #[error(transparent)]
    Registered(SharedError),
}

impl Error {
    /// Returns the registered error if this is one.
    pub fn registered(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Registered(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    pub fn is_bad_connection(&self) -> bool {
        matches!(self, Error::BadConnection)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
