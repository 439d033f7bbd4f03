use thiserror::Error;

/// Errors that can occur in scsync-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Network or RPC failure while reading the commit log. Safe to retry.
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    /// Commit source failure that retrying will not fix, such as a bad
    /// endpoint or a malformed response.
    #[error("commit source error: {0}")]
    Source(String),

    #[error("invalid commit range [{start}, {end}) for commit count {count}")]
    InvalidRange { start: u64, end: u64, count: u64 },

    #[error("cannot decode commit {index}: {message}")]
    Decode { index: u64, message: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: Box<Error>,
    },

    #[error("invalid rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    #[error("invalid table schema '{table}': {message}")]
    InvalidSchema { table: String, message: String },

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("predicate error: {0}")]
    PredicateError(String),
}

impl Error {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientFetch(_))
    }

    pub(crate) fn decode(index: u64, message: impl Into<String>) -> Self {
        Error::Decode {
            index,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
