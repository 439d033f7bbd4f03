use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("stored value out of range: {0}")]
    OutOfRange(String),
}

pub type StateResult<T> = Result<T, StateError>;

impl From<StateError> for scsync_core::Error {
    fn from(e: StateError) -> Self {
        scsync_core::Error::Persistence(e.to_string())
    }
}
