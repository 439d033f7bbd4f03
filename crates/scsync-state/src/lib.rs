//! Durable storage for checkpoints and mirror tables.

mod counter_file;
mod error;
mod mirror;
mod sqlite;

pub use counter_file::CounterFile;
pub use error::{StateError, StateResult};
pub use mirror::SqliteMirror;
pub use sqlite::SqliteCheckpointStore;
