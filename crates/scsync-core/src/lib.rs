pub mod checkpoint;
pub mod chunk;
pub mod commit;
pub mod decompose;
pub mod error;
pub mod materializer;
pub mod mirror;
pub mod mutation;
pub mod predicate;
pub mod presets;
pub mod retry;
pub mod schema;
pub mod source;
pub mod types;

pub use checkpoint::{CheckpointEntry, CheckpointStore, MemoryCheckpointStore};
pub use chunk::{ChunkPlan, DEFAULT_CHUNK_SIZE};
pub use commit::{Commit, CommitValue, DELETE_SENTINEL};
pub use decompose::{DecodeFailure, DeleteAction, Decomposer, KeyTemplate, Rule, RuleBuilder};
pub use error::{Error, Result};
pub use materializer::{Consumer, Materializer, MaterializerConfig, SyncReport, SyncState};
pub use mirror::{MemoryMirror, MirrorStore};
pub use mutation::{MutationOp, RowMutation};
pub use predicate::{CompareOp, Literal, Predicate};
pub use presets::Preset;
pub use retry::RetryPolicy;
pub use schema::{ColumnDef, ColumnType, TableSchema};
pub use source::{check_range, CommitSource, MemoryCommitSource};
pub use types::{PrimaryKey, RowMap, Value};
