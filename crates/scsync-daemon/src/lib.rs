//! Commit log access over a daemon's JSON-RPC interface.

mod client;
mod codec;
mod error;

pub use client::{rpc_url, DaemonClient, HttpRpc, StorageReader};
pub use codec::{commit_key, decode_commit, parse_count, CommitLayout};
pub use error::{DaemonError, DaemonResult};
