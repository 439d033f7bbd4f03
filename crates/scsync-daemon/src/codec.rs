//! Decoding of the hex-encoded commit records stored by the contracts.

use scsync_core::{Commit, CommitValue};
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, DaemonResult};

/// Prefix the daemon puts in place of a value for keys it does not have.
const NOT_AVAILABLE: &str = "NOT AVAILABLE";

/// How a contract lays out its commit log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitLayout {
    /// `ACTION::key::value` records counted by `commit_count`.
    #[default]
    V1,
    /// JSON `{"key": ..., "value": ...}` records counted by `commit_ctr`.
    V2,
}

impl CommitLayout {
    pub fn counter_key(self) -> &'static str {
        match self {
            CommitLayout::V1 => "commit_count",
            CommitLayout::V2 => "commit_ctr",
        }
    }
}

/// Storage key of the commit at `index`.
pub fn commit_key(index: u64) -> String {
    format!("commit_{}", index)
}

pub fn is_not_available(raw: &str) -> bool {
    raw.starts_with(NOT_AVAILABLE)
}

/// Parse the decimal commit counter. A missing counter means no commits yet.
pub fn parse_count(raw: &str) -> DaemonResult<u64> {
    if is_not_available(raw) {
        return Ok(0);
    }
    raw.trim()
        .parse()
        .map_err(|_| DaemonError::Protocol(format!("commit counter '{}' is not a number", raw)))
}

#[derive(Deserialize)]
struct JsonRecord {
    key: String,
    value: serde_json::Value,
}

/// Decode one raw `valuesstring` entry into a commit.
pub fn decode_commit(layout: CommitLayout, index: u64, raw: &str) -> DaemonResult<Commit> {
    if is_not_available(raw) {
        return Err(DaemonError::decode(index, "commit is not available"));
    }

    let bytes = hex::decode(raw.trim())
        .map_err(|e| DaemonError::decode(index, format!("invalid hex: {}", e)))?;

    match layout {
        CommitLayout::V1 => {
            let text = String::from_utf8(bytes)
                .map_err(|e| DaemonError::decode(index, format!("invalid utf-8: {}", e)))?;
            decode_v1(index, &text)
        }
        CommitLayout::V2 => {
            let record: JsonRecord = serde_json::from_slice(&bytes)
                .map_err(|e| DaemonError::decode(index, format!("invalid record: {}", e)))?;
            let value = CommitValue::from_json(index, &record.value)
                .map_err(|e| DaemonError::decode(index, e.to_string()))?;
            Ok(Commit::new(index, record.key, value))
        }
    }
}

fn decode_v1(index: u64, text: &str) -> DaemonResult<Commit> {
    let mut parts = text.splitn(3, "::");
    let (Some(action), Some(key), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(DaemonError::decode(
            index,
            format!("expected ACTION::key::value, got '{}'", text),
        ));
    };

    let value = match action {
        "S" => CommitValue::Text(value.to_string()),
        "D" => CommitValue::Delete,
        other => {
            return Err(DaemonError::decode(
                index,
                format!("unknown action '{}'", other),
            ))
        }
    };
    Ok(Commit::new(index, key, value))
}
