use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Numeric value the contracts write to mark a key as deleted.
///
/// This is an observed convention of the contracts, not a guarantee: a
/// field that legitimately holds -1 is indistinguishable from a deletion.
pub const DELETE_SENTINEL: i64 = -1;

/// The value carried by a commit, decided once when the commit is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitValue {
    Int(i64),
    Text(String),
    Delete,
}

impl CommitValue {
    /// Interpret a raw JSON scalar from a commit payload.
    pub fn from_json(index: u64, value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(DELETE_SENTINEL) => Ok(CommitValue::Delete),
                Some(i) => Ok(CommitValue::Int(i)),
                None => Err(Error::decode(
                    index,
                    format!("number {} does not fit a signed 64-bit integer", n),
                )),
            },
            serde_json::Value::String(s) => Ok(CommitValue::Text(s.clone())),
            other => Err(Error::decode(
                index,
                format!("expected string or number, got {}", other),
            )),
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, CommitValue::Delete)
    }
}

/// One indexed state change in a contract's append-only commit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Position in the log (0-based, dense).
    pub index: u64,
    /// Raw state key, e.g. `state_au_3_duration`.
    pub key: String,
    pub value: CommitValue,
}

impl Commit {
    pub fn new(index: u64, key: impl Into<String>, value: CommitValue) -> Self {
        Self {
            index,
            key: key.into(),
            value,
        }
    }

    pub fn set(index: u64, key: impl Into<String>, value: impl Into<CommitValue>) -> Self {
        Self::new(index, key, value.into())
    }

    pub fn delete(index: u64, key: impl Into<String>) -> Self {
        Self::new(index, key, CommitValue::Delete)
    }
}

impl From<i64> for CommitValue {
    fn from(v: i64) -> Self {
        if v == DELETE_SENTINEL {
            CommitValue::Delete
        } else {
            CommitValue::Int(v)
        }
    }
}

impl From<i32> for CommitValue {
    fn from(v: i32) -> Self {
        CommitValue::from(i64::from(v))
    }
}

impl From<&str> for CommitValue {
    fn from(v: &str) -> Self {
        CommitValue::Text(v.to_string())
    }
}

impl From<String> for CommitValue {
    fn from(v: String) -> Self {
        CommitValue::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(
            CommitValue::from_json(0, &json!(5)).unwrap(),
            CommitValue::Int(5)
        );
        assert_eq!(
            CommitValue::from_json(0, &json!("abc")).unwrap(),
            CommitValue::Text("abc".into())
        );
        assert_eq!(
            CommitValue::from_json(0, &json!(-1)).unwrap(),
            CommitValue::Delete
        );
    }

    #[test]
    fn test_from_json_rejects_non_scalars() {
        let err = CommitValue::from_json(9, &json!({"a": 1})).unwrap_err();
        assert!(matches!(err, Error::Decode { index: 9, .. }));

        let err = CommitValue::from_json(3, &json!(1.5)).unwrap_err();
        assert!(matches!(err, Error::Decode { index: 3, .. }));

        assert!(CommitValue::from_json(0, &json!(null)).is_err());
        assert!(CommitValue::from_json(0, &json!(u64::MAX)).is_err());
    }

    #[test]
    fn test_sentinel_conversion() {
        assert!(CommitValue::from(-1i64).is_delete());
        assert!(!CommitValue::from(-2i64).is_delete());
        assert!(!CommitValue::from("-1").is_delete());
    }
}
