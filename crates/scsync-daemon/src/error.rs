use thiserror::Error;

/// Errors from daemon RPC calls.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("daemon returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid daemon endpoint '{endpoint}': {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("malformed rpc response: {0}")]
    Protocol(String),

    #[error("cannot decode commit {index}: {message}")]
    Decode { index: u64, message: String },
}

impl DaemonError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DaemonError::Network(_)
                | DaemonError::Rpc { .. }
                | DaemonError::Status {
                    status: 429 | 500..=599,
                    ..
                }
        )
    }

    pub(crate) fn decode(index: u64, message: impl Into<String>) -> Self {
        DaemonError::Decode {
            index,
            message: message.into(),
        }
    }
}

pub type DaemonResult<T> = Result<T, DaemonError>;

impl From<DaemonError> for scsync_core::Error {
    fn from(e: DaemonError) -> Self {
        match e {
            DaemonError::Decode { index, message } => scsync_core::Error::Decode { index, message },
            other if other.is_retryable() => scsync_core::Error::TransientFetch(other.to_string()),
            other => scsync_core::Error::Source(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let status = |status| DaemonError::Status {
            status,
            body: String::new(),
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!DaemonError::decode(1, "bad hex").is_retryable());
    }

    #[test]
    fn test_conversion_into_core_errors() {
        let core: scsync_core::Error = DaemonError::decode(7, "bad hex").into();
        assert!(matches!(core, scsync_core::Error::Decode { index: 7, .. }));

        let core: scsync_core::Error = DaemonError::Rpc {
            code: -32098,
            message: "busy".into(),
        }
        .into();
        assert!(core.is_retryable());
    }

    #[test]
    fn test_permanent_failures_are_not_retried() {
        let permanent = [
            DaemonError::Status {
                status: 404,
                body: "not found".into(),
            },
            DaemonError::InvalidEndpoint {
                endpoint: "ftp://node".into(),
                message: "unsupported scheme".into(),
            },
            DaemonError::Protocol("commit counter 'abc' is not a number".into()),
        ];

        for err in permanent {
            let core: scsync_core::Error = err.into();
            assert!(matches!(core, scsync_core::Error::Source(_)), "{core}");
            assert!(!core.is_retryable());
        }

        let core: scsync_core::Error = DaemonError::Status {
            status: 502,
            body: String::new(),
        }
        .into();
        assert!(matches!(core, scsync_core::Error::TransientFetch(_)));
    }
}
