use thiserror::Error;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("consumer name '{0}' must be non-empty and use only letters, digits, '-' or '_'")]
    InvalidConsumerName(String),

    #[error("consumer '{0}' is defined more than once")]
    DuplicateConsumer(String),

    #[error("unknown preset '{preset}' for consumer '{consumer}'")]
    UnknownPreset { consumer: String, preset: String },

    #[error("table '{table}' is written by both '{first}' and '{second}'; each consumer needs its own tables")]
    SharedTable {
        table: String,
        first: String,
        second: String,
    },

    #[error("consumer '{consumer}' sets a preset and custom tables or rules; use one or the other")]
    ConflictingDefinition { consumer: String },

    #[error("consumer '{consumer}' needs a preset or at least one table and rule")]
    EmptyDefinition { consumer: String },

    #[error("no contract id for consumer '{consumer}' in environment '{env}'")]
    MissingContract { consumer: String, env: String },

    #[error("consumer '{consumer}': {source}")]
    Definition {
        consumer: String,
        #[source]
        source: scsync_core::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
