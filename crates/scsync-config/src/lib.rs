pub mod error;
pub mod project;
pub mod starter;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use project::{
    resolve_env, CheckpointBackend, ConsumerConfig, DaemonConfig, LayoutConfig, ProjectConfig,
    RetryConfig, RuleConfig, SyncConfig, TableConfig,
};
pub use starter::STARTER_CONFIG;
pub use validation::{to_consumer, to_consumers, validate_consumer, validate_project};
