use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scsync_core::{ColumnDef, DeleteAction, RetryPolicy, DEFAULT_CHUNK_SIZE};
use scsync_daemon::CommitLayout;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

pub const ENV_OVERRIDE: &str = "SCSYNC_ENV";
pub const DAEMON_OVERRIDE: &str = "SCSYNC_DAEMON";
pub const DATA_DIR_OVERRIDE: &str = "SCSYNC_DATA_DIR";

/// Project configuration from scsync.toml.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Network environment: mainnet, testnet or simulator.
    #[serde(default = "default_env")]
    pub env: String,
    /// Directory for the mirror database, counter files and locks.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default, rename = "consumer")]
    pub consumers: Vec<ConsumerConfig>,
}

#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    /// `host:port` or URL. Defaults to the local daemon port of the environment.
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub layout: LayoutConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_timeout_secs(),
            layout: LayoutConfig::default(),
        }
    }
}

/// Commit record layout written by the contracts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutConfig {
    #[default]
    V1,
    V2,
}

impl LayoutConfig {
    pub fn to_commit_layout(self) -> CommitLayout {
        match self {
            LayoutConfig::V1 => CommitLayout::V1,
            LayoutConfig::V2 => CommitLayout::V2,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SyncConfig {
    /// Commits fetched and applied per transaction.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default)]
    pub checkpoints: CheckpointBackend,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            checkpoints: CheckpointBackend::default(),
        }
    }
}

/// Where checkpoints are persisted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// `<data_dir>/<env>_counts.json`
    #[default]
    File,
    /// A `checkpoints` table in the mirror database.
    Sqlite,
}

#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// One `[[consumer]]` entry.
#[derive(Debug, Deserialize)]
pub struct ConsumerConfig {
    pub name: String,
    /// Name of a built-in table and rule set.
    pub preset: Option<String>,
    /// Overrides `[daemon] layout` for this consumer.
    pub layout: Option<LayoutConfig>,
    /// Contract id per environment; overrides preset defaults.
    #[serde(default)]
    pub contract: BTreeMap<String, String>,
    #[serde(default, rename = "table")]
    pub tables: Vec<TableConfig>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub key: Vec<ColumnDef>,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    /// Drop rows still missing this column after each chunk.
    pub require: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub template: String,
    pub table: String,
    /// Fixed target column for templates without `{column}`.
    pub column: Option<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub on_delete: DeleteAction,
}

fn default_env() -> String {
    "simulator".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5000
}

/// Local daemon RPC port for an environment.
fn default_daemon_port(env: &str) -> Option<u16> {
    match env {
        "mainnet" => Some(10102),
        "testnet" => Some(40402),
        "simulator" => Some(20000),
        _ => None,
    }
}

/// Resolve environment variables in a string.
/// Supports ${VAR_NAME} syntax; unset variables resolve to "".
pub fn resolve_env(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + end];
        result.push_str(&rest[..start]);
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }

    result.push_str(rest);
    result
}

impl ProjectConfig {
    /// Parse a project config from a TOML string. No environment lookups.
    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        let config: ProjectConfig = toml::from_str(toml_str)?;
        Ok(config)
    }

    /// Read, parse and resolve a config file against the process environment.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = Self::parse(&content)?;
        config.resolve();
        debug!(path = %path.display(), env = %config.env, "Loaded config");
        Ok(config)
    }

    /// Apply `${VAR}` substitution and the `SCSYNC_*` overrides.
    pub fn resolve(&mut self) {
        self.env = resolve_env(&self.env);
        self.data_dir = resolve_env(&self.data_dir);
        self.daemon.endpoint = self.daemon.endpoint.as_deref().map(resolve_env);
        for consumer in &mut self.consumers {
            for id in consumer.contract.values_mut() {
                *id = resolve_env(id);
            }
        }

        if let Some(env) = non_empty_var(ENV_OVERRIDE) {
            self.env = env;
        }
        if let Some(endpoint) = non_empty_var(DAEMON_OVERRIDE) {
            self.daemon.endpoint = Some(endpoint);
        }
        if let Some(dir) = non_empty_var(DATA_DIR_OVERRIDE) {
            self.data_dir = dir;
        }
    }

    /// The daemon endpoint, falling back to the environment's local port.
    pub fn daemon_endpoint(&self) -> ConfigResult<String> {
        if let Some(endpoint) = &self.daemon.endpoint {
            return Ok(endpoint.clone());
        }
        default_daemon_port(&self.env)
            .map(|port| format!("http://127.0.0.1:{}", port))
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "daemon.endpoint".into(),
                message: format!("no default for environment '{}'", self.env),
            })
    }

    pub fn daemon_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.timeout_secs)
    }

    pub fn layout_for(&self, consumer: &ConsumerConfig) -> CommitLayout {
        consumer
            .layout
            .unwrap_or(self.daemon.layout)
            .to_commit_layout()
    }

    pub fn consumer(&self, name: &str) -> Option<&ConsumerConfig> {
        self.consumers.iter().find(|c| c.name == name)
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// SQLite database holding the mirror tables for the current environment.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(format!("{}.db", self.env))
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.data_dir().join("locks")
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
