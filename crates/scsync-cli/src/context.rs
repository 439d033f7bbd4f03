use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result};
use scsync_config::{
    to_consumer, validate_project, CheckpointBackend, ConsumerConfig, ProjectConfig,
};
use scsync_core::{CheckpointEntry, CheckpointStore, Consumer, MaterializerConfig};
use scsync_daemon::DaemonClient;
use scsync_state::{CounterFile, SqliteCheckpointStore, SqliteMirror};
use tracing::debug;

/// Loaded project plus the handles every command needs.
pub struct Context {
    pub config: ProjectConfig,
}

impl Context {
    pub fn load(path: &Path, env: Option<&str>) -> Result<Self> {
        let mut config = ProjectConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        if let Some(env) = env {
            config.env = env.to_string();
        }
        Self::new(config)
    }

    pub fn new(config: ProjectConfig) -> Result<Self> {
        validate_project(&config).context("Invalid configuration")?;
        debug!(env = %config.env, consumers = config.consumers.len(), "Project loaded");
        Ok(Self { config })
    }

    /// Configured consumer by name, or every consumer when `name` is `None`.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<&ConsumerConfig>> {
        match name {
            Some(name) => Ok(vec![self.consumer_config(name)?]),
            None => Ok(self.config.consumers.iter().collect()),
        }
    }

    pub fn consumer_config(&self, name: &str) -> Result<&ConsumerConfig> {
        self.config.consumer(name).with_context(|| {
            format!(
                "Consumer '{}' not found. Run 'scsync consumers' to list them.",
                name
            )
        })
    }

    pub fn resolve(&self, consumer: &ConsumerConfig) -> Result<Consumer> {
        Ok(to_consumer(consumer, &self.config.env)?)
    }

    pub fn client(&self, consumer: &ConsumerConfig) -> Result<DaemonClient> {
        let endpoint = self.config.daemon_endpoint()?;
        DaemonClient::connect(
            &endpoint,
            self.config.daemon_timeout(),
            self.config.layout_for(consumer),
        )
        .with_context(|| format!("Failed to set up daemon client for {}", endpoint))
    }

    pub fn materializer_config(&self) -> MaterializerConfig {
        MaterializerConfig {
            chunk_size: self.config.sync.chunk_size,
            retry: self.config.retry.to_policy(),
        }
    }

    pub fn mirror(&self) -> Result<SqliteMirror> {
        self.ensure_data_dir()?;
        let path = self.config.database_path();
        SqliteMirror::open(&path)
            .with_context(|| format!("Failed to open mirror database {}", path.display()))
    }

    pub fn checkpoints(&self) -> Result<Checkpoints> {
        self.ensure_data_dir()?;
        match self.config.sync.checkpoints {
            CheckpointBackend::File => {
                let path = CounterFile::path_for(self.config.data_dir(), &self.config.env);
                let file = CounterFile::open(&path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                Ok(Checkpoints::File(file))
            }
            CheckpointBackend::Sqlite => {
                let path = self.config.database_path();
                let store = SqliteCheckpointStore::open(&path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                Ok(Checkpoints::Sqlite(store))
            }
        }
    }

    fn ensure_data_dir(&self) -> Result<()> {
        let dir = self.config.data_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))
    }
}

/// Checkpoint backend selected by `[sync] checkpoints`.
pub enum Checkpoints {
    File(CounterFile),
    Sqlite(SqliteCheckpointStore),
}

impl Checkpoints {
    pub fn describe(&self) -> String {
        match self {
            Checkpoints::File(file) => file.path().display().to_string(),
            Checkpoints::Sqlite(_) => "sqlite".to_string(),
        }
    }

    /// Last write time, when the backend records one.
    pub fn updated_at(&self, stream: &str, consumer: &str) -> Result<Option<String>> {
        match self {
            Checkpoints::File(_) => Ok(None),
            Checkpoints::Sqlite(store) => Ok(store
                .updated_at(stream, consumer)?
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())),
        }
    }
}

impl CheckpointStore for Checkpoints {
    fn get(&self, stream: &str, consumer: &str) -> scsync_core::Result<u64> {
        match self {
            Checkpoints::File(s) => s.get(stream, consumer),
            Checkpoints::Sqlite(s) => s.get(stream, consumer),
        }
    }

    fn set(&mut self, stream: &str, consumer: &str, index: u64) -> scsync_core::Result<()> {
        match self {
            Checkpoints::File(s) => s.set(stream, consumer, index),
            Checkpoints::Sqlite(s) => s.set(stream, consumer, index),
        }
    }

    fn entries(&self) -> scsync_core::Result<Vec<CheckpointEntry>> {
        match self {
            Checkpoints::File(s) => s.entries(),
            Checkpoints::Sqlite(s) => s.entries(),
        }
    }

    fn reset(&mut self, stream: &str, consumer: &str) -> scsync_core::Result<()> {
        match self {
            Checkpoints::File(s) => s.reset(stream, consumer),
            Checkpoints::Sqlite(s) => s.reset(stream, consumer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(dir: &Path, backend: &str) -> Context {
        let toml = format!(
            r#"
env = "testnet"
data_dir = "{}"

[sync]
checkpoints = "{}"

[[consumer]]
name = "auctions"
preset = "asset-trade-auction"
"#,
            dir.display(),
            backend
        );
        Context::new(ProjectConfig::parse(&toml).unwrap()).unwrap()
    }

    #[test]
    fn test_file_checkpoints_persist() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "file");

        let mut checkpoints = ctx.checkpoints().unwrap();
        checkpoints.set("sc", "auctions", 12).unwrap();
        assert!(dir.path().join("testnet_counts.json").exists());

        let reopened = ctx.checkpoints().unwrap();
        assert_eq!(reopened.get("sc", "auctions").unwrap(), 12);
        assert!(reopened.updated_at("sc", "auctions").unwrap().is_none());
    }

    #[test]
    fn test_sqlite_checkpoints_share_database() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "sqlite");

        let _mirror = ctx.mirror().unwrap();
        let mut checkpoints = ctx.checkpoints().unwrap();
        checkpoints.set("sc", "auctions", 3).unwrap();

        assert!(dir.path().join("testnet.db").exists());
        assert_eq!(ctx.checkpoints().unwrap().get("sc", "auctions").unwrap(), 3);
        assert!(checkpoints.updated_at("sc", "auctions").unwrap().is_some());
    }

    #[test]
    fn test_resolve_uses_preset_contract() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "file");

        let consumer = ctx.resolve(ctx.consumer_config("auctions").unwrap()).unwrap();
        assert!(!consumer.stream.is_empty());
        assert!(ctx.consumer_config("missing").is_err());
        assert_eq!(ctx.select(None).unwrap().len(), 1);
    }
}
