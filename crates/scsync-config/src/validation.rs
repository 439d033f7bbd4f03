use std::collections::{HashMap, HashSet};

use scsync_core::{presets, Consumer, Decomposer, Rule, TableSchema};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::project::{ConsumerConfig, ProjectConfig};

/// Validate the project as a whole, without resolving contract ids.
pub fn validate_project(config: &ProjectConfig) -> ConfigResult<()> {
    if config.env.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "env".into(),
            message: "must not be empty".into(),
        });
    }

    if config.sync.chunk_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "sync.chunk_size".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        return Err(ConfigError::InvalidValue {
            field: "retry.base_delay_ms".into(),
            message: "must not exceed retry.max_delay_ms".into(),
        });
    }

    let mut seen = HashSet::new();
    let mut owners: HashMap<String, &str> = HashMap::new();
    for consumer in &config.consumers {
        validate_consumer(consumer)?;
        if !seen.insert(consumer.name.as_str()) {
            return Err(ConfigError::DuplicateConsumer(consumer.name.clone()));
        }

        // A zero checkpoint clears the consumer's tables, so tables are never shared.
        for table in table_names(consumer)? {
            if let Some(first) = owners.insert(table.clone(), &consumer.name) {
                return Err(ConfigError::SharedTable {
                    table,
                    first: first.to_string(),
                    second: consumer.name.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Mirror tables a consumer writes to.
fn table_names(consumer: &ConsumerConfig) -> ConfigResult<Vec<String>> {
    if consumer.preset.is_none() {
        return Ok(consumer.tables.iter().map(|t| t.name.clone()).collect());
    }
    Ok(build_decomposer(consumer)?
        .tables()
        .iter()
        .map(|t| t.name.clone())
        .collect())
}

/// Validate a single consumer definition.
pub fn validate_consumer(consumer: &ConsumerConfig) -> ConfigResult<()> {
    validate_consumer_name(&consumer.name)?;

    let custom = !consumer.tables.is_empty() || !consumer.rules.is_empty();
    match (&consumer.preset, custom) {
        (Some(_), true) => {
            return Err(ConfigError::ConflictingDefinition {
                consumer: consumer.name.clone(),
            })
        }
        (None, false) => {
            return Err(ConfigError::EmptyDefinition {
                consumer: consumer.name.clone(),
            })
        }
        (Some(preset), false) => {
            if presets::find(preset).is_none() {
                return Err(ConfigError::UnknownPreset {
                    consumer: consumer.name.clone(),
                    preset: preset.clone(),
                });
            }
        }
        (None, true) => {
            if consumer.tables.is_empty() || consumer.rules.is_empty() {
                return Err(ConfigError::EmptyDefinition {
                    consumer: consumer.name.clone(),
                });
            }
            // Catches bad templates and unknown tables before any sync.
            build_decomposer(consumer)?;
        }
    }

    Ok(())
}

/// Names double as checkpoint keys and lock file names.
fn validate_consumer_name(name: &str) -> ConfigResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ConfigError::InvalidConsumerName(name.to_string()));
    }
    Ok(())
}

fn build_decomposer(consumer: &ConsumerConfig) -> ConfigResult<Decomposer> {
    let definition = |source| ConfigError::Definition {
        consumer: consumer.name.clone(),
        source,
    };

    if let Some(name) = &consumer.preset {
        let preset = presets::find(name).ok_or_else(|| ConfigError::UnknownPreset {
            consumer: consumer.name.clone(),
            preset: name.clone(),
        })?;
        return preset.decomposer().map_err(definition);
    }

    let tables = consumer
        .tables
        .iter()
        .map(|t| {
            let schema = TableSchema::new(t.name.clone(), t.key.clone(), t.columns.clone())?;
            match &t.require {
                Some(column) => schema.require(column.clone()),
                None => Ok(schema),
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(definition)?;

    let rules = consumer
        .rules
        .iter()
        .map(|r| {
            let mut builder = Rule::builder(r.template.clone())
                .table(r.table.clone())
                .on_delete(r.on_delete);
            if let Some(column) = &r.column {
                builder = builder.column(column.clone());
            }
            for ignored in &r.ignore {
                builder = builder.ignore(ignored.clone());
            }
            builder.build()
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(definition)?;

    Decomposer::new(tables, rules).map_err(definition)
}

/// Convert a validated consumer config into a runnable [`Consumer`] for `env`.
///
/// The stream is the contract id configured for `env`, or the preset's
/// published default.
pub fn to_consumer(consumer: &ConsumerConfig, env: &str) -> ConfigResult<Consumer> {
    validate_consumer(consumer)?;

    let stream = consumer
        .contract
        .get(env)
        .filter(|id| !id.is_empty())
        .cloned()
        .or_else(|| {
            consumer
                .preset
                .as_deref()
                .and_then(presets::find)
                .and_then(|p| p.contract(env))
                .map(str::to_string)
        })
        .ok_or_else(|| ConfigError::MissingContract {
            consumer: consumer.name.clone(),
            env: env.to_string(),
        })?;

    let decomposer = build_decomposer(consumer)?;
    debug!(consumer = %consumer.name, stream = %stream, "Resolved consumer");

    Ok(Consumer::new(consumer.name.clone(), stream, decomposer))
}

/// Validate the project and resolve every consumer for its environment.
pub fn to_consumers(config: &ProjectConfig) -> ConfigResult<Vec<Consumer>> {
    validate_project(config)?;
    config
        .consumers
        .iter()
        .map(|c| to_consumer(c, &config.env))
        .collect()
}
