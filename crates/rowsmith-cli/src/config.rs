use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::ValueEnum;
use rowsmith_generate::{LocaleKey, Params, Value};
use rowsmith_recipe::ValidationMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "rowsmith.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("parameter '{name}' in config must be a scalar, got {kind}")]
    UnsupportedParam { name: String, kind: String },
}

/// Where generated rows go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Print rows to stdout.
    #[default]
    Debug,
    /// One CSV file per entity type.
    Csv,
    /// One JSON object per line.
    Jsonl,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub format: Option<OutputFormat>,
    pub path: Option<PathBuf>,
}

/// `rowsmith.toml`: defaults for the `generate` and `validate` commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    pub seed: Option<u64>,
    pub iterations: Option<u32>,
    pub locale: Option<LocaleKey>,
    pub validation: Option<ValidationMode>,
    pub run_dir: Option<PathBuf>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub params: BTreeMap<String, toml::Value>,
}

impl CliConfig {
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Config params converted to generation values.
    pub fn params(&self) -> Result<Params, ConfigError> {
        self.params
            .iter()
            .map(|(name, value)| Ok((name.clone(), toml_to_value(name, value)?)))
            .collect()
    }
}

/// Read `explicit`, or `rowsmith.toml` from the working directory if present.
pub fn load_config(explicit: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !path.exists() {
                return Ok(CliConfig::default());
            }
            path
        }
    };

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config = CliConfig::from_toml(&content, &path)?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}

pub fn toml_to_value(name: &str, value: &toml::Value) -> Result<Value, ConfigError> {
    match value {
        toml::Value::String(text) => Ok(Value::Text(text.clone())),
        toml::Value::Integer(number) => Ok(Value::Int(*number)),
        toml::Value::Float(number) => Ok(Value::Float(*number)),
        toml::Value::Boolean(flag) => Ok(Value::Bool(*flag)),
        toml::Value::Datetime(datetime) => {
            let text = datetime.to_string();
            Ok(NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .map(Value::Date)
                .unwrap_or(Value::Text(text)))
        }
        other => Err(ConfigError::UnsupportedParam {
            name: name.to_string(),
            kind: other.type_str().to_string(),
        }),
    }
}
