use crate::snapshot::Field;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default)]
    pub on_exhausted: ExhaustedPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

/// What the monitor loop does when every delivery attempt for one alert
/// has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustedPolicy {
    /// Terminate the daemon (process exit code 2).
    Stop,
    /// Log the loss and move on to the next tick.
    #[default]
    Continue,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            delivery: DeliveryConfig::default(),
            sink: SinkConfig::default(),
            thresholds: BTreeMap::new(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            on_exhausted: ExhaustedPolicy::default(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token_env: default_token_env(),
            token: None,
            channel: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("config validation error: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs < 1 {
            return Err(ConfigError::Validation(
                "interval_secs must be >= 1".to_string(),
            ));
        }

        validate_delivery(&self.delivery)?;
        validate_sink(&self.sink)?;
        validate_thresholds(&self.thresholds)?;

        Ok(())
    }

    /// Token for the sink endpoint: the environment variable named by
    /// `sink.token_env` wins over the value in the config file.
    pub fn resolve_sink_token(&self) -> Option<String> {
        if let Ok(value) = std::env::var(&self.sink.token_env) {
            if !value.trim().is_empty() {
                return Some(value);
            }
        }
        self.sink
            .token
            .as_ref()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Thresholds resolved against the field registry, in registry order.
    /// Valid only after `validate()` has accepted the key set.
    pub fn parsed_thresholds(&self) -> Vec<(Field, f64)> {
        Field::ALL
            .iter()
            .filter_map(|field| {
                self.thresholds
                    .get(field.as_str())
                    .map(|limit| (*field, *limit))
            })
            .collect()
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_delivery(cfg: &DeliveryConfig) -> Result<(), ConfigError> {
    if cfg.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "delivery.max_attempts must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_sink(cfg: &SinkConfig) -> Result<(), ConfigError> {
    let Some(endpoint) = &cfg.endpoint else {
        return Ok(());
    };
    if endpoint.trim().is_empty() {
        return Err(ConfigError::Validation(
            "sink.endpoint must not be empty when set".to_string(),
        ));
    }
    match &cfg.channel {
        Some(channel) if !channel.trim().is_empty() => {}
        _ => {
            return Err(ConfigError::Validation(
                "sink.channel is required when sink.endpoint is set".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_thresholds(thresholds: &BTreeMap<String, f64>) -> Result<(), ConfigError> {
    for (key, limit) in thresholds {
        if Field::parse(key).is_none() {
            return Err(ConfigError::Validation(format!(
                "unknown threshold field '{}'; evaluable fields are: {}",
                key,
                Field::ALL
                    .iter()
                    .map(|f| f.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        if !limit.is_finite() {
            return Err(ConfigError::Validation(format!(
                "threshold '{}' must be a finite number",
                key
            )));
        }
    }
    Ok(())
}

const fn default_interval_secs() -> u64 {
    5
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_retry_delay_secs() -> u64 {
    60
}

fn default_token_env() -> String {
    "SLACK_BOT_TOKEN".to_string()
}
