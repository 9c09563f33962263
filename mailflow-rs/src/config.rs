use ::config::{Config as Layers, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{MailflowError, Result};
use crate::probe::PollSettings;

const ENV_PREFIX: &str = "MAILFLOW";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// How long to wait for a probe before reporting failure
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Pause between two mailbox fetches
    #[serde(default = "default_sleep_seconds")]
    pub sleep_seconds: u64,
    pub sender: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// `pretty`, `compact` or `json`
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_sleep_seconds() -> u64 {
    5
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| MailflowError::Config(e.to_string()))?;

        toml::from_str(&content).map_err(|e| MailflowError::Config(e.to_string()))
    }

    /// Defaults, then the optional TOML file, then `MAILFLOW__*` variables
    ///
    /// `MAILFLOW__PROBE__TIMEOUT_SECONDS=60` overrides `probe.timeout_seconds`;
    /// `MAILFLOW__PROBE__RECIPIENTS` takes a comma separated list.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_layers(path, environment())
    }

    fn load_layers(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Layers::builder().add_source(
            Layers::try_from(&Config::default()).map_err(|e| MailflowError::Config(e.to_string()))?,
        );

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .add_source(environment)
            .build()
            .and_then(|layers| layers.try_deserialize())
            .map_err(|e| MailflowError::Config(e.to_string()))
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .list_separator(",")
        .with_list_parse_key("probe.recipients")
        .try_parsing(true)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ProbeConfig {
    /// Validated poll settings; zero values are rejected
    pub fn poll_settings(&self) -> Result<PollSettings> {
        PollSettings::new(
            Duration::from_secs(self.timeout_seconds),
            Duration::from_secs(self.sleep_seconds),
        )
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            sleep_seconds: default_sleep_seconds(),
            sender: None,
            recipients: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}
