use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{EngineConfig, RateLimitScope};
use crate::status::StatusConfig;

const CONFIG_ENV: &str = "PANO_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "pano.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pano: PanoConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub status: StatusSection,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

/// General settings
#[derive(Debug, Clone, Deserialize)]
pub struct PanoConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Default location for saving and loading the investigation graph.
    #[serde(default)]
    pub graph_path: Option<PathBuf>,
}

impl Default for PanoConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            graph_path: None,
        }
    }
}

/// Transform engine limits
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    #[serde(default)]
    pub rate_limit_scope: RateLimitScope,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_ms: default_timeout_ms(),
            rate_limit_ms: default_rate_limit_ms(),
            rate_limit_scope: RateLimitScope::default(),
        }
    }
}

/// Status reporter settings
#[derive(Debug, Clone, Deserialize)]
pub struct StatusSection {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            max_message_len: default_max_message_len(),
        }
    }
}

/// Extra plugin sources and exclusions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginsConfig {
    /// TOML files holding `[[entity_type]]` definitions.
    #[serde(default)]
    pub entity_type_files: Vec<PathBuf>,
    /// Transform names left out of the registry.
    #[serde(default)]
    pub disabled_transforms: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_rate_limit_ms() -> u64 {
    1_000
}

fn default_channel_capacity() -> usize {
    256
}

fn default_max_message_len() -> usize {
    100
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in PANO_CONFIG environment variable
    /// 2. ./pano.toml in current directory (defaults when absent)
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    log::debug!("No {} found, using default configuration", DEFAULT_CONFIG_FILE);
                    Config::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_concurrency == 0 {
            anyhow::bail!("engine.max_concurrency must be greater than 0");
        }

        if self.engine.timeout_ms == 0 {
            anyhow::bail!("engine.timeout_ms must be greater than 0");
        }

        if self.status.channel_capacity == 0 {
            anyhow::bail!("status.channel_capacity must be greater than 0");
        }

        if self.status.max_message_len < 4 {
            anyhow::bail!("status.max_message_len must be at least 4");
        }

        for file in &self.plugins.entity_type_files {
            if !file.is_file() {
                anyhow::bail!(
                    "plugins.entity_type_files entry does not exist: {}",
                    file.display()
                );
            }
        }

        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrency: self.engine.max_concurrency,
            timeout: Duration::from_millis(self.engine.timeout_ms),
            rate_limit: Duration::from_millis(self.engine.rate_limit_ms),
            rate_limit_scope: self.engine.rate_limit_scope,
        }
    }

    pub fn status_config(&self) -> StatusConfig {
        StatusConfig {
            channel_capacity: self.status.channel_capacity,
            max_message_len: self.status.max_message_len,
        }
    }

    pub fn graph_path(&self) -> Option<&Path> {
        self.pano.graph_path.as_deref()
    }
}
