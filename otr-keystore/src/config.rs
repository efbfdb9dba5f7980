//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Enable debug logging
    #[serde(default)]
    pub verbose: bool,

    /// Account aliases each fingerprint row is written for
    #[serde(default)]
    pub accounts: Vec<String>,

    /// Default listing format (text, json)
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            accounts: Vec::new(),
            output_format: default_output_format(),
        }
    }
}

impl CliConfig {
    /// Load configuration from file
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_owned(),
            None => Self::default_config_path()?,
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config_path: Option<&Path>) -> Result<()> {
        let config_path = match config_path {
            Some(path) => path.to_owned(),
            None => Self::default_config_path()?,
        };

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get default configuration file path
    fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Cannot determine config directory")?;

        Ok(config_dir.join("otr-keystore").join("config.toml"))
    }
}

fn default_output_format() -> String {
    "text".to_string()
}
