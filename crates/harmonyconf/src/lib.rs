//! Layered configuration loading for harmonyhelper.
//!
//! # Usage
//!
//! ```rust,no_run
//! use harmonyconf::HarmonyConfig;
//!
//! let config = HarmonyConfig::load().expect("Failed to load config");
//! println!("log level: {}", config.logging.level);
//! println!("remove panning: {}", config.transform.remove_panning);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/harmonyhelper/config.toml` (system)
//! 2. `~/.config/harmonyhelper/config.toml` (user)
//! 3. `./harmonyhelper.toml` (local override, or the `--config` path)
//! 4. Environment variables (`HARMONYHELPER_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [output]
//! default_format = "mid"
//! directory = "~/practice"
//!
//! [transform]
//! remove_panning = true
//!
//! [transform.highlight]
//! track = 3
//! pan = true
//!
//! [transform.divisi]
//! policy = "keep_higher"
//!
//! [transform.metronome]
//! enabled = true
//! ```

pub mod loader;
pub mod settings;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use settings::{LoggingConfig, OutputConfig};

use harmony::TransformConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}

/// Complete harmonyhelper configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HarmonyConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Transform defaults; command-line flags are applied on top.
    #[serde(default)]
    pub transform: TransformConfig,
}

impl HarmonyConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` standing in for the local
    /// `./harmonyhelper.toml`. System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(config_path);
        let (mut config, mut sources) = Self::load_files(&files)?;

        // Apply environment variable overrides
        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Layer the given files in order, without looking at the environment.
    pub fn load_files(files: &[PathBuf]) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in files {
            let table = loader::load_table(path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path.clone());
        }

        let origin = files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let config = loader::from_table(merged, &origin)?;
        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(format!("# harmonyhelper configuration\n\n{body}"))
    }
}
