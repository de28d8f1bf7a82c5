//! Settings for the command-line front end itself.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. "info" or "harmony=debug".
    /// Default: warn
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "warn".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// Where converted files go when the command line does not say.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File type for outputs without an explicit path ("mid" or "csv").
    /// Default: mid
    #[serde(default = "OutputConfig::default_format")]
    pub default_format: String,

    /// Directory for outputs without an explicit path.
    /// Default: next to the input
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Appended to the input's file stem to name the output.
    /// Default: -practice
    #[serde(default = "OutputConfig::default_suffix")]
    pub suffix: String,
}

impl OutputConfig {
    fn default_format() -> String {
        "mid".to_string()
    }

    fn default_suffix() -> String {
        "-practice".to_string()
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: Self::default_format(),
            directory: None,
            suffix: Self::default_suffix(),
        }
    }
}
