//! SpecSuite Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.specsuite/config.toml`
//! - Local config: `.specsuite/config.toml` (in the suite source root)
//! - Caller overrides via `ConfigOverrides`
//!
//! Layers stack in order: global → local → overrides. See `ConfigLoader`.

mod error;
mod loader;
mod logging;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use logging::init_logging;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Log levels accepted by `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Root configuration for SpecSuite.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SuiteConfig {
    /// Suite identity and location
    pub suite: SuiteSection,

    /// Asset recognition settings
    pub assets: AssetsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Suite identity and source location.
///
/// # Example TOML
///
/// ```toml
/// [suite]
/// name = "css21"
/// source_root = "tests/css21"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SuiteSection {
    /// Human-readable suite name
    pub name: String,

    /// Root of the test sources; relative paths resolve against the workspace
    pub source_root: PathBuf,
}

impl Default for SuiteSection {
    fn default() -> Self {
        Self {
            name: "suite".to_string(),
            source_root: PathBuf::from("."),
        }
    }
}

/// Settings controlling how files turn into assets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetsConfig {
    /// File name of mergeable server configuration fragments
    pub config_fragment_name: String,

    /// File name of reftest manifests
    pub manifest_file_name: String,

    /// Script src suffix identifying the test harness
    pub harness_script_suffix: String,

    /// Script src suffix identifying the harness report script
    pub harness_report_suffix: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            config_fragment_name: ".htaccess".to_string(),
            manifest_file_name: "reftest.list".to_string(),
            harness_script_suffix: "/resources/testharness.js".to_string(),
            harness_report_suffix: "/resources/testharnessreport.js".to_string(),
        }
    }
}

impl AssetsConfig {
    /// Validate asset settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.config_fragment_name.trim().is_empty() {
            return Err(ConfigError::invalid(
                "assets.config_fragment_name",
                "must not be empty",
            ));
        }
        if self.manifest_file_name.trim().is_empty() {
            return Err(ConfigError::invalid(
                "assets.manifest_file_name",
                "must not be empty",
            ));
        }
        if self.config_fragment_name == self.manifest_file_name {
            return Err(ConfigError::invalid(
                "assets.manifest_file_name",
                "must differ from assets.config_fragment_name",
            ));
        }
        for (key, suffix) in [
            ("assets.harness_script_suffix", &self.harness_script_suffix),
            ("assets.harness_report_suffix", &self.harness_report_suffix),
        ] {
            if !suffix.starts_with('/') {
                return Err(ConfigError::invalid(
                    key,
                    format!("'{}' must start with '/'", suffix),
                ));
            }
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,

    /// Log file path (optional)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Validate the configured level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.to_lowercase();
        if VALID_LOG_LEVELS.contains(&level.as_str()) {
            Ok(())
        } else {
            Err(ConfigError::invalid(
                "logging.level",
                format!(
                    "unknown level '{}'. Valid values: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ))
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::invalid(
                "logging.format",
                format!("unknown format '{}'. Valid values: text, json", s),
            )),
        }
    }
}

/// Caller overrides for configuration values.
///
/// Applied over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override the suite source root
    pub source_root: Option<PathBuf>,

    /// Override log level
    pub log_level: Option<String>,

    /// Override log format
    pub log_format: Option<LogFormat>,
}

impl SuiteConfig {
    /// Apply overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref root) = overrides.source_root {
            self.suite.source_root = root.clone();
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }

        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.assets.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Get the effective source root for a workspace.
    pub fn source_root(&self, workspace_root: &Path) -> PathBuf {
        if self.suite.source_root.is_absolute() {
            self.suite.source_root.clone()
        } else {
            workspace_root.join(&self.suite.source_root)
        }
    }
}
