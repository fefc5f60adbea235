//! Layered suite settings.
//!
//! A `SuiteConfig` is built from defaults, then each layer file that exists,
//! then caller overrides:
//! 1. `~/.specsuite/config.toml`
//! 2. `<suite root>/.specsuite/config.toml`
//!
//! A layer only changes the keys it spells out. A key set to its default
//! value in a later layer still wins over an earlier layer.

use crate::error::ConfigError;
use crate::{ConfigOverrides, LogFormat, SuiteConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const LAYER_DIR: &str = ".specsuite";
const LAYER_FILE: &str = "config.toml";

/// Finds and stacks config layers for a suite root.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    home_layer: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader whose first layer lives under the user's home directory.
    pub fn new() -> Self {
        Self {
            home_layer: dirs::home_dir().map(|home| home.join(LAYER_DIR).join(LAYER_FILE)),
        }
    }

    /// Loader whose first layer is `<dir>/config.toml`.
    pub fn with_global_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            home_layer: Some(dir.as_ref().join(LAYER_FILE)),
        }
    }

    /// Layer file inside a suite root.
    pub fn suite_layer(suite_root: &Path) -> PathBuf {
        suite_root.join(LAYER_DIR).join(LAYER_FILE)
    }

    /// Candidate layer files for `suite_root`, lowest precedence first.
    pub fn layers(&self, suite_root: &Path) -> Vec<PathBuf> {
        self.home_layer
            .iter()
            .cloned()
            .chain(std::iter::once(Self::suite_layer(suite_root)))
            .collect()
    }

    /// Stack defaults, existing layers and `overrides`, then validate.
    pub fn load(
        &self,
        suite_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<SuiteConfig, ConfigError> {
        let mut config = SuiteConfig::default();
        for path in self.layers(suite_root) {
            if !path.is_file() {
                trace!(path = %path.display(), "No config layer");
                continue;
            }
            debug!(path = %path.display(), "Applying config layer");
            Layer::read(&path)?.apply(&mut config);
        }
        if let Some(overrides) = overrides {
            config.apply_overrides(overrides);
        }
        config.validate()?;
        Ok(config)
    }

    /// Write a default layer into `suite_root` unless one exists already.
    pub fn init_local(suite_root: &Path) -> Result<PathBuf, ConfigError> {
        let path = Self::suite_layer(suite_root);
        if !path.exists() {
            SuiteConfig::default().write(&path)?;
        }
        Ok(path)
    }
}

impl SuiteConfig {
    /// Render these settings as a complete layer file at `path`.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::io("create", dir, e))?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| ConfigError::io("write", path, e))
    }
}

// ============================================================================
// Partial layers
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Layer {
    suite: SuiteLayer,
    assets: AssetsLayer,
    logging: LoggingLayer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SuiteLayer {
    name: Option<String>,
    source_root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssetsLayer {
    config_fragment_name: Option<String>,
    manifest_file_name: Option<String>,
    harness_script_suffix: Option<String>,
    harness_report_suffix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoggingLayer {
    level: Option<String>,
    format: Option<LogFormat>,
    file: Option<PathBuf>,
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl Layer {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io("read", path, e))?;
        toml::from_str(&text).map_err(|source| ConfigError::Layer {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply(self, config: &mut SuiteConfig) {
        let Layer {
            suite,
            assets,
            logging,
        } = self;

        set(&mut config.suite.name, suite.name);
        set(&mut config.suite.source_root, suite.source_root);

        set(&mut config.assets.config_fragment_name, assets.config_fragment_name);
        set(&mut config.assets.manifest_file_name, assets.manifest_file_name);
        set(&mut config.assets.harness_script_suffix, assets.harness_script_suffix);
        set(&mut config.assets.harness_report_suffix, assets.harness_report_suffix);

        set(&mut config.logging.level, logging.level);
        set(&mut config.logging.format, logging.format);
        if logging.file.is_some() {
            config.logging.file = logging.file;
        }
    }
}
