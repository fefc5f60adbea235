//! Tracing subscriber installation driven by `[logging]`.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::warn;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::error::ConfigError;
use crate::{LogFormat, LoggingConfig};

/// Install a global tracing subscriber for the given logging settings.
///
/// `RUST_LOG` takes precedence over `logging.level` when set. Logs go to
/// `logging.file` when configured, stderr otherwise. If a global subscriber
/// is already installed, the existing one is kept and this is a no-op.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_lowercase()))
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    let installed = match (&config.file, config.format) {
        (Some(path), format) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::io("create", parent, e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ConfigError::io("open", path, e))?;
            let builder = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false);
            match format {
                LogFormat::Text => builder.finish().try_init(),
                LogFormat::Json => builder.json().finish().try_init(),
            }
        }
        (None, LogFormat::Text) => FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish()
            .try_init(),
        (None, LogFormat::Json) => FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .finish()
            .try_init(),
    };

    if installed.is_err() {
        warn!("Using existing tracing subscriber; logging settings ignored");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rejects_unknown_level() {
        let config = LoggingConfig {
            level: "chatty".to_string(),
            ..Default::default()
        };
        assert!(init_logging(&config).is_err());
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let temp = TempDir::new().unwrap();
        let config = LoggingConfig {
            file: Some(temp.path().join("logs").join("suite.log")),
            ..Default::default()
        };

        init_logging(&config).unwrap();
        init_logging(&LoggingConfig::default()).unwrap();

        assert!(temp.path().join("logs").join("suite.log").exists());
    }
}
