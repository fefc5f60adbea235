//! Errors raised while reading, validating or applying suite settings.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A config layer or log file could not be touched on disk
    #[error("cannot {action} '{}': {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config layer is not valid TOML for `SuiteConfig`
    #[error("malformed config layer '{}': {source}", path.display())]
    Layer {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The default layer could not be rendered
    #[error("cannot render config: {0}")]
    Render(#[from] toml::ser::Error),

    /// A merged setting is out of range
    #[error("invalid value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },

    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

impl ConfigError {
    pub(crate) fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }

    /// Setting key for `Invalid` errors.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { key, .. } => Some(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_names_key() {
        let err = ConfigError::invalid("logging.level", "unknown level 'loud'");
        assert_eq!(err.key(), Some("logging.level"));
        assert_eq!(
            err.to_string(),
            "invalid value for 'logging.level': unknown level 'loud'"
        );
    }

    #[test]
    fn test_io_error_names_action_and_path() {
        let err = ConfigError::io(
            "read",
            Path::new("/tmp/missing.toml"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "cannot read '/tmp/missing.toml': gone");
        assert_eq!(err.key(), None);
    }
}
