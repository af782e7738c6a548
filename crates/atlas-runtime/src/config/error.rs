//! Errors raised while loading or validating `atlas.toml` and the environment.

use std::path::PathBuf;

use thiserror::Error;

/// Why an [`AtlasConfig`](super::AtlasConfig) could not be produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Sources could not be merged or extracted into [`AtlasConfig`](super::AtlasConfig).
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// A value is present but unusable (bad log level, zero rate limit).
    #[error("Invalid configuration: {message}")]
    ValidationError { message: String },

    /// A credential or id the run mode needs is absent.
    #[error("Missing required configuration value: {field}")]
    MissingField { field: String },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::ValidationError`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Shorthand for [`ConfigError::MissingField`], named by its legacy variable.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::ParseError(e.to_string())
    }
}

/// Result alias used across the config module.
pub type ConfigResult<T> = Result<T, ConfigError>;
