//! Error types for the Atlas framework.

use std::path::PathBuf;

use thiserror::Error;

use crate::plugin::Rejection;

/// Reasons a plugin failed to load.
///
/// A failure is isolated to the plugin that caused it; the load pass
/// records it and moves on.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin source could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The plugin manifest is not valid.
    #[error("invalid manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// A service the plugin requires is not registered.
    #[error("missing required service '{0}'")]
    MissingService(String),

    /// The initialization hook returned an error.
    #[error("initialization failed: {0}")]
    Init(String),

    /// The plugin panicked while loading.
    #[error("plugin panicked: {0}")]
    Panicked(String),
}

impl PluginError {
    /// Creates a manifest error.
    pub fn manifest(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Reasons an uploaded plugin could not be installed.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Only manifest files can be installed.
    #[error("unsupported plugin file '{0}', expected a .toml manifest")]
    UnsupportedFile(String),

    /// The uploaded manifest does not parse.
    #[error(transparent)]
    Invalid(#[from] PluginError),

    /// The manifest parses but is not a loadable plugin.
    #[error("plugin rejected: {0}")]
    Rejected(#[from] Rejection),

    /// No plugin directory is configured.
    #[error("no plugin directory configured")]
    NoInstallRoot,

    /// A plugin file with the same name already exists.
    #[error("plugin already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Writing the plugin file failed.
    #[error("failed to write plugin: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by restart and update operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The update source (repository) is not present.
    #[error("update source not available: {0}")]
    Unavailable(String),

    /// A version-control command failed.
    #[error("{command} failed: {message}")]
    Command { command: String, message: String },

    /// The process could not be replaced.
    #[error("relaunch failed: {0}")]
    Relaunch(String),
}

impl LifecycleError {
    /// Creates a command failure.
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
