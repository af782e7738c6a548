//! Runtime error types.

use atlas_core::{ClientError, Identity};
use atlas_storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that abort startup.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The database could not be opened.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Neither identity could be started.
    #[error("No clients configured. Provide STRING_SESSION and/or BOT_TOKEN.")]
    NoClients,

    /// A configured identity failed to connect.
    #[error("Failed to start {identity} client: {source}")]
    Connect {
        identity: Identity,
        #[source]
        source: ClientError,
    },

    /// The runtime was built without a transport.
    #[error("No connector configured")]
    NoConnector,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
