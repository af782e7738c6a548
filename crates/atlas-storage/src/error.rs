//! Storage error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing the store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The database file could not be opened or created.
    #[error("Failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A statement failed.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The parent directory of the database could not be created.
    #[error("Failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be interpreted.
    #[error("Corrupt value in column '{column}': {value}")]
    Corrupt { column: &'static str, value: String },
}

impl StorageError {
    /// Creates a corrupt-value error.
    pub fn corrupt(column: &'static str, value: impl Into<String>) -> Self {
        Self::Corrupt {
            column,
            value: value.into(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
