//! Transport error taxonomy.
//!
//! Every call through [`Client`](crate::Client) fails with a [`ClientError`].
//! Callers decide at the call site whether an error is fatal for their
//! operation or can be downgraded (for example "try edit, fall back to reply").

use thiserror::Error;

/// Errors returned by the messaging transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The connection is not established or was lost.
    #[error("client is not connected")]
    NotConnected,

    /// The network did not answer in time.
    #[error("request timed out")]
    Timeout,

    /// The network asked us to slow down.
    #[error("flood wait: retry after {seconds}s")]
    FloodWait {
        /// Seconds to wait before retrying.
        seconds: u64,
    },

    /// The peer blocked this account.
    #[error("peer has blocked this account")]
    Blocked,

    /// The network rejected the request (missing rights, bad id, ...).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The transport does not implement the operation.
    #[error("operation not supported by this transport: {0}")]
    Unsupported(&'static str),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Creates a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Creates a generic transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport(reason.into())
    }
}

/// Result type for transport operations.
pub type ClientResult<T> = Result<T, ClientError>;
