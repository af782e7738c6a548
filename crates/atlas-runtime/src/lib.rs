//! Atlas Runtime - process layer of the Atlas chat agent.
//!
//! This crate provides:
//! - Layered configuration (`atlas.toml`, `ATLAS_*` and legacy variables)
//!   with fail-fast validation ([`config`])
//! - Console and append-only file logging ([`logging`])
//! - Dual-identity session management ([`SessionManager`])
//! - Startup reconciliation, restart strategies and git updates
//!   ([`lifecycle`])
//! - Runtime orchestration ([`AtlasRuntime`])
//!
//! ```ignore
//! use atlas_runtime::AtlasRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = AtlasRuntime::builder()
//!         .connector(MyConnector::new())
//!         .build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod runtime;
pub mod session;

pub use config::{AtlasConfig, ConfigError, ConfigLoader, ConfigResult};
pub use error::{RuntimeError, RuntimeResult};
pub use lifecycle::{ExecRelauncher, ExitRelauncher, GitUpdateSource, Startup, reconcile};
pub use logging::{LogGuard, LoggingBuilder};
pub use runtime::{AtlasRuntime, Running, RuntimeBuilder, shutdown_signal};
pub use session::SessionManager;

// Re-export tracing for use by other crates
pub use tracing;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};

    pub use crate::{AtlasConfig, AtlasRuntime, RuntimeError};
}
