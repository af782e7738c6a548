//! # Atlas
//!
//! A self-hosted chat automation agent. Atlas connects to a messaging
//! network as a primary (user) identity, a secondary (bot) identity, or
//! both, and routes their messages to plugins.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   events   ┌────────────┐   ┌──────────────┐
//! │ Connector │───────────▶│ Dispatcher │──▶│ Interceptors │──▶ Flow::Handled
//! │ (primary, │            │ (per event │   └──────────────┘
//! │ secondary)│            │   task)    │──▶ Rate limiter ──▶ PM forwarders
//! └───────────┘            └────────────┘──▶ Command registry ──▶ Plugin::handle
//! ```
//!
//! - [`core`]: identities, events and the `Client`/`Connector` boundary
//! - [`storage`]: key-value store, control state and forwarding rules
//! - [`framework`]: registry, plugin loader, dispatcher and built-in plugins
//! - [`runtime`]: configuration, logging, sessions and process lifecycle
//! - [`console`]: a terminal loopback transport
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use atlas::prelude::*;
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
//!
//! ## Features
//!
//! - `json-log`: enables `format = "json"` for console logging

pub mod console;

pub use atlas_core as core;
pub use atlas_framework as framework;
pub use atlas_runtime as runtime;
pub use atlas_storage as storage;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use atlas::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use atlas_runtime::{AtlasConfig, AtlasRuntime, ConfigLoader};

    // Transport boundary
    pub use atlas_core::{
        BoxedClient, ChatId, Client, ClientError, ClientResult, Connector, Credentials, Identity,
        MessageEvent, MessageId, RunMode, Session, UserId,
    };

    // Plugin system
    pub use atlas_framework::prelude::*;
    pub use atlas_framework::{PluginLoader, Services};

    pub use crate::console::ConsoleConnector;
}
