//! Plugin system for the Atlas agent.
//!
//! # Architecture
//!
//! A plugin is anything implementing [`Plugin`]: it describes itself through
//! [`PluginMetadata`] and handles the commands it declares. Optional hooks
//! let it intercept outgoing primary messages or observe private messages to
//! the secondary identity.
//!
//! Plugins are discovered by [`PluginSource`]s and loaded by the
//! [`PluginLoader`], which validates metadata into a [`PluginDescriptor`],
//! checks required services, runs `init`, and registers commands and hooks
//! into a fresh command table that replaces the live one atomically.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use atlas_framework::prelude::*;
//!
//! #[derive(Default)]
//! struct Echo;
//!
//! #[async_trait]
//! impl Plugin for Echo {
//!     fn metadata(&self) -> PluginMetadata {
//!         PluginMetadata::named("Echo").command("echo", "Repeat the arguments")
//!     }
//!
//!     async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
//!         ctx.respond(&ctx.args().join(" ")).await?;
//!         Ok(())
//!     }
//! }
//!
//! register_builtin!(ECHO, Echo);
//! ```

mod descriptor;
mod loader;
mod manifest;
mod source;

use std::sync::Arc;

use async_trait::async_trait;
use linkme::distributed_slice;

pub use descriptor::{CommandSpec, DEFAULT_CATEGORY, PluginDescriptor, PluginMetadata, Rejection};
pub use loader::{Installed, LoadFailure, LoadReport, PluginLoader};
pub use manifest::{ScriptManifest, ScriptPlugin};
pub use source::{BuiltinSource, ManifestSource, PluginCandidate, PluginSource, StaticSource};

#[doc(hidden)]
pub use linkme;

use crate::context::{CommandContext, Services};
use crate::handler::{CommandHandler, Flow, Interceptor};

// ─── Plugin trait ─────────────────────────────────────────────────────────────

/// A unit of commands and hooks.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Describes the plugin. Called once per load pass.
    fn metadata(&self) -> PluginMetadata;

    /// Runs once per load pass, before registration. An error aborts loading
    /// this plugin only.
    async fn init(&self, _services: &Services) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handles one of the declared commands. `ctx.command()` says which.
    async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()>;

    /// Sees every outgoing primary message before command parsing when
    /// [`PluginMetadata::interceptor`] is set.
    async fn intercept(&self, _ctx: CommandContext) -> anyhow::Result<Flow> {
        Ok(Flow::Continue)
    }

    /// Sees every admitted private message to the secondary identity when
    /// [`PluginMetadata::private_forwarder`] is set.
    async fn forward_private(&self, _ctx: CommandContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A shared Plugin trait object.
pub type BoxedPlugin = Arc<dyn Plugin>;

// ─── Builtin registry (linkme distributed slice) ──────────────────────────────

/// Factory for a compiled-in plugin.
#[derive(Debug, Clone, Copy)]
pub struct PluginFactory {
    /// Module path of the registration site.
    pub origin: &'static str,
    pub create: fn() -> BoxedPlugin,
}

/// Every plugin registered with [`register_builtin!`](crate::register_builtin).
#[distributed_slice]
pub static BUILTIN_PLUGINS: [PluginFactory];

/// Registers a `Default` plugin type as a builtin.
///
/// ```rust,ignore
/// register_builtin!(PING, PingPlugin);
/// ```
#[macro_export]
macro_rules! register_builtin {
    ($name:ident, $ty:ty) => {
        #[$crate::plugin::linkme::distributed_slice($crate::plugin::BUILTIN_PLUGINS)]
        #[linkme(crate = $crate::plugin::linkme)]
        static $name: $crate::plugin::PluginFactory = $crate::plugin::PluginFactory {
            origin: ::core::module_path!(),
            create: || -> $crate::plugin::BoxedPlugin {
                ::std::sync::Arc::new(<$ty as ::core::default::Default>::default())
            },
        };
    };
}

// ─── Adapters into the command table ──────────────────────────────────────────

pub(crate) struct PluginCommand(pub(crate) BoxedPlugin);

#[async_trait]
impl CommandHandler for PluginCommand {
    async fn call(&self, ctx: CommandContext) -> anyhow::Result<()> {
        self.0.handle(ctx).await
    }
}

pub(crate) struct PluginInterceptor(pub(crate) BoxedPlugin);

#[async_trait]
impl Interceptor for PluginInterceptor {
    async fn intercept(&self, ctx: CommandContext) -> anyhow::Result<Flow> {
        self.0.intercept(ctx).await
    }
}

pub(crate) struct PluginPrivateForwarder(pub(crate) BoxedPlugin);

#[async_trait]
impl CommandHandler for PluginPrivateForwarder {
    async fn call(&self, ctx: CommandContext) -> anyhow::Result<()> {
        self.0.forward_private(ctx).await
    }
}
