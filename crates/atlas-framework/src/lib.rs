//! # Atlas Framework
//!
//! Command dispatch and plugin lifecycle for the Atlas chat agent.
//!
//! This layer provides:
//! - [`CommandRegistry`]: command name to handler, plus the interceptor chain
//!   and private-message forwarders, swapped atomically on reload
//! - [`Plugin`] and [`PluginLoader`]: discovery, validation, registration,
//!   reload and install of plugins
//! - [`Dispatcher`]: routes each event through the mode gate, watchers,
//!   AFK auto-clear, interceptors, rate limiting and command lookup
//! - [`RateLimiter`], [`AfkState`], [`EventLog`], [`ConversationHub`] and
//!   [`ForwardRelay`]: the shared state plugins reach through [`Services`]
//! - [`Lifecycle`]: the restart and update seams implemented by the runtime
//! - [`builtin`]: the plugins compiled into every binary
//!
//! Transport and persistence live in `atlas-core` and `atlas-storage`;
//! configuration and process management live in `atlas-runtime`.

pub mod afk;
pub mod builtin;
pub mod context;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod eventlog;
pub mod handler;
pub mod lifecycle;
pub mod plugin;
pub mod ratelimit;
pub mod registry;
pub mod relay;
pub mod settings;

pub use afk::{AfkState, AfkStatus};
pub use context::{CommandContext, Service, Services};
pub use conversation::{ConversationHub, ConversationOutcome};
pub use dispatcher::{DispatchOutcome, Dispatcher, Watcher, parse_command};
pub use error::{InstallError, LifecycleError, LifecycleResult, PluginError};
pub use eventlog::{EventLog, LOG_CHAT_KEY};
pub use handler::{
    BoxedHandler, BoxedInterceptor, CommandHandler, Flow, Interceptor, handler_fn, interceptor_fn,
};
pub use lifecycle::{Lifecycle, Relauncher, UpdateCheck, UpdateSource};
pub use plugin::{
    BuiltinSource, LoadReport, ManifestSource, Plugin, PluginDescriptor, PluginLoader,
    PluginMetadata, PluginSource,
};
pub use ratelimit::{Admission, RateLimitPolicy, RateLimiter};
pub use registry::{CommandRegistry, CommandTable};
pub use relay::ForwardRelay;
pub use settings::Settings;

/// Everything a plugin module usually needs.
pub mod prelude {
    pub use async_trait::async_trait;

    pub use crate::context::{CommandContext, Services};
    pub use crate::handler::Flow;
    pub use crate::plugin::{Plugin, PluginMetadata};
    pub use crate::register_builtin;
}
