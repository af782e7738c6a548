//! Handler traits.
//!
//! Two kinds of callables are stored in the [`CommandRegistry`](crate::CommandRegistry):
//!
//! - [`CommandHandler`]: invoked for a parsed command (and for private-message
//!   forwarders, which share the signature).
//! - [`Interceptor`]: inspects a primary-identity message before command
//!   parsing and reports whether it consumed the event.
//!
//! Plugins are adapted into both automatically. Plain async closures work too:
//!
//! ```rust,ignore
//! registry.register("echo", handler_fn(|ctx: CommandContext| async move {
//!     ctx.respond(&ctx.args().join(" ")).await?;
//!     Ok(())
//! }));
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use crate::context::CommandContext;

/// Whether an interceptor consumed the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep going: run the next interceptor, then command parsing.
    Continue,
    /// Stop: the event was fully handled.
    Handled,
}

/// A command (or private-message) handler.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn call(&self, ctx: CommandContext) -> anyhow::Result<()>;
}

/// A shared CommandHandler trait object.
pub type BoxedHandler = Arc<dyn CommandHandler>;

/// A raw interceptor run before command parsing.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn intercept(&self, ctx: CommandContext) -> anyhow::Result<Flow>;
}

/// A shared Interceptor trait object.
pub type BoxedInterceptor = Arc<dyn Interceptor>;

// ─── Closure adapters ────────────────────────────────────────────────────────

struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> CommandHandler for HandlerFn<F>
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn call(&self, ctx: CommandContext) -> anyhow::Result<()> {
        (self.0)(ctx).await
    }
}

/// Wraps an async closure as a [`BoxedHandler`].
pub fn handler_fn<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

struct InterceptorFn<F>(F);

#[async_trait]
impl<F, Fut> Interceptor for InterceptorFn<F>
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Flow>> + Send + 'static,
{
    async fn intercept(&self, ctx: CommandContext) -> anyhow::Result<Flow> {
        (self.0)(ctx).await
    }
}

/// Wraps an async closure as a [`BoxedInterceptor`].
pub fn interceptor_fn<F, Fut>(f: F) -> BoxedInterceptor
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Flow>> + Send + 'static,
{
    Arc::new(InterceptorFn(f))
}

// ─── Failure isolation ───────────────────────────────────────────────────────

/// Awaits `fut`, converting a panic into an error.
pub(crate) async fn guarded<T, F>(fut: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(&payload))),
    }
}

pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
