//! Command Registry and Raw Interceptor Chain.
//!
//! A [`CommandTable`] maps lowercase command names to handlers and holds the
//! ordered interceptor chain plus the private-message forwarders. The
//! [`CommandRegistry`] owns the *current* table behind an `Arc`:
//!
//! - dispatch takes a [`snapshot`](CommandRegistry::snapshot) once per event
//!   and works on that immutable view for the event's whole lifetime;
//! - a load pass builds a fresh table off to the side and installs it with
//!   [`replace`](CommandRegistry::replace) in one step.
//!
//! An in-flight dispatch therefore never observes a half-populated registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::handler::{BoxedHandler, BoxedInterceptor};

/// An immutable-once-published set of registrations.
#[derive(Clone, Default)]
pub struct CommandTable {
    commands: HashMap<String, BoxedHandler>,
    interceptors: Vec<BoxedInterceptor>,
    private_forwarders: Vec<BoxedHandler>,
}

impl CommandTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under the lowercased `name`; the last registration wins.
    pub fn register(&mut self, name: &str, handler: BoxedHandler) {
        let name = name.to_lowercase();
        if self.commands.insert(name.clone(), handler).is_some() {
            debug!(command = %name, "Command re-registered, previous handler replaced");
        }
    }

    /// Appends an interceptor to the end of the chain.
    pub fn register_raw(&mut self, interceptor: BoxedInterceptor) {
        self.interceptors.push(interceptor);
    }

    /// Appends a private-message forwarder.
    pub fn register_private_forwarder(&mut self, handler: BoxedHandler) {
        self.private_forwarders.push(handler);
    }

    /// Case-insensitive exact lookup.
    pub fn lookup(&self, name: &str) -> Option<&BoxedHandler> {
        self.commands.get(&name.to_lowercase())
    }

    /// Interceptors in registration order.
    pub fn interceptors(&self) -> &[BoxedInterceptor] {
        &self.interceptors
    }

    /// Private-message forwarders in registration order.
    pub fn private_forwarders(&self) -> &[BoxedHandler] {
        &self.private_forwarders
    }

    /// Registered command names, sorted.
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no commands are registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("commands", &self.command_names())
            .field("interceptors", &self.interceptors.len())
            .field("private_forwarders", &self.private_forwarders.len())
            .finish()
    }
}

/// Owner of the live [`CommandTable`].
#[derive(Default)]
pub struct CommandRegistry {
    current: RwLock<Arc<CommandTable>>,
}

impl CommandRegistry {
    /// Creates a registry with an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a single command into the live table.
    pub fn register(&self, name: &str, handler: BoxedHandler) {
        Arc::make_mut(&mut self.current.write()).register(name, handler);
    }

    /// Appends an interceptor to the live chain.
    pub fn register_raw(&self, interceptor: BoxedInterceptor) {
        Arc::make_mut(&mut self.current.write()).register_raw(interceptor);
    }

    /// Appends a private-message forwarder to the live table.
    pub fn register_private_forwarder(&self, handler: BoxedHandler) {
        Arc::make_mut(&mut self.current.write()).register_private_forwarder(handler);
    }

    /// Case-insensitive lookup in the live table.
    pub fn lookup(&self, name: &str) -> Option<BoxedHandler> {
        self.current.read().lookup(name).cloned()
    }

    /// The current table. Later registrations do not affect the returned view.
    pub fn snapshot(&self) -> Arc<CommandTable> {
        Arc::clone(&self.current.read())
    }

    /// Atomically installs `table`, dropping every previous registration.
    pub fn replace(&self, table: CommandTable) {
        *self.current.write() = Arc::new(table);
    }

    /// Drops every registration.
    pub fn clear(&self) {
        self.replace(CommandTable::new());
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandRegistry")
            .field(&*self.current.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use atlas_core::Identity;
    use atlas_core::testing::{MockClient, outgoing};

    use super::*;
    use crate::context::{CommandContext, Services};
    use crate::handler::handler_fn;

    fn counting(counter: &Arc<AtomicUsize>, by: usize) -> BoxedHandler {
        let counter = Arc::clone(counter);
        handler_fn(move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(by, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
    }

    fn ctx() -> CommandContext {
        CommandContext::new(
            Arc::new(outgoing(".foo")),
            MockClient::new(Identity::Primary).boxed(),
            "foo".into(),
            Vec::new(),
            Arc::new(Services::new()),
        )
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = CommandRegistry::new();
        registry.register("Ping", handler_fn(|_| async { anyhow::Ok(()) }));
        assert!(registry.lookup("ping").is_some());
        assert!(registry.lookup("PING").is_some());
        assert!(registry.lookup("pin").is_none());
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = CommandRegistry::new();
        registry.register("foo", counting(&counter, 1));
        registry.register("foo", counting(&counter, 10));

        registry.lookup("foo").unwrap().call(ctx()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated_from_replace() {
        let registry = CommandRegistry::new();
        registry.register("old", handler_fn(|_| async { anyhow::Ok(()) }));
        let before = registry.snapshot();

        let mut fresh = CommandTable::new();
        fresh.register("new", handler_fn(|_| async { anyhow::Ok(()) }));
        registry.replace(fresh);

        assert!(before.lookup("old").is_some());
        assert!(registry.lookup("old").is_none());
        assert!(registry.lookup("new").is_some());
    }
}
