//! Service map and the per-invocation command context.
//!
//! - [`Services`] is the shared, type-keyed map of long-lived collaborators
//!   (store, AFK state, event log, plugin loader, ...). Plugins declare the
//!   ids of the services they need in their metadata; the loader refuses to
//!   load a plugin whose requirements are missing.
//! - [`CommandContext`] is what a handler receives: the event, the client of
//!   the identity that observed it, the parsed command and arguments, and a
//!   handle to the services.
//!
//! ```rust,ignore
//! async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
//!     let store = ctx.require::<Store>()?;
//!     let name = ctx.arg(0).unwrap_or("world");
//!     ctx.respond(&format!("Hello, {name}")).await?;
//!     Ok(())
//! }
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use atlas_core::{BoxedClient, ChatId, ClientResult, MessageEvent, MessageId};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::PluginError;

/// A long-lived collaborator stored in [`Services`].
///
/// `ID` is the name plugins use in their `requires` list.
pub trait Service: Send + Sync + 'static {
    const ID: &'static str;
}

type ServiceArc = Arc<dyn Any + Send + Sync>;

/// Type-keyed map of shared services.
#[derive(Default)]
pub struct Services {
    entries: RwLock<HashMap<TypeId, (&'static str, ServiceArc)>>,
}

impl Services {
    /// Creates an empty service map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value`, replacing any previous service of the same type.
    pub fn provide<T: Service>(&self, value: Arc<T>) {
        debug!(service = T::ID, "Service registered");
        self.entries
            .write()
            .insert(TypeId::of::<T>(), (T::ID, value as ServiceArc));
    }

    /// Builder-style [`provide`](Self::provide).
    pub fn with<T: Service>(self, value: Arc<T>) -> Self {
        self.provide(value);
        self
    }

    /// Returns the service of type `T`, if registered.
    pub fn get<T: Service>(&self) -> Option<Arc<T>> {
        let entries = self.entries.read();
        let (_, value) = entries.get(&TypeId::of::<T>())?;
        Arc::clone(value).downcast::<T>().ok()
    }

    /// Returns the service of type `T`, or a [`PluginError::MissingService`].
    pub fn require<T: Service>(&self) -> Result<Arc<T>, PluginError> {
        self.get::<T>()
            .ok_or_else(|| PluginError::MissingService(T::ID.to_string()))
    }

    /// Returns `true` if a service with the given id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().values().any(|(sid, _)| *sid == id)
    }

    /// Ids of all registered services, sorted.
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self.entries.read().values().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Services").field(&self.ids()).finish()
    }
}

/// Context handed to command handlers, interceptors and private forwarders.
///
/// Cheap to clone: every field is reference counted.
#[derive(Clone)]
pub struct CommandContext {
    event: Arc<MessageEvent>,
    client: BoxedClient,
    command: String,
    args: Vec<String>,
    services: Arc<Services>,
}

impl CommandContext {
    /// Creates a context. `command` is empty for interceptors and forwarders.
    pub fn new(
        event: Arc<MessageEvent>,
        client: BoxedClient,
        command: String,
        args: Vec<String>,
        services: Arc<Services>,
    ) -> Self {
        Self {
            event,
            client,
            command,
            args,
            services,
        }
    }

    /// The triggering event.
    pub fn event(&self) -> &MessageEvent {
        &self.event
    }

    /// Client of the identity that observed the event.
    pub fn client(&self) -> &BoxedClient {
        &self.client
    }

    /// Lowercased command name.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Whitespace-separated arguments after the command name.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Shared services.
    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Shortcut for [`Services::get`].
    pub fn service<T: Service>(&self) -> Option<Arc<T>> {
        self.services.get::<T>()
    }

    /// Shortcut for [`Services::require`].
    pub fn require<T: Service>(&self) -> Result<Arc<T>, PluginError> {
        self.services.require::<T>()
    }

    /// Edits the triggering message to `text`, falling back to a reply.
    ///
    /// The primary identity can edit its own messages; the secondary identity
    /// usually cannot edit what others sent, so it replies instead. Returns
    /// the id of the message that now shows `text`.
    pub async fn respond(&self, text: &str) -> ClientResult<MessageId> {
        let event = &self.event;
        match self
            .client
            .edit_message(event.chat_id, event.message_id, text)
            .await
        {
            Ok(()) => Ok(event.message_id),
            Err(e) => {
                debug!(error = %e, "Edit failed, replying instead");
                self.reply(text).await
            }
        }
    }

    /// Replies to the triggering message.
    pub async fn reply(&self, text: &str) -> ClientResult<MessageId> {
        self.client
            .reply(self.event.chat_id, self.event.message_id, text)
            .await
    }

    /// Sends `text` to an arbitrary chat.
    pub async fn send(&self, chat_id: ChatId, text: &str) -> ClientResult<MessageId> {
        self.client.send_message(chat_id, text).await
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("event", &self.event)
            .field("command", &self.command)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use atlas_core::Identity;
    use atlas_core::testing::{MockClient, Sent, outgoing, private_message};

    use super::*;

    #[derive(Debug)]
    struct Counter(usize);

    impl Service for Counter {
        const ID: &'static str = "counter";
    }

    #[test]
    fn test_service_lookup() {
        let services = Services::new().with(Arc::new(Counter(3)));
        assert_eq!(services.get::<Counter>().unwrap().0, 3);
        assert!(services.contains("counter"));
        assert!(!services.contains("store"));
        assert_eq!(services.ids(), vec!["counter"]);
    }

    #[test]
    fn test_missing_service_is_reported_by_id() {
        let services = Services::new();
        let err = services.require::<Counter>().unwrap_err();
        assert!(matches!(err, PluginError::MissingService(id) if id == "counter"));
    }

    #[tokio::test]
    async fn test_respond_edits_then_falls_back_to_reply() {
        let client = MockClient::new(Identity::Primary);
        let ctx = CommandContext::new(
            Arc::new(outgoing(".ping")),
            client.boxed(),
            "ping".into(),
            Vec::new(),
            Arc::new(Services::new()),
        );
        ctx.respond("pong").await.unwrap();
        assert!(matches!(&client.sent()[0], Sent::Edit { text, .. } if text == "pong"));

        let bot = MockClient::new(Identity::Secondary);
        bot.fail_edits(true);
        let ctx = CommandContext::new(
            Arc::new(private_message(7, "/ping")),
            bot.boxed(),
            "ping".into(),
            Vec::new(),
            Arc::new(Services::new()),
        );
        ctx.respond("pong").await.unwrap();
        assert!(matches!(&bot.sent()[0], Sent::Reply { chat_id: 7, text, .. } if text == "pong"));
    }
}
