//! Event dispatcher for the Atlas agent.
//!
//! Every inbound event runs through a fixed guard sequence, evaluated fresh
//! per event. Nothing here is persisted; the "state" is the path taken:
//!
//! ```text
//!                      ┌── mode gate ──► Filtered
//!                      │
//!   primary ───────────┼── watchers (both directions)
//!                      ├── incoming? ──► Observed
//!                      ├── AFK auto-clear (unless `.afk`)
//!                      ├── interceptors ──► Intercepted
//!                      └── command
//!
//!   secondary ─────────┬── outgoing? ──► Filtered
//!                      ├── private, non-owner: rate limiter ──► Dropped
//!                      ├── private: forwarders (never consume)
//!                      └── command
//!
//!   command ──► NotCommand | Unknown | Executed | Failed
//! ```
//!
//! A handler's error or panic is caught here, logged in full and reported to
//! the operator as one condensed event. `dispatch` itself never fails.

use std::sync::Arc;

use async_trait::async_trait;
use atlas_core::{BoxedClient, Identity, MessageEvent};
use tracing::{Instrument, debug, debug_span, error, warn};

use crate::afk::AfkState;
use crate::context::{CommandContext, Services};
use crate::eventlog::EventLog;
use crate::handler::{Flow, guarded};
use crate::ratelimit::RateLimiter;
use crate::registry::{CommandRegistry, CommandTable};
use crate::settings::Settings;

/// Passive observer of primary-identity traffic.
///
/// Watchers see every primary event that passes the mode gate, in both
/// directions, before the outgoing-only filter. They cannot consume events.
#[async_trait]
pub trait Watcher: Send + Sync + 'static {
    async fn observe(&self, client: &BoxedClient, event: &MessageEvent);
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Suppressed by the run mode or the direction filter.
    Filtered,
    /// Incoming primary event, offered to watchers only.
    Observed,
    /// Rejected by the private-message rate limiter.
    Dropped,
    /// Consumed by an interceptor.
    Intercepted,
    /// Text does not start with the identity's prefix.
    NotCommand,
    /// Prefixed, but no handler owns the name.
    Unknown(String),
    /// A handler ran to completion.
    Executed(String),
    /// A handler returned an error or panicked.
    Failed(String),
}

/// Splits `text` into a lowercased command name and its arguments.
///
/// The command must follow the prefix immediately. A `@botname` suffix on
/// the command token is dropped. Arguments are whitespace-separated with no
/// quoting.
pub fn parse_command(text: &str, prefix: &str) -> Option<(String, Vec<String>)> {
    let rest = text.strip_prefix(prefix)?;
    if rest.starts_with(char::is_whitespace) {
        return None;
    }

    let mut tokens = rest.split_whitespace();
    let head = tokens.next()?;
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some((name, tokens.map(str::to_string).collect()))
}

/// Routes events to interceptors, forwarders and command handlers.
pub struct Dispatcher {
    settings: Arc<Settings>,
    registry: Arc<CommandRegistry>,
    services: Arc<Services>,
    afk: Arc<AfkState>,
    limiter: Arc<RateLimiter>,
    events: Arc<EventLog>,
    watchers: Vec<Arc<dyn Watcher>>,
}

impl Dispatcher {
    pub fn new(
        settings: Arc<Settings>,
        registry: Arc<CommandRegistry>,
        services: Arc<Services>,
        afk: Arc<AfkState>,
        limiter: Arc<RateLimiter>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            settings,
            registry,
            services,
            afk,
            limiter,
            events,
            watchers: Vec::new(),
        }
    }

    /// Adds a watcher (builder pattern).
    pub fn with_watcher(mut self, watcher: Arc<dyn Watcher>) -> Self {
        self.watchers.push(watcher);
        self
    }

    /// Returns the number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Runs one event through the guard sequence.
    pub async fn dispatch(&self, client: &BoxedClient, event: MessageEvent) -> DispatchOutcome {
        let span = debug_span!(
            "dispatch",
            identity = %event.identity,
            chat_id = event.chat_id,
            message_id = event.message_id,
        );
        async move {
            let outcome = self.route(client, event).await;
            debug!(outcome = ?outcome, "Event dispatched");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn route(&self, client: &BoxedClient, event: MessageEvent) -> DispatchOutcome {
        if !self.settings.run_mode.allows(event.identity) {
            return DispatchOutcome::Filtered;
        }

        match event.identity {
            Identity::Primary => self.route_primary(client, event).await,
            Identity::Secondary => self.route_secondary(client, event).await,
        }
    }

    async fn route_primary(&self, client: &BoxedClient, event: MessageEvent) -> DispatchOutcome {
        for watcher in &self.watchers {
            watcher.observe(client, &event).await;
        }
        if !event.outgoing {
            return DispatchOutcome::Observed;
        }

        let table = self.registry.snapshot();
        let event = Arc::new(event);
        let parsed = parse_command(&event.text, Identity::Primary.prefix());

        let is_afk_command = matches!(&parsed, Some((name, _)) if name == "afk");
        if !is_afk_command && self.afk.clear().is_some() {
            self.events.emit("AFK", "I'm back online").await;
        }

        for interceptor in table.interceptors() {
            let ctx = self.context(&event, client, String::new(), Vec::new());
            match guarded(interceptor.intercept(ctx)).await {
                Ok(Flow::Handled) => return DispatchOutcome::Intercepted,
                Ok(Flow::Continue) => {}
                Err(e) => warn!(error = %e, "Interceptor failed, continuing"),
            }
        }

        self.run_command(&table, client, &event, parsed).await
    }

    async fn route_secondary(&self, client: &BoxedClient, event: MessageEvent) -> DispatchOutcome {
        if event.outgoing {
            return DispatchOutcome::Filtered;
        }

        let table = self.registry.snapshot();
        let event = Arc::new(event);

        if event.private {
            if event.sender_id != self.settings.owner_id
                && !self.limiter.check(event.sender_id).is_admitted()
            {
                return DispatchOutcome::Dropped;
            }

            for forwarder in table.private_forwarders() {
                let ctx = self.context(&event, client, String::new(), Vec::new());
                if let Err(e) = guarded(forwarder.call(ctx)).await {
                    warn!(sender = event.sender_id, error = %e, "Private forwarder failed");
                }
            }
        }

        let parsed = parse_command(&event.text, Identity::Secondary.prefix());
        self.run_command(&table, client, &event, parsed).await
    }

    async fn run_command(
        &self,
        table: &CommandTable,
        client: &BoxedClient,
        event: &Arc<MessageEvent>,
        parsed: Option<(String, Vec<String>)>,
    ) -> DispatchOutcome {
        let Some((name, args)) = parsed else {
            return DispatchOutcome::NotCommand;
        };
        let Some(handler) = table.lookup(&name) else {
            debug!(command = %name, "Unknown command ignored");
            return DispatchOutcome::Unknown(name);
        };

        let ctx = self.context(event, client, name.clone(), args);
        match guarded(handler.call(ctx)).await {
            Ok(()) => DispatchOutcome::Executed(name),
            Err(e) => {
                error!(command = %name, error = ?e, "Command failed");
                self.events
                    .emit("Command Error", &format!("{}\n{e:#}", event.text))
                    .await;
                DispatchOutcome::Failed(name)
            }
        }
    }

    fn context(
        &self,
        event: &Arc<MessageEvent>,
        client: &BoxedClient,
        command: String,
        args: Vec<String>,
    ) -> CommandContext {
        CommandContext::new(
            Arc::clone(event),
            Arc::clone(client),
            command,
            args,
            Arc::clone(&self.services),
        )
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("run_mode", &self.settings.run_mode)
            .field("watcher_count", &self.watchers.len())
            .finish_non_exhaustive()
    }
}
