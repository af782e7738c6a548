//! Operator-facing event notifications.
//!
//! [`EventLog::emit`] writes every event to two places:
//!
//! 1. the developer log, via `tracing` under the `atlas::event` target
//!    (which the runtime also tees into the local append-only log file);
//! 2. best-effort, the operator's log chat: the chat id stored under
//!    [`LOG_CHAT_KEY`], reached through the configured sink client.
//!
//! Neither path can fail the caller.

use atlas_core::{BoxedClient, ChatId};
use atlas_storage::Store;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::context::Service;

/// Key-value key holding the operator's log chat id.
pub const LOG_CHAT_KEY: &str = "log_chat_id";

/// Best-effort sink for lifecycle and failure events.
pub struct EventLog {
    store: Store,
    sink: RwLock<Option<BoxedClient>>,
}

impl EventLog {
    /// Creates an event log with no chat sink yet.
    pub fn new(store: Store) -> Self {
        Self {
            store,
            sink: RwLock::new(None),
        }
    }

    /// Sets the client used to deliver events to the log chat.
    pub fn set_sink(&self, client: BoxedClient) {
        *self.sink.write() = Some(client);
    }

    /// Returns `true` if a sink client is configured.
    pub fn has_sink(&self) -> bool {
        self.sink.read().is_some()
    }

    /// The configured log chat, if any.
    pub fn log_chat(&self) -> Option<ChatId> {
        match self.store.get(LOG_CHAT_KEY) {
            Ok(value) => value.and_then(|v| v.trim().parse().ok()),
            Err(e) => {
                warn!(error = %e, "Failed to read log chat id");
                None
            }
        }
    }

    /// Records an event. Never fails.
    pub async fn emit(&self, event: &str, details: &str) {
        if details.is_empty() {
            info!(target: "atlas::event", "[{event}]");
        } else {
            info!(target: "atlas::event", "[{event}] {details}");
        }

        let Some(client) = self.sink.read().clone() else {
            return;
        };
        let Some(chat_id) = self.log_chat() else {
            return;
        };

        if let Err(e) = client.send_message(chat_id, &format_event(event, details)).await {
            warn!(chat_id, error = %e, "Failed to deliver event to log chat");
        }
    }
}

impl Service for EventLog {
    const ID: &'static str = "events";
}

/// Formats an event for the log chat.
pub fn format_event(event: &str, details: &str) -> String {
    if details.is_empty() {
        format!("📌 **{event}**")
    } else {
        format!("📌 **{event}**\n{details}")
    }
}
