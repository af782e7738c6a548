//! Delayed, best-effort forwarding driven by stored forward rules.

use std::time::Duration;

use async_trait::async_trait;
use atlas_core::{BoxedClient, ClientError, MessageEvent, MessageId};
use atlas_storage::{ForwardRule, Store};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dispatcher::Watcher;

/// Forwards new messages from rule sources to rule destinations.
///
/// Each matching rule gets its own task: sleep for the rule's delay, then
/// forward. A flood-wait answer is honoured once (sleep, retry); any other
/// failure is logged and the message is dropped.
#[derive(Clone)]
pub struct ForwardRelay {
    store: Store,
}

impl ForwardRelay {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Spawns one forwarding task per enabled rule matching the event's chat.
    pub fn relay(&self, client: &BoxedClient, event: &MessageEvent) -> Vec<JoinHandle<()>> {
        let rules = match self.store.forward_rules_from(event.chat_id) {
            Ok(rules) => rules,
            Err(e) => {
                warn!(chat_id = event.chat_id, error = %e, "Failed to read forward rules");
                return Vec::new();
            }
        };

        rules
            .into_iter()
            .map(|rule| {
                let client = client.clone();
                let message_id = event.message_id;
                tokio::spawn(async move { forward_with_retry(client, rule, message_id).await })
            })
            .collect()
    }
}

async fn forward_with_retry(client: BoxedClient, rule: ForwardRule, message_id: MessageId) {
    tokio::time::sleep(Duration::from_secs(rule.delay_secs)).await;

    let result = match client
        .forward_message(rule.source, message_id, rule.destination)
        .await
    {
        Err(ClientError::FloodWait { seconds }) => {
            debug!(rule = rule.id, seconds, "Flood wait while forwarding, retrying once");
            tokio::time::sleep(Duration::from_secs(seconds + 1)).await;
            client
                .forward_message(rule.source, message_id, rule.destination)
                .await
        }
        other => other,
    };

    match result {
        Ok(_) => debug!(rule = rule.id, message_id, "Message forwarded"),
        Err(e) => warn!(
            rule = rule.id,
            source = rule.source,
            destination = rule.destination,
            error = %e,
            "Forward failed"
        ),
    }
}

#[async_trait]
impl Watcher for ForwardRelay {
    async fn observe(&self, client: &BoxedClient, event: &MessageEvent) {
        self.relay(client, event);
    }
}
