//! Bounded request/response conversations with other chats.
//!
//! Some plugins talk to auxiliary bots: send a message, wait for the next
//! message the bot posts back. [`ConversationHub::ask`] does exactly that
//! with a single timeout and a typed outcome, so a silent peer surfaces as
//! [`ConversationOutcome::TimedOut`] instead of hanging the handler.
//!
//! The hub is fed by the dispatcher: it is registered as a [`Watcher`] and
//! sees every primary-identity event that passes the mode gate.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use atlas_core::{BoxedClient, ChatId, ClientError, MessageEvent};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::context::Service;
use crate::dispatcher::Watcher;

/// Default wait used by plugins that do not pick their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of [`ConversationHub::ask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationOutcome {
    /// The peer answered.
    Reply(MessageEvent),
    /// No answer arrived in time.
    TimedOut,
    /// The peer blocked us.
    Blocked,
    /// Sending the request failed.
    Failed(ClientError),
}

/// Pending waiters, keyed by chat.
#[derive(Debug, Default)]
pub struct ConversationHub {
    waiters: Mutex<HashMap<ChatId, Vec<oneshot::Sender<MessageEvent>>>>,
}

impl ConversationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `text` to `chat_id` and waits up to `timeout` for the next
    /// incoming message in that chat.
    pub async fn ask(
        &self,
        client: &BoxedClient,
        chat_id: ChatId,
        text: &str,
        timeout: Duration,
    ) -> ConversationOutcome {
        // Register first so a fast answer cannot slip past.
        let rx = self.wait_for(chat_id);

        let failed = match client.send_message(chat_id, text).await {
            Ok(_) => None,
            Err(ClientError::Blocked) => Some(ConversationOutcome::Blocked),
            Err(e) => Some(ConversationOutcome::Failed(e)),
        };
        if let Some(outcome) = failed {
            drop(rx);
            self.prune(chat_id);
            return outcome;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(event)) => ConversationOutcome::Reply(event),
            Ok(Err(_)) | Err(_) => {
                debug!(chat_id, timeout_secs = timeout.as_secs(), "Conversation timed out");
                self.prune(chat_id);
                ConversationOutcome::TimedOut
            }
        }
    }

    /// Number of chats with at least one live waiter.
    pub fn pending(&self) -> usize {
        self.waiters
            .lock()
            .values()
            .filter(|senders| senders.iter().any(|tx| !tx.is_closed()))
            .count()
    }

    fn wait_for(&self, chat_id: ChatId) -> oneshot::Receiver<MessageEvent> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock();
        let senders = waiters.entry(chat_id).or_default();
        senders.retain(|tx| !tx.is_closed());
        senders.push(tx);
        rx
    }

    /// Drops abandoned waiters of `chat_id`, and the chat entry once empty.
    fn prune(&self, chat_id: ChatId) {
        let mut waiters = self.waiters.lock();
        if let Some(senders) = waiters.get_mut(&chat_id) {
            senders.retain(|tx| !tx.is_closed());
            if senders.is_empty() {
                waiters.remove(&chat_id);
            }
        }
    }

    fn deliver(&self, event: &MessageEvent) {
        let Some(senders) = self.waiters.lock().remove(&event.chat_id) else {
            return;
        };
        for tx in senders {
            let _ = tx.send(event.clone());
        }
    }
}

impl Service for ConversationHub {
    const ID: &'static str = "conversation";
}

#[async_trait]
impl Watcher for ConversationHub {
    async fn observe(&self, _client: &BoxedClient, event: &MessageEvent) {
        if !event.outgoing {
            self.deliver(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use atlas_core::Identity;
    use atlas_core::testing::{MockClient, incoming, outgoing};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ask_receives_next_incoming_message() {
        let hub = ConversationHub::new();
        let client = MockClient::new(Identity::Primary);
        let boxed = client.boxed();

        let (outcome, ()) = tokio::join!(
            hub.ask(&boxed, 100, "/start", DEFAULT_TIMEOUT),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                // Our own echo does not count as the answer.
                hub.observe(&boxed, &outgoing("/start")).await;
                hub.observe(&boxed, &incoming(Identity::Primary, 55, "hello"))
                    .await;
            }
        );

        match outcome {
            ConversationOutcome::Reply(event) => assert_eq!(event.text, "hello"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(client.texts(), vec!["/start".to_string()]);
        assert_eq!(hub.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ask_times_out() {
        let hub = ConversationHub::new();
        let client = MockClient::new(Identity::Primary);

        let outcome = hub
            .ask(&client.boxed(), 100, "ping", Duration::from_secs(5))
            .await;
        assert_eq!(outcome, ConversationOutcome::TimedOut);
        assert_eq!(hub.pending(), 0);
        assert!(hub.waiters.lock().is_empty());
    }

    #[tokio::test]
    async fn test_ask_reports_blocked_and_failures() {
        let hub = ConversationHub::new();
        let client = MockClient::new(Identity::Primary);

        client.queue_error(ClientError::Blocked);
        let outcome = hub.ask(&client.boxed(), 100, "hi", DEFAULT_TIMEOUT).await;
        assert_eq!(outcome, ConversationOutcome::Blocked);

        client.queue_error(ClientError::Timeout);
        let outcome = hub.ask(&client.boxed(), 100, "hi", DEFAULT_TIMEOUT).await;
        assert_eq!(outcome, ConversationOutcome::Failed(ClientError::Timeout));
        assert!(hub.waiters.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_other_live_waiters() {
        let hub = ConversationHub::new();
        let client = MockClient::new(Identity::Primary);
        let boxed = client.boxed();

        let (short, long) = tokio::join!(
            hub.ask(&boxed, 100, "first", Duration::from_secs(1)),
            async {
                let outcome = hub.ask(&boxed, 100, "second", Duration::from_secs(10));
                tokio::pin!(outcome);
                tokio::select! {
                    done = &mut outcome => done,
                    () = tokio::time::sleep(Duration::from_secs(2)) => {
                        assert_eq!(hub.pending(), 1);
                        hub.observe(&boxed, &incoming(Identity::Primary, 55, "late")).await;
                        outcome.await
                    }
                }
            }
        );

        assert_eq!(short, ConversationOutcome::TimedOut);
        match long {
            ConversationOutcome::Reply(event) => assert_eq!(event.text, "late"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(hub.waiters.lock().is_empty());
    }
}
