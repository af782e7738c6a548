//! Test doubles for the transport boundary.
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for the test suites of downstream crates.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::client::{BoxedClient, Client, Connector, Credentials, Document, Session};
use crate::error::{ClientError, ClientResult};
use crate::event::{ChatId, MessageEvent, MessageId, UserId};
use crate::identity::Identity;

/// Owner id used by the event builders.
pub const OWNER_ID: UserId = 1;
/// Default chat id used by the event builders.
pub const CHAT_ID: ChatId = 100;

/// One action performed through a [`MockClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message {
        chat_id: ChatId,
        text: String,
    },
    Edit {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
    },
    Reply {
        chat_id: ChatId,
        reply_to: MessageId,
        text: String,
    },
    Forward {
        from_chat: ChatId,
        message_id: MessageId,
        to_chat: ChatId,
    },
    Copy {
        from_chat: ChatId,
        message_id: MessageId,
        to_chat: ChatId,
    },
}

impl Sent {
    /// Text carried by a message, edit or reply.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message { text, .. } | Self::Edit { text, .. } | Self::Reply { text, .. } => {
                Some(text)
            }
            _ => None,
        }
    }
}

/// A recording [`Client`] with scriptable failures.
pub struct MockClient {
    identity: Identity,
    user_id: UserId,
    next_id: AtomicI64,
    sent: Mutex<Vec<Sent>>,
    fail_edits: Mutex<bool>,
    queued_errors: Mutex<VecDeque<ClientError>>,
    reply_targets: Mutex<HashMap<(ChatId, MessageId), MessageId>>,
    texts: Mutex<HashMap<(ChatId, MessageId), String>>,
    documents: Mutex<HashMap<(ChatId, MessageId), Document>>,
}

impl MockClient {
    /// Creates a mock client for `identity`.
    pub fn new(identity: Identity) -> Arc<Self> {
        let user_id = match identity {
            Identity::Primary => OWNER_ID,
            Identity::Secondary => 2,
        };
        Arc::new(Self {
            identity,
            user_id,
            next_id: AtomicI64::new(1000),
            sent: Mutex::new(Vec::new()),
            fail_edits: Mutex::new(false),
            queued_errors: Mutex::new(VecDeque::new()),
            reply_targets: Mutex::new(HashMap::new()),
            texts: Mutex::new(HashMap::new()),
            documents: Mutex::new(HashMap::new()),
        })
    }

    /// Upcasts to a [`BoxedClient`].
    pub fn boxed(self: &Arc<Self>) -> BoxedClient {
        Arc::clone(self) as BoxedClient
    }

    /// Makes every subsequent edit fail.
    pub fn fail_edits(&self, fail: bool) {
        *self.fail_edits.lock() = fail;
    }

    /// Makes the next send, reply, forward or copy fail with `error`.
    pub fn queue_error(&self, error: ClientError) {
        self.queued_errors.lock().push_back(error);
    }

    /// Declares that `message_id` replies to `target`.
    pub fn set_reply_target(&self, chat_id: ChatId, message_id: MessageId, target: MessageId) {
        self.reply_targets
            .lock()
            .insert((chat_id, message_id), target);
    }

    /// Declares the text of an existing message.
    pub fn set_text(&self, chat_id: ChatId, message_id: MessageId, text: &str) {
        self.texts
            .lock()
            .insert((chat_id, message_id), text.to_string());
    }

    /// Attaches a document to an existing message.
    pub fn set_document(&self, chat_id: ChatId, message_id: MessageId, document: Document) {
        self.documents.lock().insert((chat_id, message_id), document);
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    /// Texts of all messages, edits and replies, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| s.text().map(str::to_string))
            .collect()
    }

    /// Text of the most recent message, edit or reply.
    pub fn last_text(&self) -> Option<String> {
        self.texts().pop()
    }

    fn take_error(&self) -> ClientResult<()> {
        match self.queued_errors.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record(&self, sent: Sent) -> MessageId {
        self.sent.lock().push(sent);
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl Client for MockClient {
    fn identity(&self) -> Identity {
        self.identity
    }

    fn user_id(&self) -> UserId {
        self.user_id
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> ClientResult<MessageId> {
        self.take_error()?;
        Ok(self.record(Sent::Message {
            chat_id,
            text: text.to_string(),
        }))
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> ClientResult<()> {
        if *self.fail_edits.lock() {
            return Err(ClientError::rejected("message can't be edited"));
        }
        self.record(Sent::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn reply(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        text: &str,
    ) -> ClientResult<MessageId> {
        self.take_error()?;
        Ok(self.record(Sent::Reply {
            chat_id,
            reply_to,
            text: text.to_string(),
        }))
    }

    async fn forward_message(
        &self,
        from_chat: ChatId,
        message_id: MessageId,
        to_chat: ChatId,
    ) -> ClientResult<MessageId> {
        self.take_error()?;
        Ok(self.record(Sent::Forward {
            from_chat,
            message_id,
            to_chat,
        }))
    }

    async fn copy_message(
        &self,
        from_chat: ChatId,
        message_id: MessageId,
        to_chat: ChatId,
    ) -> ClientResult<MessageId> {
        self.take_error()?;
        Ok(self.record(Sent::Copy {
            from_chat,
            message_id,
            to_chat,
        }))
    }

    async fn reply_target(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> ClientResult<Option<MessageId>> {
        Ok(self.reply_targets.lock().get(&(chat_id, message_id)).copied())
    }

    async fn message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> ClientResult<Option<String>> {
        Ok(self.texts.lock().get(&(chat_id, message_id)).cloned())
    }

    async fn download_document(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> ClientResult<Option<Document>> {
        Ok(self.documents.lock().get(&(chat_id, message_id)).cloned())
    }
}

// ─── Event builders ──────────────────────────────────────────────────────────

/// An outgoing primary-identity message in [`CHAT_ID`].
pub fn outgoing(text: &str) -> MessageEvent {
    MessageEvent {
        identity: Identity::Primary,
        chat_id: CHAT_ID,
        message_id: 1,
        sender_id: OWNER_ID,
        text: text.to_string(),
        outgoing: true,
        private: false,
        reply_to: None,
        has_media: false,
    }
}

/// An incoming message observed by `identity` in [`CHAT_ID`].
pub fn incoming(identity: Identity, sender_id: UserId, text: &str) -> MessageEvent {
    MessageEvent {
        identity,
        chat_id: CHAT_ID,
        message_id: 1,
        sender_id,
        text: text.to_string(),
        outgoing: false,
        private: false,
        reply_to: None,
        has_media: false,
    }
}

/// An incoming private message to the secondary identity.
pub fn private_message(sender_id: UserId, text: &str) -> MessageEvent {
    MessageEvent {
        chat_id: sender_id,
        private: true,
        ..incoming(Identity::Secondary, sender_id, text)
    }
}

// ─── MockConnector ───────────────────────────────────────────────────────────

/// A [`Connector`] handing out [`MockClient`]s.
///
/// The event sender of each session is kept so tests can feed events and end
/// the stream with [`disconnect`](Self::disconnect).
#[derive(Default)]
pub struct MockConnector {
    clients: Mutex<HashMap<Identity, Arc<MockClient>>>,
    senders: Mutex<HashMap<Identity, mpsc::Sender<MessageEvent>>>,
    refused: Mutex<HashSet<Identity>>,
}

impl MockConnector {
    /// Creates a connector that accepts every identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes connections for `identity` fail.
    pub fn refuse(&self, identity: Identity) {
        self.refused.lock().insert(identity);
    }

    /// The client handed out for `identity`, once connected.
    pub fn client(&self, identity: Identity) -> Option<Arc<MockClient>> {
        self.clients.lock().get(&identity).cloned()
    }

    /// Sender feeding the event stream of `identity`, once connected.
    pub fn sender(&self, identity: Identity) -> Option<mpsc::Sender<MessageEvent>> {
        self.senders.lock().get(&identity).cloned()
    }

    /// Ends the event stream of `identity`.
    pub fn disconnect(&self, identity: Identity) {
        self.senders.lock().remove(&identity);
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(
        &self,
        identity: Identity,
        _credentials: &Credentials,
    ) -> ClientResult<Session> {
        if self.refused.lock().contains(&identity) {
            return Err(ClientError::rejected("authorization failed"));
        }
        let client = MockClient::new(identity);
        let (tx, rx) = mpsc::channel(64);
        self.clients.lock().insert(identity, Arc::clone(&client));
        self.senders.lock().insert(identity, tx);
        Ok(Session {
            client: client.boxed(),
            events: rx,
        })
    }
}
