//! Client and connector traits.
//!
//! This is the whole surface Atlas needs from a messaging SDK. A transport
//! integration provides:
//!
//! - a [`Connector`] that authenticates one identity and returns a [`Session`]
//! - a [`Client`] (inside the session) used to act on the network
//! - a channel of [`MessageEvent`]s (inside the session) carrying new messages
//!
//! ```rust,ignore
//! let session = connector.connect(Identity::Secondary, &credentials).await?;
//! let client = session.client.clone();
//! while let Some(event) = session.events.recv().await {
//!     dispatcher.dispatch(client.clone(), event).await;
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{ClientError, ClientResult};
use crate::event::{ChatId, MessageEvent, MessageId, UserId};
use crate::identity::Identity;

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Original file name as reported by the network.
    pub file_name: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// A live connection for one identity.
///
/// Methods without a default are required for Atlas to function at all;
/// the others default to [`ClientError::Unsupported`] so minimal transports
/// stay small.
#[async_trait]
pub trait Client: Send + Sync + 'static {
    /// Which identity this client is connected as.
    fn identity(&self) -> Identity;

    /// The account id of this identity.
    fn user_id(&self) -> UserId;

    /// Sends a new text message to `chat_id`.
    async fn send_message(&self, chat_id: ChatId, text: &str) -> ClientResult<MessageId>;

    /// Replaces the text of an existing message.
    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> ClientResult<()>;

    /// Sends `text` as a reply to `reply_to`.
    async fn reply(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        text: &str,
    ) -> ClientResult<MessageId>;

    /// Forwards a message, keeping its original author attribution.
    async fn forward_message(
        &self,
        from_chat: ChatId,
        message_id: MessageId,
        to_chat: ChatId,
    ) -> ClientResult<MessageId>;

    /// Re-sends a message's content (including media) without attribution.
    async fn copy_message(
        &self,
        _from_chat: ChatId,
        _message_id: MessageId,
        _to_chat: ChatId,
    ) -> ClientResult<MessageId> {
        Err(ClientError::Unsupported("copy_message"))
    }

    /// Returns the id of the message that `message_id` replies to, if any.
    async fn reply_target(
        &self,
        _chat_id: ChatId,
        _message_id: MessageId,
    ) -> ClientResult<Option<MessageId>> {
        Err(ClientError::Unsupported("reply_target"))
    }

    /// Returns the text of a message, if it exists and has text.
    async fn message_text(
        &self,
        _chat_id: ChatId,
        _message_id: MessageId,
    ) -> ClientResult<Option<String>> {
        Err(ClientError::Unsupported("message_text"))
    }

    /// Downloads the document attached to a message, if any.
    async fn download_document(
        &self,
        _chat_id: ChatId,
        _message_id: MessageId,
    ) -> ClientResult<Option<Document>> {
        Err(ClientError::Unsupported("download_document"))
    }
}

/// A shared Client trait object.
pub type BoxedClient = Arc<dyn Client>;

/// Authentication material for one connection.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Application id issued by the network.
    pub api_id: i64,
    /// Application hash issued by the network.
    pub api_hash: String,
    /// Serialized login session for the primary identity.
    pub session: Option<String>,
    /// Bot token for the secondary identity.
    pub bot_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .field("session", &self.session.as_ref().map(|_| "<redacted>"))
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// An established connection: the client and its inbound event stream.
///
/// The stream ends (returns `None`) when the transport disconnects.
pub struct Session {
    /// Client used to act on the network.
    pub client: BoxedClient,
    /// New messages observed by this identity, in delivery order.
    pub events: mpsc::Receiver<MessageEvent>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.client.identity())
            .finish_non_exhaustive()
    }
}

/// Establishes sessions for identities.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Short transport name used in logs.
    fn name(&self) -> &'static str;

    /// Authenticates `identity` and returns a live session.
    async fn connect(&self, identity: Identity, credentials: &Credentials)
    -> ClientResult<Session>;
}
