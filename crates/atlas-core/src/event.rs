//! The inbound message event handed to the dispatcher.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Chat identifier on the messaging network.
pub type ChatId = i64;
/// Message identifier, unique within a chat.
pub type MessageId = i64;
/// User identifier on the messaging network.
pub type UserId = i64;

/// A new text message observed by one of the connected identities.
///
/// Events are plain data; anything that needs the network (editing, replying,
/// fetching the replied-to message) goes through the [`Client`](crate::Client)
/// of the identity that produced the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Which connection observed the message.
    pub identity: Identity,
    /// Chat the message was posted in.
    pub chat_id: ChatId,
    /// Message id within `chat_id`.
    pub message_id: MessageId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Plain text (or media caption). Empty when the message has no text.
    pub text: String,
    /// `true` when the observing identity authored the message itself.
    pub outgoing: bool,
    /// `true` for one-to-one chats.
    pub private: bool,
    /// Message this one replies to, if any.
    pub reply_to: Option<MessageId>,
    /// `true` when the message carries a photo, document or other media.
    pub has_media: bool,
}

impl MessageEvent {
    /// Returns `true` if this message is a reply.
    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }
}
