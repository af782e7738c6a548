//! A loopback transport for running Atlas in a terminal.
//!
//! Every input line becomes a message event; everything the agent sends is
//! written to the output, one entry per action:
//!
//! | Input | Delivered as |
//! |---|---|
//! | `.ping` or any other text | outgoing message of the primary identity in [`CONSOLE_CHAT`] |
//! | `/help` | private message from the owner to the secondary identity |
//! | `>12 s/foo/bar/` | the same, as a reply to message `#12` |
//!
//! Lines starting with `/` go to the primary identity when no secondary
//! identity is connected. End of input closes every session.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use atlas_core::{
    BoxedClient, ChatId, Client, ClientResult, Connector, Credentials, Identity, MessageEvent,
    MessageId, Session, UserId,
};
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Chat used for primary-identity input.
pub const CONSOLE_CHAT: ChatId = 1;

/// Account id reported by the secondary identity.
pub const CONSOLE_BOT_ID: UserId = 1_000_000;

type Input = Box<dyn AsyncBufRead + Send + Unpin>;
type Output = Box<dyn Write + Send>;

struct Logged {
    text: String,
    reply_to: Option<MessageId>,
}

struct Shared {
    owner_id: UserId,
    next_id: AtomicI64,
    history: Mutex<HashMap<(ChatId, MessageId), Logged>>,
    output: Mutex<Output>,
    routes: Mutex<HashMap<Identity, mpsc::Sender<MessageEvent>>>,
}

impl Shared {
    fn next_id(&self) -> MessageId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn remember(&self, chat_id: ChatId, message_id: MessageId, text: &str, reply_to: Option<MessageId>) {
        self.history.lock().insert(
            (chat_id, message_id),
            Logged {
                text: text.to_string(),
                reply_to,
            },
        );
    }

    fn print(&self, line: &str) {
        let mut output = self.output.lock();
        if let Err(e) = writeln!(output, "{line}").and_then(|()| output.flush()) {
            warn!(error = %e, "Failed to write console output");
        }
    }
}

/// Connects identities to the terminal.
pub struct ConsoleConnector {
    shared: Arc<Shared>,
    input: Mutex<Option<Input>>,
    reading: AtomicBool,
}

impl ConsoleConnector {
    /// Reads stdin and writes stdout.
    pub fn stdio(owner_id: UserId) -> Self {
        Self::new(
            owner_id,
            BufReader::new(tokio::io::stdin()),
            std::io::stdout(),
        )
    }

    pub fn new(
        owner_id: UserId,
        input: impl AsyncBufRead + Send + Unpin + 'static,
        output: impl Write + Send + 'static,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                owner_id,
                next_id: AtomicI64::new(1),
                history: Mutex::new(HashMap::new()),
                output: Mutex::new(Box::new(output)),
                routes: Mutex::new(HashMap::new()),
            }),
            input: Mutex::new(Some(Box::new(input))),
            reading: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connector for ConsoleConnector {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn connect(&self, identity: Identity, _credentials: &Credentials) -> ClientResult<Session> {
        let (tx, rx) = mpsc::channel(64);
        self.shared.routes.lock().insert(identity, tx);

        if !self.reading.swap(true, Ordering::SeqCst)
            && let Some(input) = self.input.lock().take()
        {
            tokio::spawn(read_input(Arc::clone(&self.shared), input));
        }

        let user_id = match identity {
            Identity::Primary => self.shared.owner_id,
            Identity::Secondary => CONSOLE_BOT_ID,
        };
        let client: BoxedClient = Arc::new(ConsoleClient {
            identity,
            user_id,
            shared: Arc::clone(&self.shared),
        });
        Ok(Session { client, events: rx })
    }
}

/// Splits an optional `>ID ` reply marker off an input line.
fn parse_line(line: &str) -> (Option<MessageId>, &str) {
    if let Some(rest) = line.strip_prefix('>')
        && let Some((id, text)) = rest.split_once(' ')
        && let Ok(id) = id.parse()
    {
        return (Some(id), text);
    }
    (None, line)
}

async fn read_input(shared: Arc<Shared>, input: Input) {
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read console input");
                break;
            }
        };
        let (reply_to, text) = parse_line(line.trim_end());
        if text.is_empty() {
            continue;
        }

        let (route, event) = {
            let routes = shared.routes.lock();
            let to_secondary = text.starts_with('/') && routes.contains_key(&Identity::Secondary);
            let identity = if to_secondary || !routes.contains_key(&Identity::Primary) {
                Identity::Secondary
            } else {
                Identity::Primary
            };
            let event = match identity {
                Identity::Primary => MessageEvent {
                    identity,
                    chat_id: CONSOLE_CHAT,
                    message_id: shared.next_id(),
                    sender_id: shared.owner_id,
                    text: text.to_string(),
                    outgoing: true,
                    private: false,
                    reply_to,
                    has_media: false,
                },
                Identity::Secondary => MessageEvent {
                    identity,
                    chat_id: shared.owner_id,
                    message_id: shared.next_id(),
                    sender_id: shared.owner_id,
                    text: text.to_string(),
                    outgoing: false,
                    private: true,
                    reply_to,
                    has_media: false,
                },
            };
            (routes.get(&identity).cloned(), event)
        };

        let Some(route) = route else {
            shared.print("(no identity connected)");
            continue;
        };
        shared.remember(event.chat_id, event.message_id, &event.text, reply_to);
        shared.print(&format!("[{}] #{} <- {}", event.identity, event.message_id, event.text));
        if route.send(event).await.is_err() {
            break;
        }
    }

    debug!("Console input closed");
    shared.routes.lock().clear();
}

struct ConsoleClient {
    identity: Identity,
    user_id: UserId,
    shared: Arc<Shared>,
}

#[async_trait]
impl Client for ConsoleClient {
    fn identity(&self) -> Identity {
        self.identity
    }

    fn user_id(&self) -> UserId {
        self.user_id
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> ClientResult<MessageId> {
        let id = self.shared.next_id();
        self.shared.remember(chat_id, id, text, None);
        self.shared
            .print(&format!("[{}] #{id} -> {chat_id}: {text}", self.identity));
        Ok(id)
    }

    async fn edit_message(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> ClientResult<()> {
        if let Some(logged) = self.shared.history.lock().get_mut(&(chat_id, message_id)) {
            logged.text = text.to_string();
        }
        self.shared
            .print(&format!("[{}] #{message_id} edited in {chat_id}: {text}", self.identity));
        Ok(())
    }

    async fn reply(&self, chat_id: ChatId, reply_to: MessageId, text: &str) -> ClientResult<MessageId> {
        let id = self.shared.next_id();
        self.shared.remember(chat_id, id, text, Some(reply_to));
        self.shared.print(&format!(
            "[{}] #{id} -> {chat_id} (reply to #{reply_to}): {text}",
            self.identity
        ));
        Ok(id)
    }

    async fn forward_message(
        &self,
        from_chat: ChatId,
        message_id: MessageId,
        to_chat: ChatId,
    ) -> ClientResult<MessageId> {
        let text = self.message_text(from_chat, message_id).await?.unwrap_or_default();
        let id = self.shared.next_id();
        self.shared.remember(to_chat, id, &text, None);
        self.shared.print(&format!(
            "[{}] #{id} -> {to_chat} (forwarded #{message_id} from {from_chat}): {text}",
            self.identity
        ));
        Ok(id)
    }

    async fn copy_message(
        &self,
        from_chat: ChatId,
        message_id: MessageId,
        to_chat: ChatId,
    ) -> ClientResult<MessageId> {
        let text = self.message_text(from_chat, message_id).await?.unwrap_or_default();
        self.send_message(to_chat, &text).await
    }

    async fn reply_target(&self, chat_id: ChatId, message_id: MessageId) -> ClientResult<Option<MessageId>> {
        Ok(self
            .shared
            .history
            .lock()
            .get(&(chat_id, message_id))
            .and_then(|logged| logged.reply_to))
    }

    async fn message_text(&self, chat_id: ChatId, message_id: MessageId) -> ClientResult<Option<String>> {
        Ok(self
            .shared
            .history
            .lock()
            .get(&(chat_id, message_id))
            .map(|logged| logged.text.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line(">12 s/a/b/"), (Some(12), "s/a/b/"));
        assert_eq!(parse_line(".ping"), (None, ".ping"));
        assert_eq!(parse_line(">x hello"), (None, ">x hello"));
    }

    #[tokio::test]
    async fn test_lines_are_routed_by_prefix() {
        let output = Buffer::default();
        let connector = ConsoleConnector::new(
            42,
            Cursor::new(b".ping\n/help\n\n>1 s/a/b/\n".to_vec()),
            output.clone(),
        );
        let credentials = Credentials::default();
        let mut user = connector.connect(Identity::Primary, &credentials).await.unwrap();
        let mut bot = connector.connect(Identity::Secondary, &credentials).await.unwrap();

        let first = user.events.recv().await.unwrap();
        assert_eq!(first.text, ".ping");
        assert!(first.outgoing && !first.private);
        assert_eq!((first.chat_id, first.sender_id), (CONSOLE_CHAT, 42));

        let second = bot.events.recv().await.unwrap();
        assert_eq!(second.text, "/help");
        assert!(second.private && !second.outgoing);
        assert_eq!(second.chat_id, 42);

        let third = user.events.recv().await.unwrap();
        assert_eq!(third.reply_to, Some(1));
        assert_eq!(third.text, "s/a/b/");

        assert!(user.events.recv().await.is_none());
        assert!(bot.events.recv().await.is_none());
        assert!(output.contents().contains("[primary] #1 <- .ping"));
    }

    #[tokio::test]
    async fn test_read_error_closes_sessions() {
        let input = tokio_test::io::Builder::new()
            .read(b".ping\n")
            .read_error(std::io::Error::other("terminal went away"))
            .build();
        let connector = ConsoleConnector::new(42, BufReader::new(input), Buffer::default());
        let mut user = connector
            .connect(Identity::Primary, &Credentials::default())
            .await
            .unwrap();

        assert_eq!(user.events.recv().await.unwrap().text, ".ping");
        assert!(user.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_client_keeps_history() {
        let output = Buffer::default();
        let connector = ConsoleConnector::new(42, Cursor::new(Vec::new()), output.clone());
        let session = connector
            .connect(Identity::Primary, &Credentials::default())
            .await
            .unwrap();
        let client = session.client;

        let id = client.send_message(CONSOLE_CHAT, "hello").await.unwrap();
        client.edit_message(CONSOLE_CHAT, id, "hello world").await.unwrap();
        let reply = client.reply(CONSOLE_CHAT, id, "hi").await.unwrap();

        assert_eq!(
            client.message_text(CONSOLE_CHAT, id).await.unwrap().as_deref(),
            Some("hello world")
        );
        assert_eq!(client.reply_target(CONSOLE_CHAT, reply).await.unwrap(), Some(id));
        assert_eq!(client.user_id(), 42);

        let forwarded = client.forward_message(CONSOLE_CHAT, id, 7).await.unwrap();
        assert_eq!(
            client.message_text(7, forwarded).await.unwrap().as_deref(),
            Some("hello world")
        );
        let printed = output.contents();
        assert!(printed.contains(&format!("[primary] #{id} -> 1: hello")));
        assert!(printed.contains(&format!("[primary] #{id} edited in 1: hello world")));
    }
}
