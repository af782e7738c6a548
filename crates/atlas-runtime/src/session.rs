//! Dual-identity session management.
//!
//! An identity is connected when its credential is present: the primary
//! identity needs `STRING_SESSION`, the secondary identity `BOT_TOKEN`. The
//! run mode does not decide what connects, only what the dispatcher acts on,
//! so a bot token configured in `primary` mode still serves as the event log
//! sink.

use atlas_core::{BoxedClient, Connector, Identity, MessageEvent};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::AtlasConfig;
use crate::error::{RuntimeError, RuntimeResult};

/// The connected clients and their not-yet-consumed event streams.
pub struct SessionManager {
    primary: Option<BoxedClient>,
    secondary: Option<BoxedClient>,
    streams: Vec<(Identity, mpsc::Receiver<MessageEvent>)>,
}

impl SessionManager {
    /// Connects every identity that has credentials.
    ///
    /// Fails if no credentials are present or if a configured identity
    /// cannot connect.
    pub async fn start(config: &AtlasConfig, connector: &dyn Connector) -> RuntimeResult<Self> {
        let credentials = config.credentials();
        let mut manager = Self {
            primary: None,
            secondary: None,
            streams: Vec::new(),
        };

        let wanted = [
            (Identity::Primary, credentials.session.is_some()),
            (Identity::Secondary, credentials.bot_token.is_some()),
        ];
        for (identity, configured) in wanted {
            if !configured {
                continue;
            }
            info!(%identity, connector = connector.name(), "Starting client");
            let session = connector
                .connect(identity, &credentials)
                .await
                .map_err(|source| {
                    error!(%identity, error = %source, "Client failed to start");
                    RuntimeError::Connect { identity, source }
                })?;
            info!(%identity, user_id = session.client.user_id(), "Client started");

            match identity {
                Identity::Primary => manager.primary = Some(session.client),
                Identity::Secondary => manager.secondary = Some(session.client),
            }
            manager.streams.push((identity, session.events));
        }

        if manager.primary.is_none() && manager.secondary.is_none() {
            return Err(RuntimeError::NoClients);
        }
        Ok(manager)
    }

    pub fn primary(&self) -> Option<&BoxedClient> {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> Option<&BoxedClient> {
        self.secondary.as_ref()
    }

    /// The client connected as `identity`.
    pub fn client(&self, identity: Identity) -> Option<&BoxedClient> {
        match identity {
            Identity::Primary => self.primary(),
            Identity::Secondary => self.secondary(),
        }
    }

    /// Client used to deliver event-log notices: the secondary identity
    /// when connected, otherwise the primary.
    pub fn log_client(&self) -> Option<&BoxedClient> {
        self.secondary.as_ref().or(self.primary.as_ref())
    }

    /// Identities that are connected.
    pub fn identities(&self) -> Vec<Identity> {
        [Identity::Primary, Identity::Secondary]
            .into_iter()
            .filter(|identity| self.client(*identity).is_some())
            .collect()
    }

    /// Hands the event streams over to the caller. Subsequent calls return
    /// an empty list.
    pub fn take_streams(&mut self) -> Vec<(Identity, mpsc::Receiver<MessageEvent>)> {
        std::mem::take(&mut self.streams)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("identities", &self.identities())
            .field("pending_streams", &self.streams.len())
            .finish()
    }
}
