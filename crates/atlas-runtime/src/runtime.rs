//! Runtime orchestration.
//!
//! [`AtlasRuntime::run`] brings the agent up in a fixed order and keeps it
//! running until Ctrl-C, SIGTERM or the end of a session:
//!
//! 1. open the store
//! 2. connect the configured identities
//! 3. point the event log at the log client
//! 4. build the shared services and load plugins
//! 5. reconcile a pending restart or update
//! 6. spawn one event pump per identity
//!
//! Each pump hands every event to the dispatcher in its own task, so a slow
//! handler never holds up the next event.
//!
//! ```rust,ignore
//! use atlas_runtime::AtlasRuntime;
//!
//! let runtime = AtlasRuntime::builder()
//!     .config_file("deploy/atlas.toml")
//!     .connector(MyConnector::new())
//!     .build()?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use atlas_core::{BoxedClient, Connector, Identity, MessageEvent};
use atlas_framework::{
    AfkState, BuiltinSource, CommandRegistry, ConversationHub, Dispatcher, EventLog, ForwardRelay,
    Lifecycle, LoadReport, ManifestSource, PluginLoader, RateLimiter, Relauncher, Services,
    Settings,
};
use atlas_storage::Store;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{AtlasConfig, ConfigError, ConfigLoader, RestartStrategy, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::lifecycle::{ExecRelauncher, ExitRelauncher, GitUpdateSource, Startup, reconcile};
use crate::logging::{LogGuard, LoggingBuilder};
use crate::session::SessionManager;

/// The Atlas agent: configuration plus the transport it connects through.
pub struct AtlasRuntime {
    config: AtlasConfig,
    connector: Arc<dyn Connector>,
    relauncher: Arc<dyn Relauncher>,
    _log_guard: LogGuard,
}

impl AtlasRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Logging is not initialized.
    pub fn from_config(config: AtlasConfig, connector: impl Connector) -> RuntimeResult<Self> {
        validate_config(&config)?;
        let relauncher = default_relauncher(&config);
        Ok(Self {
            config,
            connector: Arc::new(connector),
            relauncher,
            _log_guard: LogGuard::default(),
        })
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// Runs until Ctrl-C, SIGTERM or the end of a session.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Runs until `shutdown` completes or a session ends.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let running = self.start().await?;
        info!(
            identities = ?running.identities,
            "Atlas is now running. Press Ctrl+C to stop."
        );
        running.wait(shutdown).await;
        Ok(())
    }

    /// Starts the agent and returns once events are being dispatched.
    pub async fn start(&self) -> RuntimeResult<Running> {
        let config = &self.config;
        let owner_id = config
            .owner_id
            .ok_or_else(|| ConfigError::missing_field("OWNER_ID"))?;

        let store = Store::open(&config.db_file)?;

        let mut sessions = SessionManager::start(config, self.connector.as_ref()).await?;

        let events = Arc::new(EventLog::new(store.clone()));
        if let Some(client) = sessions.log_client() {
            events.set_sink(client.clone());
        }

        let settings = Arc::new(Settings::new(config.run_mode, owner_id));
        let afk = Arc::new(AfkState::new());
        let hub = Arc::new(ConversationHub::new());
        let registry = Arc::new(CommandRegistry::new());
        let loader = Arc::new(
            PluginLoader::new(Arc::clone(&registry), Arc::clone(&events))
                .with_source(BuiltinSource)
                .with_source(ManifestSource::new(&config.plugin_path))
                .with_install_root(&config.plugin_path),
        );
        let lifecycle = Lifecycle::new(Arc::clone(&self.relauncher)).with_updates(Arc::new(
            GitUpdateSource::new(&config.control.repository, &config.control.remote),
        ));

        let services = Arc::new(
            Services::new()
                .with(Arc::new(store.clone()))
                .with(Arc::clone(&settings))
                .with(Arc::clone(&afk))
                .with(Arc::clone(&events))
                .with(Arc::clone(&hub))
                .with(Arc::new(lifecycle))
                .with(Arc::clone(&loader)),
        );

        let report = loader.load(&services).await;

        let startup = reconcile(&store, &sessions, &events, config.run_mode).await?;

        let dispatcher = Arc::new(
            Dispatcher::new(
                settings,
                registry,
                Arc::clone(&services),
                afk,
                Arc::new(RateLimiter::new(config.rate_limit.policy())),
                events,
            )
            .with_watcher(hub)
            .with_watcher(Arc::new(ForwardRelay::new(store))),
        );

        let token = CancellationToken::new();
        let mut pumps = JoinSet::new();
        let identities = sessions.identities();
        for (identity, stream) in sessions.take_streams() {
            let Some(client) = sessions.client(identity).cloned() else {
                continue;
            };
            pumps.spawn(pump(
                identity,
                client,
                stream,
                Arc::clone(&dispatcher),
                token.clone(),
            ));
        }

        Ok(Running {
            startup,
            identities,
            services,
            report,
            token,
            pumps,
        })
    }
}

impl std::fmt::Debug for AtlasRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasRuntime")
            .field("config", &self.config)
            .field("connector", &self.connector.name())
            .field("relauncher", &self.relauncher.name())
            .finish()
    }
}

fn default_relauncher(config: &AtlasConfig) -> Arc<dyn Relauncher> {
    match config.control.restart {
        RestartStrategy::Exit => Arc::new(ExitRelauncher::new(config.control.exit_code)),
        RestartStrategy::Exec => Arc::new(ExecRelauncher),
    }
}

/// Reads one identity's event stream until it ends or the token fires.
async fn pump(
    identity: Identity,
    client: BoxedClient,
    mut stream: mpsc::Receiver<MessageEvent>,
    dispatcher: Arc<Dispatcher>,
    token: CancellationToken,
) -> Identity {
    debug!(%identity, "Event pump started");
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            next = stream.recv() => match next {
                Some(event) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    let client = client.clone();
                    tokio::spawn(async move {
                        dispatcher.dispatch(&client, event).await;
                    });
                }
                None => {
                    warn!(%identity, "Event stream ended");
                    break;
                }
            },
        }
    }
    debug!(%identity, "Event pump stopped");
    identity
}

/// Completes on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

// =============================================================================
// Running
// =============================================================================

/// A started agent.
pub struct Running {
    startup: Startup,
    identities: Vec<Identity>,
    services: Arc<Services>,
    report: LoadReport,
    token: CancellationToken,
    pumps: JoinSet<Identity>,
}

impl Running {
    /// Whether this start resumed a restart or update.
    pub fn startup(&self) -> Startup {
        self.startup
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Outcome of the initial plugin load.
    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    /// Token that stops every event pump when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Waits for `shutdown` or the end of any session, then stops the pumps.
    ///
    /// Dispatches already in flight are not awaited.
    pub async fn wait<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {}
            _ = self.token.cancelled() => {}
            Some(ended) = self.pumps.join_next() => match ended {
                Ok(identity) => warn!(%identity, "Session ended, shutting down"),
                Err(e) => error!(error = %e, "Event pump failed, shutting down"),
            },
        }

        self.token.cancel();
        while self.pumps.join_next().await.is_some() {}
        info!("Atlas stopped");
    }
}

impl std::fmt::Debug for Running {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Running")
            .field("startup", &self.startup)
            .field("identities", &self.identities)
            .field("plugins", &self.report.loaded)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating an [`AtlasRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<AtlasConfig>,
    connector: Option<Arc<dyn Connector>>,
    relauncher: Option<Arc<dyn Relauncher>>,
    init_logging: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            connector: None,
            relauncher: None,
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Adds a search path for `atlas.toml`.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Uses `config` as is instead of loading one.
    pub fn config(mut self, config: AtlasConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// The transport identities are connected through.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Shares a connector that is also used elsewhere.
    pub fn shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Overrides the restart strategy chosen by `control.restart`.
    pub fn relauncher(mut self, relauncher: Arc<dyn Relauncher>) -> Self {
        self.relauncher = Some(relauncher);
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Loads and validates the configuration, then initializes logging.
    pub fn build(self) -> RuntimeResult<AtlasRuntime> {
        let connector = self.connector.ok_or(RuntimeError::NoConnector)?;
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        validate_config(&config)?;

        let log_guard = if self.init_logging {
            match LoggingBuilder::from_config(&config.logging).try_init() {
                Ok(guard) => guard,
                Err(e) => {
                    warn!(error = %e, "Logging already initialized, keeping the existing subscriber");
                    LogGuard::default()
                }
            }
        } else {
            LogGuard::default()
        };
        info!(
            run_mode = %config.run_mode,
            connector = connector.name(),
            log_level = %config.logging.level,
            "Runtime initialized from configuration"
        );

        let relauncher = self
            .relauncher
            .unwrap_or_else(|| default_relauncher(&config));
        Ok(AtlasRuntime {
            config,
            connector,
            relauncher,
            _log_guard: log_guard,
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use atlas_core::testing::{MockClient, MockConnector, OWNER_ID, outgoing};
    use atlas_framework::{LifecycleResult, PluginLoader};
    use atlas_storage::{ControlAction, ControlStatus};

    use super::*;

    #[derive(Default)]
    struct CountingRelauncher(AtomicUsize);

    #[async_trait]
    impl Relauncher for CountingRelauncher {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn relaunch(&self) -> LifecycleResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(dir: &Path) -> AtlasConfig {
        AtlasConfig {
            api_id: Some(12345),
            api_hash: Some("hash".into()),
            string_session: Some("session".into()),
            bot_token: Some("123:abc".into()),
            owner_id: Some(OWNER_ID),
            db_file: dir.join("data").join("atlas.db"),
            plugin_path: dir.join("plugins"),
            ..Default::default()
        }
    }

    fn runtime(
        dir: &Path,
        connector: &Arc<MockConnector>,
        relauncher: &Arc<CountingRelauncher>,
    ) -> AtlasRuntime {
        AtlasRuntime::builder()
            .config(config(dir))
            .shared_connector(Arc::clone(connector) as Arc<dyn Connector>)
            .relauncher(Arc::clone(relauncher) as Arc<dyn Relauncher>)
            .without_logging()
            .build()
            .unwrap()
    }

    async fn eventually(client: &MockClient, needle: &str) -> bool {
        for _ in 0..200 {
            if client.texts().iter().any(|t| t.contains(needle)) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_build_requires_connector_and_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = AtlasRuntime::builder()
            .config(config(dir.path()))
            .without_logging()
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::NoConnector));

        let mut incomplete = config(dir.path());
        incomplete.owner_id = None;
        let err = AtlasRuntime::builder()
            .config(incomplete)
            .connector(MockConnector::new())
            .without_logging()
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::MissingField { .. })
        ));
    }

    #[tokio::test]
    async fn test_start_dispatches_until_session_ends() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(MockConnector::new());
        let relauncher = Arc::new(CountingRelauncher::default());
        let runtime = runtime(dir.path(), &connector, &relauncher);

        let running = runtime.start().await.unwrap();
        assert_eq!(running.startup(), Startup::ColdStart);
        assert_eq!(running.identities(), &[Identity::Primary, Identity::Secondary]);
        assert!(running.load_report().failures.is_empty());
        let loader = running.services().require::<PluginLoader>().unwrap();
        assert!(loader.plugin("Ping").is_some());
        assert!(dir.path().join("data").join("atlas.db").exists());

        connector
            .sender(Identity::Primary)
            .unwrap()
            .send(outgoing(".ping"))
            .await
            .unwrap();
        let user = connector.client(Identity::Primary).unwrap();
        assert!(eventually(&user, "Pong!").await);

        connector.disconnect(Identity::Primary);
        tokio::time::timeout(Duration::from_secs(5), running.wait(std::future::pending()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_restart_is_reconciled_by_next_start() {
        let dir = tempfile::tempdir().unwrap();
        let relauncher = Arc::new(CountingRelauncher::default());

        let first = Arc::new(MockConnector::new());
        let running = runtime(dir.path(), &first, &relauncher).start().await.unwrap();
        first
            .sender(Identity::Primary)
            .unwrap()
            .send(outgoing(".restart"))
            .await
            .unwrap();
        let user = first.client(Identity::Primary).unwrap();
        assert!(eventually(&user, "Restarting Atlas").await);
        for _ in 0..200 {
            if relauncher.0.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(relauncher.0.load(Ordering::SeqCst), 1);
        running.cancellation_token().cancel();
        running.wait(std::future::pending()).await;

        let second = Arc::new(MockConnector::new());
        let running = runtime(dir.path(), &second, &relauncher).start().await.unwrap();
        assert_eq!(
            running.startup(),
            Startup::Resumed {
                action: ControlAction::Restart,
                status: ControlStatus::Success,
            }
        );
        let user = second.client(Identity::Primary).unwrap();
        assert_eq!(
            user.last_text().as_deref(),
            Some("✅ **Restart completed successfully**")
        );
        running.cancellation_token().cancel();
        running.wait(std::future::pending()).await;
    }

    #[tokio::test]
    async fn test_run_until_returns_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(MockConnector::new());
        let relauncher = Arc::new(CountingRelauncher::default());
        let runtime = runtime(dir.path(), &connector, &relauncher);

        tokio::time::timeout(Duration::from_secs(5), runtime.run_until(async {}))
            .await
            .unwrap()
            .unwrap();
    }
}
