//! The plugin loader: discovery, validation, registration, reload, install.
//!
//! A load pass is total. Each candidate either ends up registered, skipped
//! (ineligible metadata) or failed (unreadable, missing service, failing
//! `init`); one bad plugin never stops the others.
//!
//! The pass builds a fresh [`CommandTable`] and plugin record set and swaps
//! both in at the end, so dispatch never sees a half-populated table and a
//! plugin removed from disk stops answering after the next reload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::descriptor::{PluginDescriptor, Rejection};
use super::manifest::ScriptManifest;
use super::source::PluginSource;
use super::{PluginCommand, PluginInterceptor, PluginPrivateForwarder};
use crate::context::{Service, Services};
use crate::error::{InstallError, PluginError};
use crate::eventlog::EventLog;
use crate::handler::guarded;
use crate::registry::{CommandRegistry, CommandTable};

/// A plugin that failed to load.
#[derive(Debug)]
pub struct LoadFailure {
    pub origin: String,
    pub error: PluginError,
}

/// Summary of one load pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Number of plugin records after the pass.
    pub loaded: usize,
    /// Candidates with ineligible metadata.
    pub skipped: Vec<(String, Rejection)>,
    pub failures: Vec<LoadFailure>,
}

/// Result of a successful install.
#[derive(Debug)]
pub struct Installed {
    pub path: PathBuf,
    pub descriptor: PluginDescriptor,
    pub report: LoadReport,
}

/// Loads plugins from its sources into the command registry.
pub struct PluginLoader {
    sources: Vec<Box<dyn PluginSource>>,
    registry: Arc<CommandRegistry>,
    events: Arc<EventLog>,
    records: RwLock<BTreeMap<String, PluginDescriptor>>,
    install_root: Option<PathBuf>,
    pass: tokio::sync::Mutex<()>,
}

impl PluginLoader {
    pub fn new(registry: Arc<CommandRegistry>, events: Arc<EventLog>) -> Self {
        Self {
            sources: Vec::new(),
            registry,
            events,
            records: RwLock::new(BTreeMap::new()),
            install_root: None,
            pass: tokio::sync::Mutex::new(()),
        }
    }

    /// Adds a source (builder pattern). Sources are loaded in order; a later
    /// plugin with the same name or command replaces an earlier one.
    pub fn with_source(mut self, source: impl PluginSource) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Sets the directory [`install`](Self::install) writes to.
    pub fn with_install_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.install_root = Some(root.into());
        self
    }

    pub fn install_root(&self) -> Option<&Path> {
        self.install_root.as_deref()
    }

    /// Runs a full load pass and replaces the live registry.
    pub async fn load(&self, services: &Services) -> LoadReport {
        let _pass = self.pass.lock().await;

        let mut table = CommandTable::new();
        let mut records = BTreeMap::new();
        let mut report = LoadReport::default();

        for source in &self.sources {
            let candidates = source.discover();
            debug!(source = source.name(), count = candidates.len(), "Plugin candidates discovered");

            for candidate in candidates {
                let origin = candidate.origin;
                let plugin = match candidate.plugin {
                    Ok(plugin) => plugin,
                    Err(error) => {
                        report.failures.push(LoadFailure { origin, error });
                        continue;
                    }
                };

                let metadata = plugin.metadata();
                if let Some(missing) = metadata.requires.iter().find(|id| !services.contains(id)) {
                    report.failures.push(LoadFailure {
                        origin,
                        error: PluginError::MissingService(missing.clone()),
                    });
                    continue;
                }

                if let Err(e) = guarded(plugin.init(services)).await {
                    report.failures.push(LoadFailure {
                        origin,
                        error: PluginError::Init(format!("{e:#}")),
                    });
                    continue;
                }

                let descriptor = match metadata.validate(&origin) {
                    Ok(descriptor) => descriptor,
                    Err(rejection) => {
                        debug!(plugin = %origin, reason = %rejection, "Plugin skipped");
                        report.skipped.push((origin, rejection));
                        continue;
                    }
                };

                for command in descriptor.commands.keys() {
                    table.register(command, Arc::new(PluginCommand(Arc::clone(&plugin))));
                }
                if descriptor.interceptor {
                    table.register_raw(Arc::new(PluginInterceptor(Arc::clone(&plugin))));
                }
                if descriptor.private_forwarder {
                    table.register_private_forwarder(Arc::new(PluginPrivateForwarder(Arc::clone(
                        &plugin,
                    ))));
                }

                debug!(
                    plugin = %descriptor.name,
                    origin = %descriptor.origin,
                    commands = descriptor.commands.len(),
                    "Plugin loaded"
                );
                if let Some(previous) = records.insert(descriptor.key(), descriptor) {
                    warn!(plugin = %previous.name, origin = %previous.origin, "Plugin replaced by a later one");
                }
            }
        }

        report.loaded = records.len();
        self.registry.replace(table);
        *self.records.write() = records;

        for failure in &report.failures {
            error!(plugin = %failure.origin, error = %failure.error, "Plugin failed to load");
            self.events
                .emit(
                    "Plugin failed to load",
                    &format!("Plugin: {}\nReason: {}", failure.origin, failure.error),
                )
                .await;
        }
        info!(
            loaded = report.loaded,
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "Plugins loaded"
        );
        report
    }

    /// Clears every record and command, then loads again.
    pub async fn reload(&self, services: &Services) -> LoadReport {
        info!("Reloading plugins");
        self.load(services).await
    }

    /// Validates an uploaded manifest, writes it under the install root and
    /// reloads.
    ///
    /// The file lands at `<root>/<category>/<name>.toml`; an existing file is
    /// never overwritten.
    pub async fn install(
        &self,
        services: &Services,
        file_name: &str,
        source: &str,
    ) -> Result<Installed, InstallError> {
        if !Path::new(file_name)
            .extension()
            .is_some_and(|ext| ext == "toml")
        {
            return Err(InstallError::UnsupportedFile(file_name.to_string()));
        }

        let manifest = ScriptManifest::parse(file_name, source)?;
        let descriptor = manifest.metadata().validate(file_name)?;
        let root = self.install_root.as_ref().ok_or(InstallError::NoInstallRoot)?;

        let path = root
            .join(file_stem(&descriptor.category))
            .join(format!("{}.toml", file_stem(&descriptor.name)));
        if tokio::fs::try_exists(&path).await? {
            return Err(InstallError::AlreadyExists(path));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, source).await?;
        info!(plugin = %descriptor.name, path = %path.display(), "Plugin installed");

        let report = self.reload(services).await;
        self.events
            .emit(
                "Module Installed",
                &format!("{} ({})", descriptor.name, descriptor.category),
            )
            .await;
        Ok(Installed {
            path,
            descriptor,
            report,
        })
    }

    // ─── Plugin records ───────────────────────────────────────────────────────

    /// All loaded plugins, ordered by lowercased name.
    pub fn plugins(&self) -> Vec<PluginDescriptor> {
        self.records.read().values().cloned().collect()
    }

    /// Looks up a plugin by name, case-insensitively.
    pub fn plugin(&self, name: &str) -> Option<PluginDescriptor> {
        self.records.read().get(&name.to_lowercase()).cloned()
    }

    /// The plugin owning `command` and the command's help text.
    pub fn command_help(&self, command: &str) -> Option<(PluginDescriptor, String)> {
        let command = command.to_lowercase();
        self.records.read().values().rev().find_map(|p| {
            p.commands
                .get(&command)
                .map(|help| (p.clone(), help.clone()))
        })
    }

    /// Plugin names grouped by category, both sorted.
    pub fn categories(&self) -> BTreeMap<String, Vec<PluginDescriptor>> {
        let mut categories: BTreeMap<String, Vec<PluginDescriptor>> = BTreeMap::new();
        for plugin in self.records.read().values() {
            categories
                .entry(plugin.category.clone())
                .or_default()
                .push(plugin.clone());
        }
        categories
    }

    /// Number of loaded plugins.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Service for PluginLoader {
    const ID: &'static str = "loader";
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("plugins", &self.records.read().len())
            .field("install_root", &self.install_root)
            .finish()
    }
}

/// Lowercases and replaces anything but `[a-z0-9_-]` so names are safe path
/// components.
fn file_stem(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
