//! Where plugins come from.
//!
//! | Source | Discovers |
//! |---|---|
//! | [`BuiltinSource`] | compiled plugins registered with [`register_builtin!`](crate::register_builtin) |
//! | [`ManifestSource`] | `*.toml` manifests under a plugin root |
//! | [`StaticSource`] | plugins handed over in code by an embedding host |
//!
//! Discovery never fails as a whole. A candidate that cannot be produced is
//! returned with its error so the loader can report it and carry on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::manifest::{ScriptManifest, ScriptPlugin};
use super::{BUILTIN_PLUGINS, BoxedPlugin};
use crate::error::PluginError;
use crate::handler::panic_message;

/// One discovered plugin, or the reason it could not be produced.
pub struct PluginCandidate {
    /// Where it came from, used in logs and failure notices.
    pub origin: String,
    pub plugin: Result<BoxedPlugin, PluginError>,
}

impl PluginCandidate {
    pub fn ok(origin: impl Into<String>, plugin: BoxedPlugin) -> Self {
        Self {
            origin: origin.into(),
            plugin: Ok(plugin),
        }
    }

    pub fn failed(origin: impl Into<String>, error: PluginError) -> Self {
        Self {
            origin: origin.into(),
            plugin: Err(error),
        }
    }
}

/// Enumerates plugin candidates.
pub trait PluginSource: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Discovers candidates in a stable order.
    fn discover(&self) -> Vec<PluginCandidate>;
}

// ─── BuiltinSource ────────────────────────────────────────────────────────────

/// Plugins compiled into the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinSource;

impl PluginSource for BuiltinSource {
    fn name(&self) -> &str {
        "builtin"
    }

    fn discover(&self) -> Vec<PluginCandidate> {
        let mut factories: Vec<_> = BUILTIN_PLUGINS.iter().collect();
        factories.sort_by_key(|f| f.origin);

        factories
            .into_iter()
            .map(|factory| match std::panic::catch_unwind(factory.create) {
                Ok(plugin) => PluginCandidate::ok(factory.origin, plugin),
                Err(payload) => PluginCandidate::failed(
                    factory.origin,
                    PluginError::Panicked(panic_message(&payload)),
                ),
            })
            .collect()
    }
}

// ─── ManifestSource ───────────────────────────────────────────────────────────

/// Manifests under a plugin root, walked recursively.
///
/// Files and directories whose name starts with `_` are skipped, as is
/// anything that is not a `.toml` file.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    root: PathBuf,
}

impl ManifestSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load(&self, path: &Path) -> Result<BoxedPlugin, PluginError> {
        let source = std::fs::read_to_string(path).map_err(|source| PluginError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = ScriptManifest::parse(path, &source)?;
        Ok(Arc::new(ScriptPlugin::new(manifest)))
    }

    fn origin(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

fn is_private(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('_'))
}

fn is_manifest(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

impl PluginSource for ManifestSource {
    fn name(&self) -> &str {
        "manifest"
    }

    fn discover(&self) -> Vec<PluginCandidate> {
        if !self.root.is_dir() {
            warn!(root = %self.root.display(), "Plugin directory not found, no manifests loaded");
            return Vec::new();
        }

        let mut candidates = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_private(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                    let origin = self.origin(&path);
                    candidates.push(PluginCandidate::failed(
                        origin,
                        PluginError::Read {
                            path,
                            source: e.into(),
                        },
                    ));
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_manifest(entry.path()) {
                continue;
            }

            let origin = self.origin(entry.path());
            debug!(plugin = %origin, "Discovered manifest");
            candidates.push(PluginCandidate {
                plugin: self.load(entry.path()),
                origin,
            });
        }
        candidates
    }
}

// ─── StaticSource ─────────────────────────────────────────────────────────────

/// Plugins supplied programmatically.
///
/// ```rust,ignore
/// let source = StaticSource::new("host").with("host:echo", Arc::new(EchoPlugin));
/// ```
#[derive(Default)]
pub struct StaticSource {
    name: String,
    entries: Vec<(String, Result<BoxedPlugin, String>)>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Adds a plugin.
    pub fn with(mut self, origin: impl Into<String>, plugin: BoxedPlugin) -> Self {
        self.entries.push((origin.into(), Ok(plugin)));
        self
    }

    /// Adds a candidate that fails to load with `reason`.
    pub fn with_failure(mut self, origin: impl Into<String>, reason: impl Into<String>) -> Self {
        self.entries.push((origin.into(), Err(reason.into())));
        self
    }
}

impl PluginSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn discover(&self) -> Vec<PluginCandidate> {
        self.entries
            .iter()
            .map(|(origin, entry)| match entry {
                Ok(plugin) => PluginCandidate::ok(origin.clone(), Arc::clone(plugin)),
                Err(reason) => {
                    PluginCandidate::failed(origin.clone(), PluginError::manifest(origin, reason.clone()))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn test_manifest_source_walks_and_skips_private() {
        let dir = tempfile::tempdir().unwrap();
        let ok = "name = \"A\"\ncommands = [\"a\"]\nreply = \"a\"\n";
        write(dir.path(), "fun/a.toml", ok);
        write(dir.path(), "fun/_disabled.toml", ok);
        write(dir.path(), "_drafts/b.toml", ok);
        write(dir.path(), "notes.txt", "ignored");
        write(dir.path(), "zz/broken.toml", "name = ");

        let candidates = ManifestSource::new(dir.path()).discover();
        let origins: Vec<_> = candidates.iter().map(|c| c.origin.clone()).collect();
        assert_eq!(
            origins,
            vec![
                Path::new("fun").join("a.toml").display().to_string(),
                Path::new("zz").join("broken.toml").display().to_string(),
            ]
        );
        assert!(candidates[0].plugin.is_ok());
        assert!(matches!(
            candidates[1].plugin,
            Err(PluginError::Manifest { .. })
        ));
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = ManifestSource::new(dir.path().join("absent"));
        assert!(source.discover().is_empty());
    }
}
