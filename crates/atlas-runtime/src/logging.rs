//! Logging setup for the Atlas runtime.
//!
//! Two outputs share one [`EnvFilter`]:
//!
//! | Output | Writer | Format |
//! |---|---|---|
//! | console | stdout | compact, full or pretty (`logging.format`) |
//! | file | `tracing-appender`, non-blocking, append-only | full, without ANSI colors |
//!
//! `RUST_LOG` takes precedence over `logging.level` when it is set.
//! Per-target levels from `logging.filters` are added on top.
//!
//! ```rust,ignore
//! use atlas_runtime::logging::LoggingBuilder;
//!
//! let _guard = LoggingBuilder::from_config(&config.logging).try_init()?;
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LoggingConfig};

/// Keeps the file writer alive. Buffered lines are flushed on drop.
#[must_use = "dropping the guard stops file logging"]
#[derive(Default)]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

impl std::fmt::Debug for LogGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogGuard")
            .field("file", &self._file.is_some())
            .finish()
    }
}

/// Assembles the global subscriber: filter, console layer, optional log file.
pub struct LoggingBuilder {
    level: tracing::Level,
    directives: Vec<String>,
    format: LogFormat,
    with_target: bool,
    file_path: Option<PathBuf>,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// Console-only logging at `info`.
    pub fn new() -> Self {
        Self {
            level: tracing::Level::INFO,
            directives: Vec::new(),
            format: LogFormat::Compact,
            with_target: true,
            file_path: None,
        }
    }

    /// Seeds level, directives, format and file path from the `logging` section.
    ///
    /// An unparsable level falls back to `info`; validation rejects those
    /// before logging is initialized.
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new();
        builder.level = config.level.parse().unwrap_or(tracing::Level::INFO);
        builder.format = config.format;
        builder.file_path.clone_from(&config.file_path);
        for (target, level) in &config.filters {
            builder.directives.push(format!("{target}={level}"));
        }
        builder
    }

    /// Base level for every target not covered by a directive.
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    /// Add a filter directive such as `atlas_framework=debug`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Include the target (module path) in console output.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Also append to `path`.
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn without_file(mut self) -> Self {
        self.file_path = None;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let base_filter = self.level.to_string().to_lowercase();
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base_filter));
        for directive in &self.directives {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
        filter
    }

    /// Initialize logging, ignoring a subscriber that is already installed.
    pub fn init(self) -> LogGuard {
        self.try_init().unwrap_or_default()
    }

    /// Try to initialize logging, returning an error if a global subscriber
    /// is already set.
    pub fn try_init(self) -> Result<LogGuard, TryInitError> {
        let filter = self.build_filter();

        let (file_layer, guard) = match &self.file_path {
            Some(path) => {
                let (directory, file_name) = split_log_path(path);
                let appender = tracing_appender::rolling::never(directory, file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer().with_ansi(false).with_writer(writer);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        macro_rules! init_with_console {
            ($layer:expr) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(file_layer)
                    .with($layer.with_target(self.with_target))
                    .try_init()
            };
        }

        match self.format {
            LogFormat::Compact => init_with_console!(fmt::layer().compact()),
            LogFormat::Full => init_with_console!(fmt::layer()),
            LogFormat::Pretty => init_with_console!(fmt::layer().pretty()),
            #[cfg(feature = "json-log")]
            LogFormat::Json => init_with_console!(fmt::layer().json()),
        }?;

        Ok(LogGuard { _file: guard })
    }
}

/// Splits a log path into the directory and the file name the appender
/// expects. A bare file name is placed in the current directory.
fn split_log_path(path: &Path) -> (&Path, &OsStr) {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name().unwrap_or_else(|| OsStr::new("atlas.log"));
    (directory, file_name)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_from_config() {
        let config = LoggingConfig {
            level: "debug".into(),
            format: LogFormat::Pretty,
            file_path: None,
            filters: BTreeMap::from([("atlas_storage".to_string(), "trace".to_string())]),
        };
        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(builder.level, tracing::Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Pretty);
        assert!(builder.file_path.is_none());
        assert_eq!(builder.directives, vec!["atlas_storage=trace".to_string()]);
    }

    #[test]
    fn test_invalid_level_falls_back_to_info() {
        let config = LoggingConfig {
            level: "loud".into(),
            ..Default::default()
        };
        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(builder.level, tracing::Level::INFO);
        assert_eq!(builder.file_path, Some(PathBuf::from("atlas.log")));
    }

    #[test]
    fn test_split_log_path() {
        assert_eq!(
            split_log_path(Path::new("atlas.log")),
            (Path::new("."), OsStr::new("atlas.log"))
        );
        assert_eq!(
            split_log_path(Path::new("/var/log/atlas/bot.log")),
            (Path::new("/var/log/atlas"), OsStr::new("bot.log"))
        );
    }
}
