//! Layered `AtlasConfig` loading on top of figment.
//!
//! # Source order (later sources win)
//!
//! 1. Built-in defaults
//! 2. `atlas.toml` (current directory, then `<user config dir>/atlas`)
//! 3. Environment variables with the `ATLAS_` prefix
//! 4. Legacy flat environment variables (see [`LEGACY_ENV_VARS`])
//! 5. Programmatic overrides
//!
//! # Environment variables
//!
//! `ATLAS_` variables use `__` as the nesting separator:
//!
//! - `ATLAS_RUN_MODE=bot` → `run_mode = "bot"`
//! - `ATLAS_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `ATLAS_CONTROL__RESTART=exec` → `control.restart = "exec"`
//!
//! The legacy variables map to top-level keys of the same name, except
//! `LOG_LEVEL` which maps to `logging.level`.
//!
//! # Example
//!
//! ```rust,ignore
//! use atlas_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .file("./deploy/atlas.toml")
//!     .without_env()
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::AtlasConfig;
use super::validation::validate_config;

/// File name searched for in every search path.
pub const CONFIG_FILE_NAME: &str = "atlas.toml";

/// Unprefixed variables read for compatibility with existing deployments.
pub const LEGACY_ENV_VARS: [&str; 9] = [
    "API_ID",
    "API_HASH",
    "STRING_SESSION",
    "BOT_TOKEN",
    "OWNER_ID",
    "RUN_MODE",
    "DB_FILE",
    "PLUGIN_PATH",
    "LOG_LEVEL",
];

/// Builder that merges defaults, `atlas.toml`, the environment and overrides.
pub struct ConfigLoader {
    /// Programmatic overrides, merged last.
    overrides: Figment,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Explicit file; search paths are skipped when set.
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Adds a search path for `atlas.toml`.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file and skips the search paths. A missing file is an error.
    ///
    /// The file must exist; searching is skipped.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Reads `ATLAS_*` and the legacy flat variables. On by default.
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Ignores both `ATLAS_*` and the legacy flat variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Overrides a single key.
    ///
    /// ```rust,ignore
    /// let config = ConfigLoader::new().set("run_mode", "bot").load()?;
    /// ```
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Overrides everything with a complete configuration.
    pub fn merge(mut self, config: AtlasConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Loads the configuration without validating it.
    pub fn load(self) -> ConfigResult<AtlasConfig> {
        let figment = self.build_figment()?;
        let config: AtlasConfig = figment.extract()?;

        debug!(
            run_mode = %config.run_mode,
            logging_level = %config.logging.level,
            "Atlas configuration loaded"
        );
        Ok(config)
    }

    /// Loads and validates the configuration.
    pub fn load_validated(self) -> ConfigResult<AtlasConfig> {
        let config = self.load()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn build_figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(AtlasConfig::default()));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = figment.merge(Toml::file(path));
        } else {
            figment = self.load_config_file(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with ATLAS_ prefix");
            figment = figment
                .merge(Env::prefixed("ATLAS_").split("__"))
                .merge(legacy_env());
        }

        Ok(figment.merge(self.overrides))
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("atlas"));
        }
        paths
    }

    /// Merges the first `atlas.toml` found in the search paths.
    fn load_config_file(&self, figment: Figment) -> Figment {
        for search_path in self.resolve_search_paths() {
            let path = search_path.join(CONFIG_FILE_NAME);
            if path.exists() {
                info!(path = %path.display(), "Loading configuration file");
                return figment.merge(Toml::file(path));
            }
        }
        warn!("No configuration file found, using defaults");
        figment
    }
}

fn legacy_env() -> Env {
    Env::raw().only(&LEGACY_ENV_VARS).map(|key| {
        if key == "log_level" {
            "logging.level".into()
        } else {
            key.into()
        }
    })
}

/// Loads and validates configuration from the default locations.
pub fn load_config() -> ConfigResult<AtlasConfig> {
    ConfigLoader::new().load_validated()
}

/// Loads and validates configuration from a specific file.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<AtlasConfig> {
    ConfigLoader::new().file(path).load_validated()
}

#[cfg(test)]
mod tests {
    use atlas_core::RunMode;
    use figment::Jail;

    use super::*;

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();
            assert_eq!(config.logging.level, "info");
            assert_eq!(config.run_mode, RunMode::Dual);
            assert!(config.owner_id.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "atlas.toml",
                r#"
                run_mode = "user"
                owner_id = 111
                db_file = "data/atlas.db"

                [rate_limit]
                max_hits = 3

                [logging]
                level = "warn"
                "#,
            )?;
            jail.set_env("ATLAS_LOGGING__LEVEL", "debug");
            jail.set_env("ATLAS_CONTROL__RESTART", "exec");
            jail.set_env("OWNER_ID", "222");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .unwrap();
            assert_eq!(config.run_mode, RunMode::Primary);
            assert_eq!(config.owner_id, Some(222));
            assert_eq!(config.db_file, PathBuf::from("data/atlas.db"));
            assert_eq!(config.rate_limit.max_hits, 3);
            assert_eq!(config.rate_limit.window_secs, 60);
            assert_eq!(config.logging.level, "debug");
            assert_eq!(config.control.restart, super::super::RestartStrategy::Exec);
            Ok(())
        });
    }

    #[test]
    fn test_legacy_variables() {
        Jail::expect_with(|jail| {
            jail.set_env("API_ID", "12345");
            jail.set_env("API_HASH", "abcdef0123456789");
            jail.set_env("BOT_TOKEN", "123:abc");
            jail.set_env("RUN_MODE", "bot");
            jail.set_env("LOG_LEVEL", "trace");
            jail.set_env("PLUGIN_PATH", "extra");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .unwrap();
            assert_eq!(config.api_id, Some(12345));
            assert_eq!(config.api_hash.as_deref(), Some("abcdef0123456789"));
            assert_eq!(config.bot_token.as_deref(), Some("123:abc"));
            assert_eq!(config.run_mode, RunMode::Secondary);
            assert_eq!(config.logging.level, "trace");
            assert_eq!(config.plugin_path, PathBuf::from("extra"));
            Ok(())
        });
    }

    #[test]
    fn test_overrides_win() {
        Jail::expect_with(|jail| {
            jail.set_env("OWNER_ID", "222");
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .set("owner_id", 333)
                .load()
                .unwrap();
            assert_eq!(config.owner_id, Some(333));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::new().file("/nonexistent/atlas.toml").load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_validated_reports_missing_credentials() {
        Jail::expect_with(|jail| {
            jail.create_file("atlas.toml", "owner_id = 1\n")?;
            let result = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load_validated();
            assert!(matches!(result, Err(ConfigError::MissingField { .. })));
            Ok(())
        });
    }
}
