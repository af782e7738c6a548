//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use atlas_core::{Credentials, RunMode, UserId};
use atlas_framework::RateLimitPolicy;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
///
/// Credential fields are optional here so that a partially configured
/// deployment fails in [`validate_config`](super::validate_config) with a
/// descriptive message instead of a deserialization error.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Which identities process events.
    pub run_mode: RunMode,

    /// Application id issued by the network.
    pub api_id: Option<i64>,

    /// Application hash issued by the network.
    pub api_hash: Option<String>,

    /// Login session of the primary identity.
    pub string_session: Option<String>,

    /// Token of the secondary identity.
    pub bot_token: Option<String>,

    /// The account allowed to run owner-only commands.
    pub owner_id: Option<UserId>,

    /// SQLite database file.
    pub db_file: PathBuf,

    /// Root directory scanned for plugin manifests.
    pub plugin_path: PathBuf,

    pub rate_limit: RateLimitConfig,

    pub control: ControlConfig,

    pub logging: LoggingConfig,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::default(),
            api_id: None,
            api_hash: None,
            string_session: None,
            bot_token: None,
            owner_id: None,
            db_file: PathBuf::from("atlas.db"),
            plugin_path: PathBuf::from("plugins"),
            rate_limit: RateLimitConfig::default(),
            control: ControlConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AtlasConfig {
    /// Authentication material handed to the connector.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_id: self.api_id.unwrap_or_default(),
            api_hash: self.api_hash.clone().unwrap_or_default(),
            session: self.string_session.clone().filter(|s| !s.is_empty()),
            bot_token: self.bot_token.clone().filter(|s| !s.is_empty()),
        }
    }
}

impl fmt::Debug for AtlasConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("AtlasConfig")
            .field("run_mode", &self.run_mode)
            .field("api_id", &self.api_id)
            .field("api_hash", &redacted(&self.api_hash))
            .field("string_session", &redacted(&self.string_session))
            .field("bot_token", &redacted(&self.bot_token))
            .field("owner_id", &self.owner_id)
            .field("db_file", &self.db_file)
            .field("plugin_path", &self.plugin_path)
            .field("rate_limit", &self.rate_limit)
            .field("control", &self.control)
            .field("logging", &self.logging)
            .finish()
    }
}

// =============================================================================
// Rate Limit
// =============================================================================

/// Per-sender limits for private messages to the secondary identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Length of the sliding window.
    pub window_secs: u64,
    /// Messages allowed inside one window.
    pub max_hits: usize,
    /// How long a sender stays blocked after exceeding the cap.
    pub cooldown_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_hits: 5,
            cooldown_secs: 600,
        }
    }
}

impl RateLimitConfig {
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            window: Duration::from_secs(self.window_secs),
            max_hits: self.max_hits,
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }
}

// =============================================================================
// Control
// =============================================================================

/// How the process replaces itself on `restart` and `update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartStrategy {
    /// Exit with [`ControlConfig::exit_code`] and let a supervisor relaunch.
    #[default]
    Exit,
    /// Re-execute the current binary in place.
    Exec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub restart: RestartStrategy,
    /// Exit code used by [`RestartStrategy::Exit`].
    pub exit_code: i32,
    /// Git checkout used by `update`.
    pub repository: PathBuf,
    /// Remote fetched by `update`.
    pub remote: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            restart: RestartStrategy::Exit,
            exit_code: 75,
            repository: PathBuf::from("."),
            remote: "origin".to_string(),
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Console output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line output.
    #[default]
    Compact,
    /// Default `tracing-subscriber` format.
    Full,
    /// Multi-line, human-friendly output.
    Pretty,
    /// One JSON object per line.
    #[cfg(feature = "json-log")]
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level (trace, debug, info, warn, error).
    pub level: String,

    pub format: LogFormat,

    /// Append-only log file. `None` disables file output.
    pub file_path: Option<PathBuf>,

    /// Per-target levels, e.g. `atlas_framework = "debug"`.
    pub filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            file_path: Some(PathBuf::from("atlas.log")),
            filters: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AtlasConfig::default();
        assert_eq!(config.run_mode, RunMode::Dual);
        assert_eq!(config.db_file, PathBuf::from("atlas.db"));
        assert_eq!(config.plugin_path, PathBuf::from("plugins"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.rate_limit.policy(), RateLimitPolicy::default());
        assert_eq!(config.control.exit_code, 75);
    }

    #[test]
    fn test_credentials_skip_empty_values() {
        let config = AtlasConfig {
            api_id: Some(12345),
            api_hash: Some("hash".into()),
            string_session: Some(String::new()),
            bot_token: Some("123:abc".into()),
            ..Default::default()
        };
        let credentials = config.credentials();
        assert_eq!(credentials.api_id, 12345);
        assert!(credentials.session.is_none());
        assert_eq!(credentials.bot_token.as_deref(), Some("123:abc"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = AtlasConfig {
            api_hash: Some("super-secret".into()),
            bot_token: Some("123:token".into()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("123:token"));
        assert!(debug.contains("<redacted>"));
    }
}
