//! Configuration for the Atlas runtime.
//!
//! Settings are layered with figment (defaults, `atlas.toml`, `ATLAS_*`
//! variables, the legacy flat variables, then programmatic overrides) and
//! validated once at startup.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_FILE_NAME, ConfigLoader, LEGACY_ENV_VARS, load_config, load_config_from_file};
pub use schema::{
    AtlasConfig, ControlConfig, LogFormat, LoggingConfig, RateLimitConfig, RestartStrategy,
};
pub use validation::validate_config;
