//! Configuration validation.
//!
//! Runs once at startup. A deployment that is missing anything its run mode
//! needs must not start at all.

use atlas_core::Identity;

use super::error::{ConfigError, ConfigResult};
use super::schema::{AtlasConfig, RateLimitConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &AtlasConfig) -> ConfigResult<()> {
    validate_logging(config)?;
    validate_rate_limit(&config.rate_limit)?;
    validate_credentials(config)?;
    Ok(())
}

fn validate_logging(config: &AtlasConfig) -> ConfigResult<()> {
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
        return Err(ConfigError::validation(format!(
            "Invalid log level: {}. Valid values are: {:?}",
            config.logging.level, valid_log_levels
        )));
    }
    Ok(())
}

fn validate_rate_limit(rate_limit: &RateLimitConfig) -> ConfigResult<()> {
    if rate_limit.window_secs == 0 {
        return Err(ConfigError::validation(
            "Rate limit window must be greater than 0",
        ));
    }
    if rate_limit.max_hits == 0 {
        return Err(ConfigError::validation(
            "Rate limit max_hits must be greater than 0",
        ));
    }
    if rate_limit.cooldown_secs == 0 {
        return Err(ConfigError::validation(
            "Rate limit cooldown must be greater than 0",
        ));
    }
    Ok(())
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn validate_credentials(config: &AtlasConfig) -> ConfigResult<()> {
    match config.api_id {
        None => return Err(ConfigError::missing_field("API_ID")),
        Some(id) if id <= 0 => {
            return Err(ConfigError::validation(format!(
                "API_ID must be a positive integer, got {id}"
            )));
        }
        Some(_) => {}
    }
    if !present(&config.api_hash) {
        return Err(ConfigError::missing_field("API_HASH"));
    }
    if config.owner_id.is_none() {
        return Err(ConfigError::missing_field("OWNER_ID"));
    }

    let mode = config.run_mode;
    if mode.allows(Identity::Primary) && !present(&config.string_session) {
        return Err(ConfigError::validation(format!(
            "STRING_SESSION is required when RUN_MODE is {mode}"
        )));
    }
    if mode.allows(Identity::Secondary) && !present(&config.bot_token) {
        return Err(ConfigError::validation(format!(
            "BOT_TOKEN is required when RUN_MODE is {mode}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use atlas_core::RunMode;

    use super::*;

    fn complete() -> AtlasConfig {
        AtlasConfig {
            api_id: Some(12345),
            api_hash: Some("hash".into()),
            string_session: Some("session".into()),
            bot_token: Some("123:abc".into()),
            owner_id: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn test_complete_config_is_valid() {
        assert!(validate_config(&complete()).is_ok());
    }

    #[test]
    fn test_required_fields() {
        let mut config = complete();
        config.api_id = None;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "API_ID"
        ));

        let mut config = complete();
        config.api_hash = Some("  ".into());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "API_HASH"
        ));

        let mut config = complete();
        config.owner_id = None;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "OWNER_ID"
        ));
    }

    #[test]
    fn test_run_mode_decides_required_credentials() {
        let mut config = complete();
        config.bot_token = None;
        assert!(validate_config(&config).is_err());
        config.run_mode = RunMode::Primary;
        assert!(validate_config(&config).is_ok());

        let mut config = complete();
        config.string_session = None;
        config.run_mode = RunMode::Secondary;
        assert!(validate_config(&config).is_ok());
        config.run_mode = RunMode::Dual;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("STRING_SESSION is required"));
    }

    #[test]
    fn test_invalid_log_level_and_limits() {
        let mut config = complete();
        config.logging.level = "verbose".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = complete();
        config.rate_limit.max_hits = 0;
        assert!(validate_config(&config).is_err());
    }
}
