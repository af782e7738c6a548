//! Process-wide settings shared with the dispatcher and plugins.

use atlas_core::{RunMode, UserId};
use atlas_storage::Store;
use chrono::{DateTime, TimeDelta, Utc};

use crate::context::Service;

impl Service for Store {
    const ID: &'static str = "store";
}

/// Static facts about this process, fixed at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Which identities may process events.
    pub run_mode: RunMode,
    /// The operator permitted unrestricted use of the secondary identity.
    pub owner_id: UserId,
    /// Version string reported by `alive`.
    pub version: String,
    /// When this process started.
    pub started_at: DateTime<Utc>,
}

impl Settings {
    /// Creates settings stamped with the current time and crate version.
    pub fn new(run_mode: RunMode, owner_id: UserId) -> Self {
        Self {
            run_mode,
            owner_id,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }

    /// Time since startup.
    pub fn uptime(&self) -> TimeDelta {
        Utc::now() - self.started_at
    }
}

impl Service for Settings {
    const ID: &'static str = "settings";
}

/// Renders a duration as `1d 2h 3m 4s`, omitting leading zero units.
pub fn human_duration(delta: TimeDelta) -> String {
    let total = delta.num_seconds().max(0);
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        total % 86_400 / 3_600,
        total % 3_600 / 60,
        total % 60,
    );

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 || !parts.is_empty() {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || !parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_duration() {
        assert_eq!(human_duration(TimeDelta::seconds(5)), "5s");
        assert_eq!(human_duration(TimeDelta::seconds(65)), "1m 5s");
        assert_eq!(human_duration(TimeDelta::seconds(3_600)), "1h 0m 0s");
        assert_eq!(human_duration(TimeDelta::seconds(90_061)), "1d 1h 1m 1s");
        assert_eq!(human_duration(TimeDelta::seconds(-3)), "0s");
    }
}
