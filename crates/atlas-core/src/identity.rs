//! Connected identities and the global run mode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the two accounts Atlas can be connected as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Identity {
    /// The full-privilege account that issues commands by sending them itself.
    Primary,
    /// The restricted bot account that receives commands from others.
    Secondary,
}

impl Identity {
    /// Command prefix recognised for this identity.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Primary => ".",
            Self::Secondary => "/",
        }
    }

    /// Returns the identity name as a string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Identity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "user" => Ok(Self::Primary),
            "secondary" | "bot" => Ok(Self::Secondary),
            other => Err(format!("unknown identity '{other}'")),
        }
    }
}

/// Which identities are allowed to process events.
///
/// `user` and `bot` are accepted as aliases for `primary` and `secondary`
/// so existing deployments keep working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Only the primary identity processes events.
    #[serde(alias = "user")]
    Primary,
    /// Only the secondary identity processes events.
    #[serde(alias = "bot")]
    Secondary,
    /// Both identities process events.
    #[default]
    Dual,
}

impl RunMode {
    /// Returns `true` when events from `identity` may be processed.
    pub const fn allows(self, identity: Identity) -> bool {
        matches!(
            (self, identity),
            (Self::Dual, _)
                | (Self::Primary, Identity::Primary)
                | (Self::Secondary, Identity::Secondary)
        )
    }

    /// Returns the run mode name as a string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Dual => "dual",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "user" => Ok(Self::Primary),
            "secondary" | "bot" => Ok(Self::Secondary),
            "dual" => Ok(Self::Dual),
            other => Err(format!(
                "invalid run mode '{other}', expected primary, secondary or dual"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(Identity::Primary.prefix(), ".");
        assert_eq!(Identity::Secondary.prefix(), "/");
    }

    #[test]
    fn test_run_mode_gate() {
        assert!(RunMode::Dual.allows(Identity::Primary));
        assert!(RunMode::Dual.allows(Identity::Secondary));
        assert!(RunMode::Primary.allows(Identity::Primary));
        assert!(!RunMode::Primary.allows(Identity::Secondary));
        assert!(!RunMode::Secondary.allows(Identity::Primary));
    }

    #[test]
    fn test_run_mode_aliases() {
        assert_eq!("user".parse::<RunMode>().unwrap(), RunMode::Primary);
        assert_eq!("BOT".parse::<RunMode>().unwrap(), RunMode::Secondary);
        assert!("both".parse::<RunMode>().is_err());

        let mode: RunMode = serde_json::from_str("\"bot\"").unwrap();
        assert_eq!(mode, RunMode::Secondary);
    }
}
