//! Process-wide AFK ("away from keyboard") state.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::context::Service;

/// Snapshot of the AFK flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AfkStatus {
    pub enabled: bool,
    pub since: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// The single AFK record shared by the dispatcher and the AFK plugin.
#[derive(Debug, Default)]
pub struct AfkState {
    inner: Mutex<AfkStatus>,
}

impl AfkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables AFK. Returns `false` (and changes nothing) if already enabled.
    pub fn set(&self, reason: Option<String>) -> bool {
        let mut status = self.inner.lock();
        if status.enabled {
            return false;
        }
        *status = AfkStatus {
            enabled: true,
            since: Some(Utc::now()),
            reason,
        };
        true
    }

    /// Disables AFK and returns the previous status if it was enabled.
    ///
    /// Exactly one of several concurrent callers observes `Some`.
    pub fn clear(&self) -> Option<AfkStatus> {
        let mut status = self.inner.lock();
        if !status.enabled {
            return None;
        }
        Some(std::mem::take(&mut *status))
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    pub fn status(&self) -> AfkStatus {
        self.inner.lock().clone()
    }
}

impl Service for AfkState {
    const ID: &'static str = "afk";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear_once() {
        let afk = AfkState::new();
        assert!(afk.clear().is_none());

        assert!(afk.set(Some("lunch".into())));
        assert!(!afk.set(Some("dinner".into())));
        assert_eq!(afk.status().reason.as_deref(), Some("lunch"));

        let previous = afk.clear().unwrap();
        assert_eq!(previous.reason.as_deref(), Some("lunch"));
        assert!(previous.since.is_some());
        assert!(afk.clear().is_none());
        assert_eq!(afk.status(), AfkStatus::default());
    }
}
