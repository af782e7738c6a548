//! Private-message admission control for the secondary identity.
//!
//! Per non-owner sender, a sliding window admits at most `max_hits`
//! messages. Going over the cap starts a long cooldown during which every
//! message from that sender is dropped without a reply:
//!
//! ```text
//! cooling down?      ──► reject (no hit recorded)
//! record hit, prune hits older than `window`
//! hits > max_hits?   ──► start cooldown, forget hits, reject
//! otherwise          ──► admit
//! ```
//!
//! Entries are never removed; the map grows with the number of distinct
//! senders seen since startup.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use atlas_core::UserId;
use dashmap::DashMap;
use tracing::debug;

/// Limits applied per sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_hits: usize,
    pub cooldown: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_hits: 5,
            cooldown: Duration::from_secs(600),
        }
    }
}

/// Verdict for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Process the message.
    Admitted,
    /// This message pushed the sender over the cap; a cooldown started.
    Tripped,
    /// The sender is cooling down.
    Cooling,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        self == Self::Admitted
    }
}

#[derive(Debug, Default)]
struct RateEntry {
    hits: VecDeque<Instant>,
    ignored_until: Option<Instant>,
}

/// Sliding-window limiter with a punitive cooldown.
#[derive(Debug, Default)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    entries: DashMap<UserId, RateEntry>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Checks a message from `sender` arriving now.
    pub fn check(&self, sender: UserId) -> Admission {
        self.check_at(sender, Instant::now())
    }

    /// Checks a message from `sender` arriving at `now`.
    pub fn check_at(&self, sender: UserId, now: Instant) -> Admission {
        let mut entry = self.entries.entry(sender).or_default();

        if let Some(until) = entry.ignored_until {
            if now < until {
                return Admission::Cooling;
            }
            entry.ignored_until = None;
        }

        entry.hits.push_back(now);
        while let Some(&oldest) = entry.hits.front() {
            if now.saturating_duration_since(oldest) >= self.policy.window {
                entry.hits.pop_front();
            } else {
                break;
            }
        }

        if entry.hits.len() > self.policy.max_hits {
            entry.ignored_until = Some(now + self.policy.cooldown);
            entry.hits.clear();
            debug!(
                sender,
                cooldown_secs = self.policy.cooldown.as_secs(),
                "Sender exceeded private message rate, ignoring"
            );
            return Admission::Tripped;
        }

        Admission::Admitted
    }

    /// Number of senders tracked so far.
    pub fn tracked_senders(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn test_sixth_message_trips_cooldown() {
        let limiter = RateLimiter::default();
        let base = Instant::now();

        for i in 0..5 {
            assert_eq!(limiter.check_at(42, at(base, i * 2)), Admission::Admitted);
        }
        assert_eq!(limiter.check_at(42, at(base, 10)), Admission::Tripped);
        assert_eq!(limiter.check_at(42, at(base, 11)), Admission::Cooling);
        assert_eq!(limiter.check_at(42, at(base, 609)), Admission::Cooling);

        // Cooldown over: a fresh window starts.
        assert_eq!(limiter.check_at(42, at(base, 611)), Admission::Admitted);
        for i in 0..4 {
            assert_eq!(limiter.check_at(42, at(base, 612 + i)), Admission::Admitted);
        }
        assert_eq!(limiter.check_at(42, at(base, 620)), Admission::Tripped);
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::default();
        let base = Instant::now();

        for i in 0..5 {
            assert!(limiter.check_at(7, at(base, i)).is_admitted());
        }
        // The first hits have aged out of the 60s window.
        assert!(limiter.check_at(7, at(base, 62)).is_admitted());
        assert!(limiter.check_at(7, at(base, 63)).is_admitted());
    }

    #[test]
    fn test_senders_are_independent() {
        let limiter = RateLimiter::new(RateLimitPolicy {
            max_hits: 1,
            ..RateLimitPolicy::default()
        });
        let now = Instant::now();

        assert!(limiter.check_at(1, now).is_admitted());
        assert_eq!(limiter.check_at(1, now), Admission::Tripped);
        assert!(limiter.check_at(2, now).is_admitted());
        assert_eq!(limiter.tracked_senders(), 2);
    }
}
