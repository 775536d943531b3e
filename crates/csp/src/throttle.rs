// Path: crates/csp/src/throttle.rs

//! In-memory minimum-interval gates.
//!
//! Two gates guard `initiate_auth`: one per destination address (two sends
//! to the same inbox must be at least `throttle` apart, across every bundle
//! and member) and one per `(bundle, member)` key (two successful initiations
//! must be at least `cooldown` apart). Both are pure rate limits over
//! volatile state; losing them on restart only means one extra send is
//! allowed, which the durable challenge-record guard still bounds.

use dashmap::DashMap;
use std::time::Duration;
use tally_types::time::UnixMillis;

/// A keyed minimum-interval clock.
///
/// Entries are stamped on success; a stamp within the interval rejects the
/// caller with the remaining wait. The per-key `DashMap` entry lock makes
/// concurrent stamp attempts for one key serialize: exactly one wins.
#[derive(Default)]
pub struct ThrottleClock {
    slots: DashMap<String, UnixMillis>,
}

impl ThrottleClock {
    /// Creates an empty clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to stamp `key` at `now`. Fails with the remaining wait in
    /// milliseconds when the previous stamp is closer than `min_interval`.
    pub fn try_stamp(
        &self,
        key: &str,
        min_interval: Duration,
        now: UnixMillis,
    ) -> Result<(), u64> {
        let min = min_interval.as_millis() as u64;
        let mut slot = self.slots.entry(key.to_string()).or_insert(0);
        let last = *slot;
        if last != 0 && now < last.saturating_add(min) {
            return Err(last.saturating_add(min) - now);
        }
        *slot = now;
        Ok(())
    }

    /// Drops every stamp older than `horizon`, bounding memory on long-lived
    /// processes.
    pub fn evict_older_than(&self, horizon: UnixMillis) {
        self.slots.retain(|_, stamped| *stamped >= horizon);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_and_rejects_within_interval() {
        let clock = ThrottleClock::new();
        let interval = Duration::from_millis(1_000);
        assert!(clock.try_stamp("a", interval, 10_000).is_ok());
        let remaining = clock.try_stamp("a", interval, 10_400).unwrap_err();
        assert_eq!(remaining, 600);
        assert!(clock.try_stamp("a", interval, 11_000).is_ok());
    }

    #[test]
    fn keys_are_independent() {
        let clock = ThrottleClock::new();
        let interval = Duration::from_millis(1_000);
        assert!(clock.try_stamp("a", interval, 10_000).is_ok());
        assert!(clock.try_stamp("b", interval, 10_000).is_ok());
    }

    #[test]
    fn eviction_forgets_old_stamps() {
        let clock = ThrottleClock::new();
        let interval = Duration::from_millis(1_000);
        assert!(clock.try_stamp("a", interval, 10_000).is_ok());
        clock.evict_older_than(20_000);
        assert!(clock.try_stamp("a", interval, 10_100).is_ok());
    }
}
