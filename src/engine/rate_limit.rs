//! Minimum spacing between successive starts of network-bound transforms.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

const GLOBAL_KEY: &str = "*";

/// Whether cooldowns are tracked per transform or shared by all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    #[default]
    PerTransform,
    Global,
}

/// Start-slot scheduler. Callers arriving early are queued, never rejected.
pub(crate) struct RateLimiter {
    scope: RateLimitScope,
    last_start: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub(crate) fn new(scope: RateLimitScope) -> Self {
        Self {
            scope,
            last_start: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until `transform` may start.
    pub(crate) async fn wait(&self, transform: &str, cooldown: Duration) {
        if cooldown.is_zero() {
            return;
        }
        let slot = self.reserve(transform, cooldown, Instant::now());
        tokio::time::sleep_until(slot).await;
    }

    /// Claim the next free start slot. The claim is made under the lock, so
    /// concurrent callers always end up at least `cooldown` apart.
    fn reserve(&self, transform: &str, cooldown: Duration, now: Instant) -> Instant {
        let key = match self.scope {
            RateLimitScope::PerTransform => transform,
            RateLimitScope::Global => GLOBAL_KEY,
        };
        let mut last_start = self.last_start.lock();
        let slot = match last_start.get(key) {
            Some(previous) => (*previous + cooldown).max(now),
            None => now,
        };
        last_start.insert(key.to_string(), slot);
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_spaced_by_cooldown() {
        let limiter = RateLimiter::new(RateLimitScope::PerTransform);
        let now = Instant::now();
        let cooldown = Duration::from_secs(2);
        let a = limiter.reserve("lookup", cooldown, now);
        let b = limiter.reserve("lookup", cooldown, now);
        let c = limiter.reserve("lookup", cooldown, now);
        assert_eq!(a, now);
        assert_eq!(b - a, cooldown);
        assert_eq!(c - b, cooldown);
    }

    #[test]
    fn test_per_transform_scope_is_independent() {
        let limiter = RateLimiter::new(RateLimitScope::PerTransform);
        let now = Instant::now();
        let cooldown = Duration::from_secs(5);
        limiter.reserve("a", cooldown, now);
        assert_eq!(limiter.reserve("b", cooldown, now), now);
    }

    #[test]
    fn test_global_scope_is_shared() {
        let limiter = RateLimiter::new(RateLimitScope::Global);
        let now = Instant::now();
        let cooldown = Duration::from_secs(5);
        limiter.reserve("a", cooldown, now);
        assert_eq!(limiter.reserve("b", cooldown, now), now + cooldown);
    }

    #[test]
    fn test_idle_limiter_does_not_delay() {
        let limiter = RateLimiter::new(RateLimitScope::PerTransform);
        let start = Instant::now();
        let cooldown = Duration::from_secs(1);
        limiter.reserve("a", cooldown, start);
        let later = start + Duration::from_secs(10);
        assert_eq!(limiter.reserve("a", cooldown, later), later);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_until_slot() {
        let limiter = RateLimiter::new(RateLimitScope::PerTransform);
        let start = Instant::now();
        limiter.wait("a", Duration::from_secs(3)).await;
        limiter.wait("a", Duration::from_secs(3)).await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
