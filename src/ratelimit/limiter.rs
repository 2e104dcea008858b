//! Per-key fixed-window rate limiter.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use tracing::{debug, info, trace};

use super::clock::{Clock, MonotonicClock};
use super::store::{store_for, LockPolicy, WindowStore};
use super::window::{Decision, WindowRule};
use crate::config::LimiterConfig;
use crate::error::Result;

/// Admits at most `window_max_size` requests per key in each fixed window.
///
/// Windows are anchored at the first request a key makes after its previous
/// window ran out, not at wall-clock boundaries. The limiter is `Sync` and is
/// meant to be shared between threads behind an `Arc`.
pub struct FixedWindowLimiter<K, C = MonotonicClock> {
    rule: WindowRule,
    policy: LockPolicy,
    clock: C,
    store: Box<dyn WindowStore<K>>,
}

impl<K, C> FixedWindowLimiter<K, C>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    C: Clock,
{
    /// Create a limiter using per-key locking.
    pub fn new(window_max_size: u64, window_duration: Duration, clock: C) -> Result<Self> {
        Self::with_policy(window_max_size, window_duration, clock, LockPolicy::PerKey)
    }

    /// Create a limiter with an explicit locking policy.
    pub fn with_policy(
        window_max_size: u64,
        window_duration: Duration,
        clock: C,
        policy: LockPolicy,
    ) -> Result<Self> {
        let rule = WindowRule::new(window_max_size, window_duration)?;

        info!(
            window_max_size,
            window_duration = ?window_duration,
            policy = %policy,
            "Fixed window limiter created"
        );

        Ok(Self {
            rule,
            policy,
            clock,
            store: store_for(policy),
        })
    }

    /// Create a limiter from loaded configuration.
    pub fn from_config(config: &LimiterConfig, clock: C) -> Result<Self> {
        Self::with_policy(
            config.window_max_size,
            config.window_duration(),
            clock,
            config.policy,
        )
    }

    /// Decide whether a request for `key` is let through.
    ///
    /// Admitted requests are counted against the key's window; rejected ones
    /// leave it untouched. The clock is read once, under the key's lock.
    pub fn handle_request(&self, key: &K) -> bool {
        let decision = self.store.decide(key, &self.clock, &self.rule);

        match decision {
            Decision::Reset => debug!(key = ?key, "Opened new window"),
            Decision::Rejected => debug!(
                key = ?key,
                limit = self.rule.max_size(),
                "Rate limit exceeded"
            ),
            Decision::Admitted => {}
        }
        trace!(key = ?key, decision = ?decision, "Request decided");

        decision.is_admitted()
    }

    /// Admitted count of the key's current window, `None` for unseen keys.
    pub fn window_count(&self, key: &K) -> Option<u64> {
        self.store.count(key)
    }

    /// Number of keys with window state.
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    /// Drop all window state.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Forget keys whose last window started more than `max_idle` ago.
    ///
    /// Windows still open are always kept, whatever `max_idle` says, so a
    /// later request sees the same outcome it would have without eviction.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let idle = max_idle.max(self.rule.duration());
        let removed = self.store.evict_started_before(self.clock.now(), idle);
        if removed > 0 {
            debug!(removed, remaining = self.store.len(), "Evicted idle windows");
        }
        removed
    }

    /// Maximum admitted requests per window.
    pub fn window_max_size(&self) -> u64 {
        self.rule.max_size()
    }

    /// Length of each window.
    pub fn window_duration(&self) -> Duration {
        self.rule.duration()
    }

    /// Locking policy in use.
    pub fn policy(&self) -> LockPolicy {
        self.policy
    }
}

impl<K, C> fmt::Debug for FixedWindowLimiter<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("rule", &self.rule)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
