//! Key to window storage under the two locking policies.
//!
//! Both stores run the same [`WindowRule::apply`]; they differ only in how
//! much of the table a decision locks. The clock is read inside that lock, so
//! a decision can never act on a time older than an eviction that ran first.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::clock::Clock;
use super::window::{Decision, WindowRule, WindowState};

/// Locking granularity used by a limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// One lock over the whole table. Every key contends with every other.
    Coarse,
    /// Concurrent table with one lock per key.
    #[default]
    PerKey,
}

impl fmt::Display for LockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockPolicy::Coarse => write!(f, "coarse"),
            LockPolicy::PerKey => write!(f, "per_key"),
        }
    }
}

/// Storage for per-key windows.
///
/// Implementations must read `clock` and run `rule.apply` for a key as one
/// atomic unit with respect to every other call touching the same key.
pub trait WindowStore<K>: Send + Sync {
    /// Find or create the window for `key` and decide one request against it.
    fn decide(&self, key: &K, clock: &dyn Clock, rule: &WindowRule) -> Decision;

    /// Admitted count of the key's current window, if the key is known.
    fn count(&self, key: &K) -> Option<u64>;

    /// Number of keys held.
    fn len(&self) -> usize;

    /// Whether no keys are held.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every window.
    fn clear(&self);

    /// Remove windows that started more than `idle` before `now`.
    ///
    /// Returns how many keys were removed.
    fn evict_started_before(&self, now: Instant, idle: Duration) -> usize;
}

/// Build the store matching `policy`.
pub fn store_for<K>(policy: LockPolicy) -> Box<dyn WindowStore<K>>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    match policy {
        LockPolicy::Coarse => Box::new(CoarseStore::new()),
        LockPolicy::PerKey => Box::new(PerKeyStore::new()),
    }
}

fn is_idle(state: &WindowState, now: Instant, idle: Duration) -> bool {
    now.saturating_duration_since(state.window_start()) > idle
}

/// A plain map behind a single mutex.
pub struct CoarseStore<K> {
    windows: Mutex<HashMap<K, WindowState>>,
}

impl<K> CoarseStore<K> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> Default for CoarseStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> WindowStore<K> for CoarseStore<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn decide(&self, key: &K, clock: &dyn Clock, rule: &WindowRule) -> Decision {
        let mut windows = self.windows.lock();
        let now = clock.now();
        let state = windows
            .entry(key.clone())
            .or_insert_with(|| WindowState::new(now));
        rule.apply(state, now)
    }

    fn count(&self, key: &K) -> Option<u64> {
        self.windows.lock().get(key).map(WindowState::count)
    }

    fn len(&self) -> usize {
        self.windows.lock().len()
    }

    fn clear(&self) {
        self.windows.lock().clear();
    }

    fn evict_started_before(&self, now: Instant, idle: Duration) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, state| !is_idle(state, now, idle));
        before - windows.len()
    }
}

/// Contents of a per-key slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Inserted, no request decided yet.
    Vacant,
    Live(WindowState),
    /// Unlinked from the table by eviction or `clear`.
    Retired,
}

type Slot = Arc<Mutex<SlotState>>;

/// A concurrent map whose entries each carry their own lock.
///
/// The map's shard lock is only held to find or insert a slot; the decision
/// itself runs under the slot's lock alone.
pub struct PerKeyStore<K: Eq + Hash> {
    windows: DashMap<K, Slot>,
}

impl<K: Eq + Hash + Clone> PerKeyStore<K> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    fn slot(&self, key: &K) -> Slot {
        if let Some(slot) = self.get(key) {
            return slot;
        }

        let slot = self
            .windows
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SlotState::Vacant)));
        Arc::clone(slot.value())
    }

    fn get(&self, key: &K) -> Option<Slot> {
        self.windows.get(key).map(|slot| Arc::clone(slot.value()))
    }
}

impl<K: Eq + Hash + Clone> Default for PerKeyStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> WindowStore<K> for PerKeyStore<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn decide(&self, key: &K, clock: &dyn Clock, rule: &WindowRule) -> Decision {
        loop {
            let slot = self.slot(key);
            let mut guard = slot.lock();
            if *guard == SlotState::Retired {
                // Evicted between lookup and lock; the table no longer holds this slot.
                trace!("Window slot retired during lookup, retrying");
                continue;
            }

            let now = clock.now();
            if *guard == SlotState::Vacant {
                *guard = SlotState::Live(WindowState::new(now));
            }
            if let SlotState::Live(state) = &mut *guard {
                return rule.apply(state, now);
            }
        }
    }

    fn count(&self, key: &K) -> Option<u64> {
        let slot = self.get(key)?;
        let state = *slot.lock();
        match state {
            SlotState::Live(state) => Some(state.count()),
            SlotState::Vacant | SlotState::Retired => None,
        }
    }

    fn len(&self) -> usize {
        self.windows.len()
    }

    fn clear(&self) {
        self.windows.retain(|_, slot| {
            *slot.lock() = SlotState::Retired;
            false
        });
    }

    fn evict_started_before(&self, now: Instant, idle: Duration) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, slot| {
            let mut guard = slot.lock();
            let keep = match *guard {
                SlotState::Live(state) => !is_idle(&state, now, idle),
                SlotState::Vacant => true,
                SlotState::Retired => false,
            };
            if !keep {
                *guard = SlotState::Retired;
                removed += 1;
            }
            keep
        });
        removed
    }
}
