//! Debounce and throttle primitives. Both take the current instant as an
//! argument instead of reading a clock, so callers and tests control time.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Coalesces bursts of values per key; a value becomes due once its key has
/// been quiet for `delay`. A newer value for the same key supersedes the
/// pending one and restarts the wait.
#[derive(Debug)]
pub struct Debouncer<K, V> {
    delay: Duration,
    pending: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash + Clone, V> Debouncer<K, V> {
    pub fn new(delay: Duration) -> Self {
        Debouncer {
            delay,
            pending: HashMap::new(),
        }
    }

    /// Replace the pending value for `key`
    pub fn push(&mut self, key: K, value: V, now: Instant) {
        self.pending.insert(key, (now + self.delay, value));
    }

    /// Combine a new arrival with the pending value (if any) and restart the wait
    pub fn upsert(&mut self, key: K, now: Instant, f: impl FnOnce(Option<V>) -> V) {
        let prior = self.pending.remove(&key).map(|(_, v)| v);
        self.pending.insert(key, (now + self.delay, f(prior)));
    }

    /// Take every value whose quiet period has elapsed
    pub fn drain_due(&mut self, now: Instant) -> Vec<(K, V)> {
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        due.into_iter()
            .filter_map(|k| self.pending.remove(&k).map(|(_, v)| (k, v)))
            .collect()
    }

    /// Take one key's value immediately, whether due or not
    pub fn flush(&mut self, key: &K) -> Option<V> {
        self.pending.remove(key).map(|(_, v)| v)
    }

    /// Take everything immediately
    pub fn flush_all(&mut self) -> Vec<(K, V)> {
        self.pending.drain().map(|(k, (_, v))| (k, v)).collect()
    }

    /// Drop one key's pending value without delivering it
    pub fn cancel(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Move a pending value to a new key, keeping its deadline
    pub fn rekey(&mut self, from: &K, to: K) {
        if let Some(entry) = self.pending.remove(from) {
            self.pending.insert(to, entry);
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest deadline among pending values
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(d, _)| *d).min()
    }
}

/// Lets an action through at most once per `interval`.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last: None,
        }
    }

    /// True if the action may run now; records the run when it may
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
