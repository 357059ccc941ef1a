//! Per-key cancellable timers.
//!
//! Each key owns at most one pending timer. Scheduling again for the same
//! key cancels the previous timer and restarts the delay, so a burst of
//! triggers collapses into a single firing once the burst goes quiet.
//! Timers for different keys are fully independent, and a fired timer
//! removes its own map entry so the map only ever holds live timers.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::sync::mutex_lock;

struct TimerEntry {
    /// Distinguishes this timer from a later one scheduled under the same
    /// key, so a finished task only removes the entry it owns.
    generation: u64,
    handle: JoinHandle<()>,
}

struct TimerMap<K> {
    next_generation: u64,
    timers: HashMap<K, TimerEntry>,
}

/// A map of debounced actions keyed by `K`.
pub struct DebounceMap<K> {
    inner: Arc<Mutex<TimerMap<K>>>,
}

impl<K> DebounceMap<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        DebounceMap {
            inner: Arc::new(Mutex::new(TimerMap {
                next_generation: 0,
                timers: HashMap::new(),
            })),
        }
    }

    /// Run `action` after `delay`, replacing any pending timer for the same
    /// key. Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, key: K, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut map = mutex_lock(&self.inner);
        let generation = map.next_generation;
        map.next_generation += 1;

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;

            let mut map = mutex_lock(&inner);
            let owned = map
                .timers
                .get(&task_key)
                .is_some_and(|entry| entry.generation == generation);
            if owned {
                map.timers.remove(&task_key);
            }
        });

        if let Some(previous) = map.timers.insert(key, TimerEntry { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancel the pending timer for a key, if any. The action does not run.
    pub fn cancel(&self, key: &K) {
        if let Some(entry) = mutex_lock(&self.inner).timers.remove(key) {
            entry.handle.abort();
        }
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&self) {
        for (_, entry) in mutex_lock(&self.inner).timers.drain() {
            entry.handle.abort();
        }
    }

    /// Whether a timer for this key is still pending (or its action still
    /// running).
    pub fn is_pending(&self, key: &K) -> bool {
        mutex_lock(&self.inner)
            .timers
            .get(key)
            .is_some_and(|entry| !entry.handle.is_finished())
    }

    /// Number of timers currently tracked.
    pub fn len(&self) -> usize {
        mutex_lock(&self.inner).timers.len()
    }

    pub fn is_empty(&self) -> bool {
        mutex_lock(&self.inner).timers.is_empty()
    }
}

impl<K> Default for DebounceMap<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for DebounceMap<K> {
    fn drop(&mut self) {
        for (_, entry) in mutex_lock(&self.inner).timers.drain() {
            entry.handle.abort();
        }
    }
}
