//! Per-key debounced delivery.
//!
//! [`DebouncedDispatcher`] collapses bursts: every `schedule` for a key
//! restarts that key's quiet period and replaces the pending payload, and only
//! the payload present when the quiet period elapses is delivered. Bursts on
//! different keys are independent and carry no relative ordering.
//!
//! [`watcher::KeyedWatcher`] builds a subscriber registry on top of it.

pub mod watcher;

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::infrastructure::timer::{Scheduler, TimerHandle};

pub use watcher::{KeyedWatcher, WatchSubscription};

/// Quiet period used by feed watchers.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(200);

type Deliver<K, V> = Box<dyn Fn(&K, V) + Send + Sync>;

struct PendingEntry<V> {
    generation: u64,
    payload: V,
    timer: TimerHandle,
}

struct PendingState<K, V> {
    entries: HashMap<K, PendingEntry<V>>,
    generation: u64,
}

struct DispatcherInner<K, V> {
    quiet_period: Duration,
    scheduler: Arc<dyn Scheduler>,
    deliver: Deliver<K, V>,
    state: Mutex<PendingState<K, V>>,
}

/// Debounces payloads per key and hands the survivor to a delivery callback.
pub struct DebouncedDispatcher<K, V> {
    inner: Arc<DispatcherInner<K, V>>,
}

impl<K, V> Clone for DebouncedDispatcher<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> DebouncedDispatcher<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        quiet_period: Duration,
        deliver: impl Fn(&K, V) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                quiet_period,
                scheduler,
                deliver: Box::new(deliver),
                state: Mutex::new(PendingState {
                    entries: HashMap::new(),
                    generation: 0,
                }),
            }),
        }
    }

    /// Replace the pending payload for `key` and restart its quiet period.
    pub fn schedule(&self, key: K, payload: V) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        let generation = state.generation;

        if let Some(previous) = state.entries.remove(&key) {
            previous.timer.cancel();
            trace!(?key, "Superseded pending dispatch");
        }

        let weak: Weak<DispatcherInner<K, V>> = Arc::downgrade(&self.inner);
        let timer_key = key.clone();
        let timer = self.inner.scheduler.schedule(
            self.inner.quiet_period,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.fire(timer_key, generation);
                }
            }),
        );

        state.entries.insert(
            key,
            PendingEntry {
                generation,
                payload,
                timer,
            },
        );
    }

    /// Number of keys with a delivery pending.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Drop every pending delivery.
    pub fn cancel_all(&self) {
        let mut state = self.inner.state.lock();
        for (_, entry) in state.entries.drain() {
            entry.timer.cancel();
        }
    }

    #[must_use]
    pub fn quiet_period(&self) -> Duration {
        self.inner.quiet_period
    }
}

impl<K, V> DispatcherInner<K, V>
where
    K: Eq + Hash + Debug,
{
    fn fire(&self, key: K, generation: u64) {
        let payload = {
            let mut state = self.state.lock();
            match state.entries.get(&key) {
                Some(entry) if entry.generation == generation => {
                    state.entries.remove(&key).map(|entry| entry.payload)
                }
                _ => None,
            }
        };

        // Lock released: delivery may schedule again.
        if let Some(payload) = payload {
            trace!(?key, "Delivering settled dispatch");
            (self.deliver)(&key, payload);
        }
    }
}

impl<K, V> Drop for DispatcherInner<K, V> {
    fn drop(&mut self) {
        for entry in self.state.get_mut().entries.values() {
            entry.timer.cancel();
        }
    }
}
