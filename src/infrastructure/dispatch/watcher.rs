//! Keyed subscriber registry with debounced fan-out.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use super::DebouncedDispatcher;
use crate::infrastructure::timer::Scheduler;

type Callback<V> = Arc<dyn Fn(&V) + Send + Sync>;

struct Subscriber<V> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback<V>,
}

struct Registry<K, V> {
    subscribers: Mutex<HashMap<K, Vec<Subscriber<V>>>>,
    next_id: AtomicU64,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Debug,
{
    fn notify(&self, key: &K, payload: &V) {
        let round: Vec<(Arc<AtomicBool>, Callback<V>)> = {
            let subscribers = self.subscribers.lock();
            match subscribers.get(key) {
                Some(list) => list
                    .iter()
                    .map(|s| (Arc::clone(&s.active), Arc::clone(&s.callback)))
                    .collect(),
                None => Vec::new(),
            }
        };

        trace!(?key, subscribers = round.len(), "Notifying watchers");
        for (active, callback) in round {
            // Unsubscribed earlier in this same round.
            if active.load(Ordering::SeqCst) {
                callback(payload);
            }
        }
    }

    fn remove(&self, key: &K, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if let Some(list) = subscribers.get_mut(key) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                subscribers.remove(key);
            }
        }
    }
}

/// Registry of callbacks per key, fed through a [`DebouncedDispatcher`].
///
/// Subscribers of a key are called once per settled dispatch, in
/// subscription order. Callbacks run without any registry lock held, so
/// they may subscribe or unsubscribe freely.
pub struct KeyedWatcher<K, V> {
    registry: Arc<Registry<K, V>>,
    dispatcher: DebouncedDispatcher<K, V>,
}

impl<K, V> Clone for KeyedWatcher<K, V> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<K, V> KeyedWatcher<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(scheduler: Arc<dyn Scheduler>, quiet_period: Duration) -> Self {
        let registry = Arc::new(Registry {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        });
        let target = Arc::clone(&registry);
        let dispatcher = DebouncedDispatcher::new(scheduler, quiet_period, move |key: &K, payload: V| {
            target.notify(key, &payload);
        });
        Self {
            registry,
            dispatcher,
        }
    }

    /// Register `callback` for `key`.
    ///
    /// The callback stays registered until the returned subscription is
    /// unsubscribed or dropped.
    pub fn subscribe(
        &self,
        key: K,
        callback: impl Fn(&V) + Send + Sync + 'static,
    ) -> WatchSubscription<K, V> {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        self.registry
            .subscribers
            .lock()
            .entry(key.clone())
            .or_default()
            .push(Subscriber {
                id,
                active: Arc::clone(&active),
                callback: Arc::new(callback),
            });

        WatchSubscription {
            key,
            id,
            active,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Queue `payload` for the subscribers of `key`.
    pub fn dispatch(&self, key: K, payload: V) {
        self.dispatcher.schedule(key, payload);
    }

    #[must_use]
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.registry
            .subscribers
            .lock()
            .get(key)
            .map_or(0, Vec::len)
    }

    /// Number of keys with at least one subscriber.
    #[must_use]
    pub fn watched_keys(&self) -> usize {
        self.registry.subscribers.lock().len()
    }

    /// Drop dispatches that have not settled yet.
    pub fn cancel_pending(&self) {
        self.dispatcher.cancel_all();
    }
}

/// Live registration in a [`KeyedWatcher`].
///
/// Unsubscribes on drop.
#[must_use = "dropping a subscription unsubscribes it"]
pub struct WatchSubscription<K, V>
where
    K: Eq + Hash + Debug,
{
    key: K,
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<Registry<K, V>>,
}

impl<K, V> WatchSubscription<K, V>
where
    K: Eq + Hash + Debug,
{
    /// Stop receiving payloads. Safe to call repeatedly, and after the
    /// watcher itself is gone.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.key, self.id);
        }
    }

    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl<K, V> Drop for WatchSubscription<K, V>
where
    K: Eq + Hash + Debug,
{
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::dispatch::DEFAULT_QUIET_PERIOD;
    use crate::testkit::timer::ManualScheduler;

    const SETTLE: Duration = Duration::from_millis(250);

    fn watcher(scheduler: &Arc<ManualScheduler>) -> KeyedWatcher<String, u32> {
        KeyedWatcher::new(scheduler.clone(), DEFAULT_QUIET_PERIOD)
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&u32) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |name: &str| -> Box<dyn Fn(&u32) + Send + Sync> {
            let sink = Arc::clone(&sink);
            let name = name.to_string();
            Box::new(move |value: &u32| sink.lock().push(format!("{name}:{value}")))
        };
        (log, make)
    }

    #[test]
    fn every_subscriber_is_called_once_in_order() {
        let scheduler = Arc::new(ManualScheduler::new());
        let watcher = watcher(&scheduler);
        let (log, make) = recorder();

        let _a = watcher.subscribe("c1".to_string(), make("a"));
        let _b = watcher.subscribe("c1".to_string(), make("b"));
        let _other = watcher.subscribe("c2".to_string(), make("other"));

        watcher.dispatch("c1".to_string(), 1);
        watcher.dispatch("c1".to_string(), 2);
        watcher.dispatch("c1".to_string(), 3);
        scheduler.advance(SETTLE);

        assert_eq!(*log.lock(), vec!["a:3".to_string(), "b:3".to_string()]);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_removes_empty_keys() {
        let scheduler = Arc::new(ManualScheduler::new());
        let watcher = watcher(&scheduler);
        let (log, make) = recorder();

        let subscription = watcher.subscribe("c1".to_string(), make("a"));
        assert_eq!(watcher.subscriber_count(&"c1".to_string()), 1);

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert_eq!(watcher.subscriber_count(&"c1".to_string()), 0);
        assert_eq!(watcher.watched_keys(), 0);
        assert!(!subscription.is_active());

        watcher.dispatch("c1".to_string(), 1);
        scheduler.advance(SETTLE);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn drop_unsubscribes() {
        let scheduler = Arc::new(ManualScheduler::new());
        let watcher = watcher(&scheduler);
        let (log, make) = recorder();

        {
            let _subscription = watcher.subscribe("c1".to_string(), make("a"));
        }
        watcher.dispatch("c1".to_string(), 1);
        scheduler.advance(SETTLE);

        assert!(log.lock().is_empty());
        assert_eq!(watcher.watched_keys(), 0);
    }

    #[test]
    fn unsubscribe_during_notification_skips_the_rest_of_the_round() {
        let scheduler = Arc::new(ManualScheduler::new());
        let watcher = watcher(&scheduler);
        let (log, make) = recorder();

        let second: Arc<Mutex<Option<WatchSubscription<String, u32>>>> =
            Arc::new(Mutex::new(None));
        let handle = Arc::clone(&second);
        let first_log = Arc::clone(&log);
        let _first = watcher.subscribe("c1".to_string(), move |value: &u32| {
            first_log.lock().push(format!("first:{value}"));
            if let Some(subscription) = handle.lock().as_ref() {
                subscription.unsubscribe();
            }
        });
        *second.lock() = Some(watcher.subscribe("c1".to_string(), make("second")));
        let _third = watcher.subscribe("c1".to_string(), make("third"));

        watcher.dispatch("c1".to_string(), 7);
        scheduler.advance(SETTLE);

        assert_eq!(
            *log.lock(),
            vec!["first:7".to_string(), "third:7".to_string()]
        );
        assert_eq!(watcher.subscriber_count(&"c1".to_string()), 2);
    }

    #[test]
    fn unsubscribing_the_last_subscriber_mid_round_does_not_resurrect_the_key() {
        let scheduler = Arc::new(ManualScheduler::new());
        let watcher = watcher(&scheduler);

        let slot: Arc<Mutex<Option<WatchSubscription<String, u32>>>> = Arc::new(Mutex::new(None));
        let handle = Arc::clone(&slot);
        let subscription = watcher.subscribe("c1".to_string(), move |_value: &u32| {
            if let Some(own) = handle.lock().take() {
                own.unsubscribe();
            }
        });
        *slot.lock() = Some(subscription);

        watcher.dispatch("c1".to_string(), 1);
        scheduler.advance(SETTLE);

        assert_eq!(watcher.watched_keys(), 0);
    }

    #[test]
    fn settled_dispatch_without_subscribers_is_harmless() {
        let scheduler = Arc::new(ManualScheduler::new());
        let watcher = watcher(&scheduler);
        let (log, make) = recorder();

        let subscription = watcher.subscribe("c1".to_string(), make("a"));
        watcher.dispatch("c1".to_string(), 1);
        subscription.unsubscribe();
        scheduler.advance(SETTLE);

        assert!(log.lock().is_empty());
    }

    #[test]
    fn unsubscribe_after_watcher_dropped_is_safe() {
        let scheduler = Arc::new(ManualScheduler::new());
        let watcher = watcher(&scheduler);
        let (_log, make) = recorder();

        let subscription = watcher.subscribe("c1".to_string(), make("a"));
        drop(watcher);
        subscription.unsubscribe();
        assert!(!subscription.is_active());
    }
}
