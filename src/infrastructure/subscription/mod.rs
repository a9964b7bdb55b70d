//! Reference-counted subscription multiplexing over one feed connection.
//!
//! Many consumers call [`SubscriptionMultiplexer::subscribe`] and
//! [`SubscriptionMultiplexer::unsubscribe`] redundantly. Calls are netted
//! per identifier over a debounce window and applied to a [`WeightTable`];
//! only identifiers crossing zero reach the upstream [`ControlSink`]:
//!
//! - an identifier with at least one interested consumer is never
//!   unsubscribed upstream;
//! - an identifier already subscribed is never subscribed again.

mod weights;

pub use weights::{SubscriptionDelta, WeightTable};

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::infrastructure::timer::{Scheduler, TimerHandle};
use crate::port::{ControlSink, SubscriptionAction, SubscriptionCommand};

/// Debounce window for subscription changes.
pub const DEFAULT_SUBSCRIPTION_WINDOW: Duration = Duration::from_millis(100);

/// Signed deltas accumulated in one window, in first-seen order.
#[derive(Debug, Default)]
struct PendingDeltas {
    order: Vec<String>,
    deltas: HashMap<String, i64>,
}

impl PendingDeltas {
    fn add(&mut self, id: String, delta: i64) {
        match self.deltas.get_mut(&id) {
            Some(total) => *total += delta,
            None => {
                self.deltas.insert(id.clone(), delta);
                self.order.push(id);
            }
        }
    }

    fn drain(&mut self) -> Vec<(String, i64)> {
        let mut deltas = std::mem::take(&mut self.deltas);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|id| deltas.remove(&id).map(|delta| (id, delta)))
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.deltas.clear();
    }
}

struct MultiplexerState {
    pending: PendingDeltas,
    weights: WeightTable,
    timer: Option<TimerHandle>,
    generation: u64,
    epoch: u64,
}

struct MultiplexerInner {
    feed: &'static str,
    window: Duration,
    scheduler: Arc<dyn Scheduler>,
    upstream: Arc<dyn ControlSink>,
    state: Mutex<MultiplexerState>,
}

/// Nets subscription interest for one feed.
#[derive(Clone)]
pub struct SubscriptionMultiplexer {
    inner: Arc<MultiplexerInner>,
}

impl SubscriptionMultiplexer {
    pub fn new(
        feed: &'static str,
        scheduler: Arc<dyn Scheduler>,
        upstream: Arc<dyn ControlSink>,
        window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(MultiplexerInner {
                feed,
                window,
                scheduler,
                upstream,
                state: Mutex::new(MultiplexerState {
                    pending: PendingDeltas::default(),
                    weights: WeightTable::new(),
                    timer: None,
                    generation: 0,
                    epoch: 0,
                }),
            }),
        }
    }

    /// Register one unit of interest in each of `ids`.
    pub fn subscribe<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.adjust(ids, 1);
    }

    /// Withdraw one unit of interest from each of `ids`.
    pub fn unsubscribe<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.adjust(ids, -1);
    }

    fn adjust<I, S>(&self, ids: I, delta: i64)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.inner.state.lock();
        let before = state.pending.order.len();
        let mut touched = 0usize;
        for id in ids {
            state.pending.add(id.into(), delta);
            touched += 1;
        }
        if touched == 0 {
            return;
        }

        trace!(
            feed = self.inner.feed,
            touched,
            new_ids = state.pending.order.len() - before,
            delta,
            "Queued subscription change"
        );

        state.generation += 1;
        let generation = state.generation;
        if let Some(previous) = state.timer.take() {
            previous.cancel();
        }
        let weak: Weak<MultiplexerInner> = Arc::downgrade(&self.inner);
        state.timer = Some(self.inner.scheduler.schedule(
            self.inner.window,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.flush(generation);
                }
            }),
        ));
    }

    /// Current settled weight of `id`.
    #[must_use]
    pub fn weight(&self, id: &str) -> u32 {
        self.inner.state.lock().weights.weight(id)
    }

    /// Identifiers currently subscribed upstream.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.inner.state.lock().weights.len()
    }

    /// Whether changes are waiting for the window to settle.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.inner.state.lock().pending.is_empty()
    }

    /// Connection generation stamped on outgoing commands.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.state.lock().epoch
    }

    /// Forget all interest after the connection is lost.
    ///
    /// Clears weights and pending deltas, cancels the window and starts a new
    /// epoch. Returns the new epoch.
    pub fn reset(&self) -> u64 {
        let mut state = self.inner.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        let dropped = state.weights.len();
        state.pending.clear();
        state.weights.clear();
        state.generation += 1;
        state.epoch += 1;

        debug!(
            feed = self.inner.feed,
            dropped,
            epoch = state.epoch,
            "Subscription weights reset"
        );
        state.epoch
    }
}

impl MultiplexerInner {
    fn flush(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        state.timer = None;

        let deltas = state.pending.drain();
        let crossed = state.weights.apply(deltas);
        if crossed.is_empty() {
            trace!(feed = self.feed, "Subscription window settled with no change");
            return;
        }

        debug!(
            feed = self.feed,
            subscribe = crossed.subscribe.len(),
            unsubscribe = crossed.unsubscribe.len(),
            tracked = state.weights.len(),
            epoch = state.epoch,
            "Subscription window settled"
        );

        // The sink is a non-blocking push, so sending under the lock keeps
        // commands ordered with respect to reset().
        let epoch = state.epoch;
        for (action, ids) in [
            (SubscriptionAction::Subscribe, crossed.subscribe),
            (SubscriptionAction::Unsubscribe, crossed.unsubscribe),
        ] {
            if !ids.is_empty() {
                self.upstream.send(SubscriptionCommand { action, ids, epoch });
            }
        }
    }
}

impl Drop for MultiplexerInner {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.cancel();
        }
    }
}
