//! Coalesces concurrent lookups into one upstream call.
//!
//! Every [`RequestBatcher::request`] joins the current wait list and restarts
//! the batcher's single debounce timer. When the window settles the wait
//! list is snapshotted and cleared, the fetch runs once with the union of
//! identifiers, and every caller in the snapshot receives the same result.
//! Requests arriving after the snapshot start a fresh wait list.
//!
//! A failed fetch resolves every caller with `None`; errors never reach the
//! callers.

use std::collections::HashSet;
use std::hash::Hash;
use std::mem;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::infrastructure::timer::{Scheduler, TimerHandle};
use crate::port::BatchFetch;

/// Debounce window for batch fetches.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(50);

type Waiter<O> = oneshot::Sender<Option<Arc<O>>>;

struct WaitList<I, A, O> {
    ids: Vec<I>,
    seen: HashSet<I>,
    args: Option<A>,
    waiters: Vec<Waiter<O>>,
    timer: Option<TimerHandle>,
    generation: u64,
}

impl<I, A, O> WaitList<I, A, O> {
    fn empty() -> Self {
        Self {
            ids: Vec::new(),
            seen: HashSet::new(),
            args: None,
            waiters: Vec::new(),
            timer: None,
            generation: 0,
        }
    }
}

struct BatcherInner<I, A, F>
where
    F: BatchFetch<I, A>,
    I: Send + 'static,
    A: Send + 'static,
{
    name: &'static str,
    fetcher: Arc<F>,
    scheduler: Arc<dyn Scheduler>,
    window: Duration,
    state: Mutex<WaitList<I, A, F::Output>>,
}

/// Result of one [`RequestBatcher::submit`], resolved when its batch settles.
pub struct BatchTicket<O> {
    receiver: oneshot::Receiver<Option<Arc<O>>>,
}

impl<O> BatchTicket<O> {
    /// Wait for the batch. `None` means the batch failed or was abandoned.
    pub async fn wait(self) -> Option<Arc<O>> {
        self.receiver.await.ok().flatten()
    }
}

/// Debounced batch front for one [`BatchFetch`] operation.
pub struct RequestBatcher<I, A, F>
where
    F: BatchFetch<I, A>,
    I: Send + 'static,
    A: Send + 'static,
{
    inner: Arc<BatcherInner<I, A, F>>,
}

impl<I, A, F> Clone for RequestBatcher<I, A, F>
where
    F: BatchFetch<I, A>,
    I: Send + 'static,
    A: Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, A, F> RequestBatcher<I, A, F>
where
    F: BatchFetch<I, A> + 'static,
    I: Eq + Hash + Clone + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    pub fn new(
        name: &'static str,
        fetcher: Arc<F>,
        scheduler: Arc<dyn Scheduler>,
        window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                name,
                fetcher,
                scheduler,
                window,
                state: Mutex::new(WaitList::empty()),
            }),
        }
    }

    /// Request `id` and wait for the batch that carries it.
    pub async fn request(&self, id: I, args: A) -> Option<Arc<F::Output>> {
        self.submit(id, args).wait().await
    }

    /// Join the current wait list without waiting.
    ///
    /// `args` replaces the arguments of earlier requests in the same window.
    pub fn submit(&self, id: I, args: A) -> BatchTicket<F::Output> {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.inner.state.lock();

        if state.seen.insert(id.clone()) {
            state.ids.push(id);
        }
        state.args = Some(args);
        state.waiters.push(sender);

        state.generation += 1;
        let generation = state.generation;
        if let Some(previous) = state.timer.take() {
            previous.cancel();
        }

        let weak: Weak<BatcherInner<I, A, F>> = Arc::downgrade(&self.inner);
        state.timer = Some(self.inner.scheduler.schedule(
            self.inner.window,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.flush(generation);
                }
            }),
        ));

        trace!(
            batch = self.inner.name,
            ids = state.ids.len(),
            waiters = state.waiters.len(),
            "Queued batch request"
        );
        BatchTicket { receiver }
    }

    /// Callers waiting on the current window.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.inner.window
    }
}

impl<I, A, F> BatcherInner<I, A, F>
where
    F: BatchFetch<I, A> + 'static,
    I: Eq + Hash + Clone + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    fn flush(&self, generation: u64) {
        let (ids, args, waiters) = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.timer = None;
            state.seen.clear();
            let Some(args) = state.args.take() else {
                return;
            };
            (mem::take(&mut state.ids), args, mem::take(&mut state.waiters))
        };

        debug!(
            batch = self.name,
            ids = ids.len(),
            waiters = waiters.len(),
            "Flushing batch"
        );

        let name = self.name;
        let fetcher = Arc::clone(&self.fetcher);
        let task = async move {
            let result = match fetcher.fetch(ids, args).await {
                Ok(output) => Some(Arc::new(output)),
                Err(error) => {
                    warn!(batch = name, error = %error, "Batch fetch failed");
                    None
                }
            };
            for waiter in waiters {
                // Caller stopped waiting.
                let _ = waiter.send(result.clone());
            }
        };

        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(task);
            }
            Err(_) => {
                // Dropping the task drops the senders, so callers see `None`.
                warn!(batch = name, "Batch flushed outside a runtime, abandoning");
            }
        }
    }
}

impl<I, A, F> Drop for BatcherInner<I, A, F>
where
    F: BatchFetch<I, A>,
    I: Send + 'static,
    A: Send + 'static,
{
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::testkit::timer::ManualScheduler;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingFetcher {
        calls: Mutex<Vec<(Vec<String>, String)>>,
        fail: bool,
    }

    impl RecordingFetcher {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(Vec<String>, String)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl BatchFetch<String, String> for RecordingFetcher {
        type Output = Vec<String>;

        async fn fetch(&self, ids: Vec<String>, args: String) -> Result<Vec<String>> {
            self.calls.lock().push((ids.clone(), args));
            if self.fail {
                return Err(Error::Connection("upstream unavailable".into()));
            }
            Ok(ids)
        }
    }

    fn batcher(
        fetcher: &Arc<RecordingFetcher>,
        scheduler: &Arc<ManualScheduler>,
    ) -> RequestBatcher<String, String, RecordingFetcher> {
        RequestBatcher::new(
            "test",
            Arc::clone(fetcher),
            scheduler.clone(),
            DEFAULT_BATCH_WINDOW,
        )
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let scheduler = Arc::new(ManualScheduler::new());
        let fetcher = Arc::new(RecordingFetcher::default());
        let batcher = batcher(&fetcher, &scheduler);

        let first = batcher.submit("c1".into(), "polygon".into());
        let second = batcher.submit("c2".into(), "polygon".into());
        let third = batcher.submit("c1".into(), "polygon".into());
        assert_eq!(batcher.pending(), 3);

        scheduler.advance(DEFAULT_BATCH_WINDOW);
        let (a, b, c) = tokio::join!(first.wait(), second.wait(), third.wait());

        let a = a.unwrap();
        assert_eq!(*a, vec!["c1".to_string(), "c2".to_string()]);
        assert!(Arc::ptr_eq(&a, &b.unwrap()));
        assert!(Arc::ptr_eq(&a, &c.unwrap()));
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(batcher.pending(), 0);
    }

    #[tokio::test]
    async fn each_request_restarts_the_window() {
        let scheduler = Arc::new(ManualScheduler::new());
        let fetcher = Arc::new(RecordingFetcher::default());
        let batcher = batcher(&fetcher, &scheduler);

        let first = batcher.submit("c1".into(), "a".into());
        scheduler.advance(Duration::from_millis(40));
        let second = batcher.submit("c2".into(), "a".into());
        scheduler.advance(Duration::from_millis(40));
        assert_eq!(batcher.pending(), 2);

        scheduler.advance(Duration::from_millis(10));
        let (a, b) = tokio::join!(first.wait(), second.wait());
        assert!(a.is_some() && b.is_some());
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn requests_after_the_snapshot_start_a_new_batch() {
        let scheduler = Arc::new(ManualScheduler::new());
        let fetcher = Arc::new(RecordingFetcher::default());
        let batcher = batcher(&fetcher, &scheduler);

        let early = batcher.submit("c1".into(), "a".into());
        scheduler.advance(DEFAULT_BATCH_WINDOW);
        // The first fetch is spawned but has not run yet.
        let late = batcher.submit("c2".into(), "a".into());
        scheduler.advance(DEFAULT_BATCH_WINDOW);

        let (early, late) = tokio::join!(early.wait(), late.wait());
        assert_eq!(*early.unwrap(), vec!["c1".to_string()]);
        assert_eq!(*late.unwrap(), vec!["c2".to_string()]);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn latest_args_win() {
        let scheduler = Arc::new(ManualScheduler::new());
        let fetcher = Arc::new(RecordingFetcher::default());
        let batcher = batcher(&fetcher, &scheduler);

        let first = batcher.submit("c1".into(), "old".into());
        let second = batcher.submit("c2".into(), "new".into());
        scheduler.advance(DEFAULT_BATCH_WINDOW);
        let _ = tokio::join!(first.wait(), second.wait());

        assert_eq!(fetcher.calls()[0].1, "new");
    }

    #[tokio::test]
    async fn failed_fetch_resolves_every_caller_with_none() {
        let scheduler = Arc::new(ManualScheduler::new());
        let fetcher = Arc::new(RecordingFetcher::failing());
        let batcher = batcher(&fetcher, &scheduler);

        let first = batcher.submit("c1".into(), "a".into());
        let second = batcher.submit("c2".into(), "a".into());
        scheduler.advance(DEFAULT_BATCH_WINDOW);

        let (a, b) = tokio::join!(first.wait(), second.wait());
        assert!(a.is_none());
        assert!(b.is_none());
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn dropping_the_batcher_abandons_waiters() {
        let scheduler = Arc::new(ManualScheduler::new());
        let fetcher = Arc::new(RecordingFetcher::default());
        let batcher = batcher(&fetcher, &scheduler);

        let ticket = batcher.submit("c1".into(), "a".into());
        drop(batcher);
        assert_eq!(scheduler.advance(DEFAULT_BATCH_WINDOW), 0);

        assert!(ticket.wait().await.is_none());
        assert!(fetcher.calls().is_empty());
    }
}
