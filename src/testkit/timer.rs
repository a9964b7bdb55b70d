//! Virtual-clock [`Scheduler`] for deterministic timing tests.
//!
//! Nothing fires on its own: tests move the clock with
//! [`ManualScheduler::advance`], which runs every due timer in deadline
//! order (ties in scheduling order). Tasks run without the scheduler lock
//! held, so a firing task may schedule further timers; those fire in the
//! same `advance` call when they fall inside the advanced window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::infrastructure::timer::{Scheduler, TimerHandle, TimerTask};

struct PendingTimer {
    due: Duration,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    task: TimerTask,
}

#[derive(Default)]
struct ClockState {
    now: Duration,
    seq: u64,
    timers: Vec<PendingTimer>,
}

/// Scheduler whose clock only moves when told to.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ClockState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since creation on the virtual clock.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Timers scheduled and neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .timers
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Move the clock forward by `by`, firing due timers. Returns how many fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut fired = 0;

        while let Some(timer) = self.next_due(target) {
            if !timer.cancelled.load(Ordering::SeqCst) {
                (timer.task)();
                fired += 1;
            }
        }

        self.state.lock().now = target;
        fired
    }

    fn next_due(&self, target: Duration) -> Option<PendingTimer> {
        let mut state = self.state.lock();
        state.timers.retain(|t| !t.cancelled.load(Ordering::SeqCst));

        let index = state
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= target)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(i, _)| i)?;

        let timer = state.timers.swap_remove(index);
        state.now = state.now.max(timer.due);
        Some(timer)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = self.state.lock();
        state.seq += 1;
        let timer = PendingTimer {
            due: state.now + delay,
            seq: state.seq,
            cancelled: Arc::clone(&cancelled),
            task,
        };
        state.timers.push(timer);
        TimerHandle::new(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(counter: &Arc<AtomicUsize>) -> TimerTask {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn fires_only_when_due() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let _handle = scheduler.schedule(Duration::from_millis(100), counting_task(&fired));
        assert_eq!(scheduler.advance(Duration::from_millis(99)), 0);
        assert_eq!(scheduler.advance(Duration::from_millis(1)), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.now(), Duration::from_millis(100));
    }

    #[test]
    fn cancelled_timers_are_skipped() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.schedule(Duration::from_millis(10), counting_task(&fired));
        assert_eq!(scheduler.pending(), 1);
        handle.cancel();
        assert_eq!(scheduler.pending(), 0);

        assert_eq!(scheduler.advance(Duration::from_secs(1)), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fires_in_deadline_order() {
        let scheduler = Arc::new(ManualScheduler::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        for (label, delay) in [("late", 30), ("early", 10), ("tie-a", 20), ("tie-b", 20)] {
            let order = Arc::clone(&order);
            let _ = scheduler.schedule(
                Duration::from_millis(delay),
                Box::new(move || order.lock().push(label)),
            );
        }
        scheduler.advance(Duration::from_millis(50));

        assert_eq!(*order.lock(), vec!["early", "tie-a", "tie-b", "late"]);
    }

    #[test]
    fn tasks_may_schedule_follow_up_timers() {
        let scheduler = Arc::new(ManualScheduler::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = Arc::clone(&scheduler);
        let inner_fired = Arc::clone(&fired);
        let _ = scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                let _ = inner_scheduler
                    .schedule(Duration::from_millis(10), counting_task(&inner_fired));
            }),
        );

        assert_eq!(scheduler.advance(Duration::from_millis(25)), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
