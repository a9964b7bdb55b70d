//! Recording implementations of the control and routing ports.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::port::{ControlSink, FeedRouter, RouteSummary, SubscriptionCommand};

/// [`ControlSink`] that keeps every command it receives.
#[derive(Default)]
pub struct RecordingSink {
    commands: Mutex<Vec<SubscriptionCommand>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<SubscriptionCommand> {
        self.commands.lock().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }
}

impl ControlSink for RecordingSink {
    fn send(&self, command: SubscriptionCommand) {
        self.commands.lock().push(command);
    }
}

/// [`FeedRouter`] that keeps every frame it is asked to route.
#[derive(Default)]
pub struct RecordingRouter {
    frames: Mutex<Vec<String>>,
    reject: AtomicBool,
}

impl RecordingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `route` calls fail as if the frame were not JSON.
    pub fn reject_frames(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }
}

impl FeedRouter for RecordingRouter {
    fn route(&self, text: &str) -> Result<RouteSummary> {
        self.frames.lock().push(text.to_string());
        if self.reject.load(Ordering::SeqCst) {
            return Err(Error::Parse("rejected by test router".into()));
        }
        Ok(RouteSummary {
            records: 1,
            dispatched: 1,
            skipped: 0,
        })
    }
}
