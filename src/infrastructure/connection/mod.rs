//! Lifecycle of the single shared connection of one feed.
//!
//! ```text
//! Disconnected -> Connecting -> Ready -> (Closed | Errored) -> Connecting ...
//! ```
//!
//! The connection task starts lazily on the first
//! [`ConnectionManager::subscribe_to_updates`]. Failed connects and lost
//! connections are retried after a fixed [`RECONNECT_DELAY`], forever. A close
//! with [`CONTEXT_CHANGED_CLOSE_CODE`], from either side, ends the manager in
//! `Disconnected`; the caller opens a new manager for the new context.
//!
//! Whenever a `Ready` session ends, the feed's [`SubscriptionMultiplexer`] is
//! reset: interest is assumed lost and consumers that are still interested
//! subscribe again. Commands computed for the old connection carry a stale
//! epoch and are dropped by the connection task.
//!
//! The manager holds the only strong sender of the control channel. Dropping
//! it closes the channel, and the connection task sends a normal close frame
//! and stops. [`ConnectionManager::shutdown`] does the same and waits for the
//! task to finish.

mod session;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::adapter::protocol::FeedKind;
use crate::error::{Error, Result};
use crate::infrastructure::subscription::SubscriptionMultiplexer;
use crate::infrastructure::timer::Scheduler;
use crate::port::{ControlSink, FeedRouter, FeedTransport, SubscriptionCommand};

use session::Session;

/// Fixed delay before every reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Close code meaning "venue or chain changed, do not reconnect".
pub const CONTEXT_CHANGED_CLOSE_CODE: u16 = 4000;

/// Close code for an ordinary client-side close.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// Connection state of one feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Closed,
    Errored,
}

/// Frame for the connection task, in send order.
#[derive(Debug)]
enum ControlFrame {
    Subscription(SubscriptionCommand),
    Close { code: u16, reason: String },
}

/// Multiplexer output, pushed onto the connection task's channel.
///
/// Holds a weak sender so the channel closes when the manager is dropped.
struct ChannelSink {
    feed: &'static str,
    frames: mpsc::WeakUnboundedSender<ControlFrame>,
}

impl ControlSink for ChannelSink {
    fn send(&self, command: SubscriptionCommand) {
        let delivered = self
            .frames
            .upgrade()
            .is_some_and(|frames| frames.send(ControlFrame::Subscription(command)).is_ok());
        if !delivered {
            trace!(feed = self.feed, "Connection task gone, dropping subscription command");
        }
    }
}

struct PendingStart {
    transport: Box<dyn FeedTransport>,
    router: Arc<dyn FeedRouter>,
    control: mpsc::UnboundedReceiver<ControlFrame>,
}

/// Owns one feed connection and its subscription multiplexer.
pub struct ConnectionManager {
    kind: FeedKind,
    multiplexer: SubscriptionMultiplexer,
    frames: mpsc::UnboundedSender<ControlFrame>,
    state: Arc<watch::Sender<ConnectionState>>,
    pending: Mutex<Option<PendingStart>>,
    task: Mutex<Option<JoinHandle<()>>>,
    stopped: Arc<AtomicBool>,
}

impl ConnectionManager {
    /// Build a manager. Nothing connects until the first subscription.
    pub fn new(
        kind: FeedKind,
        transport: impl FeedTransport + 'static,
        router: Arc<dyn FeedRouter>,
        scheduler: Arc<dyn Scheduler>,
        subscription_window: Duration,
    ) -> Self {
        let (frames, control) = mpsc::unbounded_channel();
        let sink = Arc::new(ChannelSink {
            feed: kind.name(),
            frames: frames.downgrade(),
        });
        let multiplexer =
            SubscriptionMultiplexer::new(kind.name(), scheduler, sink, subscription_window);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            kind,
            multiplexer,
            frames,
            state: Arc::new(state),
            pending: Mutex::new(Some(PendingStart {
                transport: Box::new(transport),
                router,
                control,
            })),
            task: Mutex::new(None),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the connection task if it has not run yet.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_none() {
            return Ok(());
        }
        let runtime = Handle::try_current()
            .map_err(|e| Error::Connection(format!("no runtime for feed connection: {e}")))?;
        let Some(start) = pending.take() else {
            return Ok(());
        };

        debug!(feed = self.kind.name(), "Starting feed connection");
        let session = Session {
            kind: self.kind,
            transport: start.transport,
            router: start.router,
            control: start.control,
            state: Arc::clone(&self.state),
            multiplexer: self.multiplexer.clone(),
            backlog: VecDeque::new(),
            stopped: Arc::clone(&self.stopped),
        };
        *self.task.lock() = Some(runtime.spawn(session.run()));
        Ok(())
    }

    /// Register interest in `ids`, starting the connection if needed.
    ///
    /// Ignored once the manager has stopped; open a new manager instead.
    pub fn subscribe_to_updates<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.is_stopped() {
            warn!(feed = self.kind.name(), "Feed connection stopped, ignoring subscription");
            return;
        }
        if let Err(error) = self.start() {
            warn!(feed = self.kind.name(), error = %error, "Feed connection not started");
        }
        self.multiplexer.subscribe(ids);
    }

    /// Withdraw interest in `ids`.
    pub fn unsubscribe_to_updates<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.is_stopped() {
            trace!(feed = self.kind.name(), "Feed connection stopped, ignoring unsubscription");
            return;
        }
        self.multiplexer.unsubscribe(ids);
    }

    /// Whether the manager closed for good and accepts no more interest.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_socket_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Tear the connection down for a venue or chain switch.
    ///
    /// The manager does not reconnect afterwards.
    pub fn switch_context(&self) {
        self.close_with(CONTEXT_CHANGED_CLOSE_CODE, "context changed");
    }

    /// Close the connection without reconnecting.
    pub fn close(&self) {
        self.close_with(NORMAL_CLOSE_CODE, "client closed");
    }

    /// Close the connection and wait for the connection task to finish.
    pub async fn shutdown(&self) {
        self.close();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                warn!(feed = self.kind.name(), error = %error, "Connection task ended abnormally");
            }
        }
    }

    fn close_with(&self, code: u16, reason: &str) {
        if self.pending.lock().take().is_some() {
            // Never started: nothing to close, and nothing may start later.
            self.stopped.store(true, Ordering::SeqCst);
            self.multiplexer.reset();
            return;
        }
        let frame = ControlFrame::Close {
            code,
            reason: reason.to_string(),
        };
        if self.frames.send(frame).is_err() {
            trace!(feed = self.kind.name(), "Connection task already stopped");
        }
    }

    #[must_use]
    pub const fn kind(&self) -> FeedKind {
        self.kind
    }

    #[must_use]
    pub const fn multiplexer(&self) -> &SubscriptionMultiplexer {
        &self.multiplexer
    }
}
