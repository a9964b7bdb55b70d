//! Connection task: connect, serve, reconnect.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use super::{
    ConnectionState, ControlFrame, CONTEXT_CHANGED_CLOSE_CODE, NORMAL_CLOSE_CODE, RECONNECT_DELAY,
};
use crate::adapter::protocol::{ControlMessage, FeedKind};
use crate::error::{Error, Result};
use crate::infrastructure::subscription::SubscriptionMultiplexer;
use crate::port::{FeedRouter, FeedTransport, SubscriptionCommand, TransportEvent};

/// Why a `Ready` session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionEnd {
    /// Server or client closed with the context-changed code.
    ContextChanged,
    /// The client asked to close.
    ClientClosed,
    /// The owning manager is gone.
    Shutdown,
    /// The server closed the connection.
    Closed { code: Option<u16>, reason: String },
    /// The connection failed.
    Failed(String),
}

/// Whether to keep reconnecting after a wait.
enum AfterWait {
    Reconnect,
    Stop,
}

/// Outcome of one connection attempt.
enum Attempt {
    Connected,
    Failed(Error),
    /// A close arrived, or the manager went away, before the connect finished.
    Abandoned,
}

enum Step {
    Control(Option<ControlFrame>),
    Transport(Option<TransportEvent>),
}

pub(super) struct Session {
    pub(super) kind: FeedKind,
    pub(super) transport: Box<dyn FeedTransport>,
    pub(super) router: Arc<dyn FeedRouter>,
    pub(super) control: mpsc::UnboundedReceiver<ControlFrame>,
    pub(super) state: Arc<watch::Sender<ConnectionState>>,
    pub(super) multiplexer: SubscriptionMultiplexer,
    pub(super) backlog: VecDeque<SubscriptionCommand>,
    pub(super) stopped: Arc<AtomicBool>,
}

impl Session {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(feed = self.kind.name(), from = ?previous, to = ?next, "Connection state changed");
        }
    }

    pub(super) async fn run(mut self) {
        let feed = self.kind.name();
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            self.set_state(ConnectionState::Connecting);

            match self.connect().await {
                Attempt::Connected => {}
                Attempt::Failed(error) => {
                    warn!(feed, attempt, error = %error, "Feed connection failed");
                    self.set_state(ConnectionState::Errored);
                    match self.wait_before_reconnect().await {
                        AfterWait::Reconnect => continue,
                        AfterWait::Stop => break,
                    }
                }
                Attempt::Abandoned => {
                    info!(feed, attempt, "Connection attempt abandoned");
                    break;
                }
            }

            info!(feed, attempt, "Feed connected");
            attempt = 0;
            self.set_state(ConnectionState::Ready);

            let end = self.serve().await;
            let epoch = self.multiplexer.reset();

            match end {
                SessionEnd::ContextChanged => {
                    info!(feed, epoch, "Feed closed for context change, not reconnecting");
                    break;
                }
                SessionEnd::ClientClosed => {
                    info!(feed, epoch, "Feed closed by client");
                    break;
                }
                SessionEnd::Shutdown => {
                    debug!(feed, "Feed manager dropped, stopping connection task");
                    break;
                }
                SessionEnd::Closed { code, reason } => {
                    warn!(feed, code = ?code, reason = %reason, epoch, "Feed closed by server");
                    self.set_state(ConnectionState::Closed);
                }
                SessionEnd::Failed(reason) => {
                    warn!(feed, reason = %reason, epoch, "Feed connection lost");
                    self.set_state(ConnectionState::Errored);
                }
            }

            if let AfterWait::Stop = self.wait_before_reconnect().await {
                break;
            }
        }

        self.stopped.store(true, Ordering::SeqCst);
        self.backlog.clear();
        self.multiplexer.reset();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Hold subscription frames for the next connection; stop on a close
    /// request or once the manager is gone.
    fn hold(
        feed: &'static str,
        backlog: &mut VecDeque<SubscriptionCommand>,
        frame: Option<ControlFrame>,
    ) -> ControlFlow<()> {
        match frame {
            Some(ControlFrame::Subscription(command)) => {
                backlog.push_back(command);
                ControlFlow::Continue(())
            }
            Some(ControlFrame::Close { code, .. }) => {
                debug!(feed, code, "Close requested while disconnected");
                ControlFlow::Break(())
            }
            None => {
                debug!(feed, "Feed manager dropped while disconnected");
                ControlFlow::Break(())
            }
        }
    }

    /// Open the transport while still accepting control frames.
    async fn connect(&mut self) -> Attempt {
        let feed = self.kind.name();
        let connect = self.transport.connect();
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok(()) => Attempt::Connected,
                        Err(error) => Attempt::Failed(error),
                    };
                }
                frame = self.control.recv() => {
                    if Self::hold(feed, &mut self.backlog, frame).is_break() {
                        return Attempt::Abandoned;
                    }
                }
            }
        }
    }

    /// Sleep for the reconnect delay while still accepting control frames.
    async fn wait_before_reconnect(&mut self) -> AfterWait {
        debug!(
            feed = self.kind.name(),
            delay_ms = RECONNECT_DELAY.as_millis() as u64,
            "Reconnecting after delay"
        );
        let delay = tokio::time::sleep(RECONNECT_DELAY);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                () = &mut delay => return AfterWait::Reconnect,
                frame = self.control.recv() => {
                    if Self::hold(self.kind.name(), &mut self.backlog, frame).is_break() {
                        return AfterWait::Stop;
                    }
                }
            }
        }
    }

    async fn serve(&mut self) -> SessionEnd {
        while let Some(command) = self.backlog.pop_front() {
            if let Err(error) = self.forward(command).await {
                return SessionEnd::Failed(error.to_string());
            }
        }

        loop {
            let step = tokio::select! {
                biased;
                frame = self.control.recv() => Step::Control(frame),
                event = self.transport.next_event() => Step::Transport(event),
            };

            match step {
                Step::Control(None) => {
                    if let Err(error) = self.transport.close(NORMAL_CLOSE_CODE, "client dropped").await {
                        trace!(error = %error, "Close on shutdown failed");
                    }
                    return SessionEnd::Shutdown;
                }
                Step::Control(Some(ControlFrame::Subscription(command))) => {
                    if let Err(error) = self.forward(command).await {
                        return SessionEnd::Failed(error.to_string());
                    }
                }
                Step::Control(Some(ControlFrame::Close { code, reason })) => {
                    if let Err(error) = self.transport.close(code, &reason).await {
                        debug!(feed = self.kind.name(), error = %error, "Close frame not delivered");
                    }
                    return if code == CONTEXT_CHANGED_CLOSE_CODE {
                        SessionEnd::ContextChanged
                    } else {
                        SessionEnd::ClientClosed
                    };
                }
                Step::Transport(Some(TransportEvent::Text(text))) => self.route(&text),
                Step::Transport(Some(TransportEvent::Closed { code, reason })) => {
                    if code == Some(CONTEXT_CHANGED_CLOSE_CODE) {
                        return SessionEnd::ContextChanged;
                    }
                    return SessionEnd::Closed { code, reason };
                }
                Step::Transport(Some(TransportEvent::Error(reason))) => {
                    return SessionEnd::Failed(reason);
                }
                Step::Transport(None) => {
                    return SessionEnd::Closed {
                        code: None,
                        reason: "stream ended".into(),
                    };
                }
            }
        }
    }

    /// Send a subscription command unless it belongs to an earlier connection.
    async fn forward(&mut self, command: SubscriptionCommand) -> Result<()> {
        let current = self.multiplexer.epoch();
        if command.epoch != current {
            debug!(
                feed = self.kind.name(),
                command_epoch = command.epoch,
                current,
                ids = command.ids.len(),
                "Dropping stale subscription command"
            );
            return Ok(());
        }

        let frame = ControlMessage::from_command(self.kind, &command).to_json()?;
        let total = command.ids.len();
        if total <= 5 {
            info!(feed = self.kind.name(), action = command.action.as_str(), ids = ?command.ids, "Updating subscriptions");
        } else {
            let preview: Vec<_> = command.ids.iter().take(5).collect();
            info!(
                feed = self.kind.name(),
                action = command.action.as_str(),
                ids = ?preview,
                more = total - 5,
                "Updating subscriptions"
            );
        }
        self.transport.send(frame).await
    }

    fn route(&self, text: &str) {
        match self.router.route(text) {
            Ok(summary) => trace!(
                feed = self.kind.name(),
                records = summary.records,
                dispatched = summary.dispatched,
                "Routed frame"
            ),
            Err(error) => warn!(
                feed = self.kind.name(),
                error = %error,
                bytes = text.len(),
                "Failed to parse frame"
            ),
        }
    }
}
