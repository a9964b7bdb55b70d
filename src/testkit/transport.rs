//! Mock [`FeedTransport`] for connection tests.
//!
//! [`ScriptedTransport`] pops connect results from a script (defaulting to
//! success) and reads events from a channel fed by its
//! [`TransportHandle`], which also records everything the manager sent.
//! [`ScriptedTransport::hanging_connects`] models a black-holed host.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::port::{FeedTransport, TransportEvent};

#[derive(Default)]
struct TransportLog {
    connects: AtomicU32,
    sent: Mutex<Vec<String>>,
    closes: Mutex<Vec<(u16, String)>>,
}

/// Transport whose connection outcomes and inbound events are scripted.
pub struct ScriptedTransport {
    connect_results: VecDeque<Result<()>>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    log: Arc<TransportLog>,
    connected: bool,
    hang_on_connect: bool,
}

/// Test-side control of a [`ScriptedTransport`].
#[derive(Clone)]
pub struct TransportHandle {
    events: mpsc::UnboundedSender<TransportEvent>,
    log: Arc<TransportLog>,
}

/// Create a [`ScriptedTransport`] and its [`TransportHandle`].
pub fn scripted_transport() -> (ScriptedTransport, TransportHandle) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let log = Arc::new(TransportLog::default());
    (
        ScriptedTransport {
            connect_results: VecDeque::new(),
            events: receiver,
            log: Arc::clone(&log),
            connected: false,
            hang_on_connect: false,
        },
        TransportHandle {
            events: sender,
            log,
        },
    )
}

impl ScriptedTransport {
    /// Results for successive `connect` calls.
    #[must_use]
    pub fn with_connect_results(mut self, results: Vec<Result<()>>) -> Self {
        self.connect_results = results.into();
        self
    }

    /// Fail the next `count` connection attempts.
    #[must_use]
    pub fn failing_connects(self, count: usize) -> Self {
        let results = (0..count)
            .map(|i| Err(Error::Connection(format!("refused #{i}"))))
            .collect();
        self.with_connect_results(results)
    }

    /// Never complete a connection attempt.
    #[must_use]
    pub fn hanging_connects(mut self) -> Self {
        self.hang_on_connect = true;
        self
    }
}

impl TransportHandle {
    pub fn push(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push(TransportEvent::Text(text.into()));
    }

    /// Server-side close with `code`.
    pub fn push_close(&self, code: Option<u16>, reason: &str) {
        self.push(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    pub fn connect_count(&self) -> u32 {
        self.log.connects.load(Ordering::SeqCst)
    }

    /// Frames sent by the client, in order.
    pub fn sent(&self) -> Vec<String> {
        self.log.sent.lock().clone()
    }

    /// Client-initiated closes as `(code, reason)`.
    pub fn closes(&self) -> Vec<(u16, String)> {
        self.log.closes.lock().clone()
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn connect(&mut self) -> Result<()> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_connect {
            std::future::pending::<()>().await;
        }
        let result = self.connect_results.pop_front().unwrap_or(Ok(()));
        self.connected = result.is_ok();
        result
    }

    async fn send(&mut self, text: String) -> Result<()> {
        if !self.connected {
            return Err(Error::Connection("not connected".into()));
        }
        self.log.sent.lock().push(text);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        let event = self.events.recv().await;
        if matches!(event, Some(TransportEvent::Closed { .. } | TransportEvent::Error(_)) | None) {
            self.connected = false;
        }
        event
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.connected = false;
        self.log.closes.lock().push((code, reason.to_string()));
        Ok(())
    }
}
