//! Real-time feed ports.

use async_trait::async_trait;

use crate::error::Result;

/// Something that happened on a feed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame.
    Text(String),
    /// The peer closed the connection.
    Closed { code: Option<u16>, reason: String },
    /// The connection failed.
    Error(String),
}

/// A reconnectable text-frame connection.
///
/// `connect` may be called again after the connection ends; implementations
/// drop any previous socket and open a fresh one.
#[async_trait]
pub trait FeedTransport: Send {
    /// Open the connection.
    async fn connect(&mut self) -> Result<()>;

    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Next event, or `None` once the stream has ended without a close frame.
    ///
    /// Must be cancel-safe: it is polled inside `tokio::select!`.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Close the connection with a close code.
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

/// Counts from routing one inbound frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteSummary {
    /// Records found in the frame.
    pub records: usize,
    /// Watcher dispatches performed.
    pub dispatched: usize,
    /// Records skipped as malformed.
    pub skipped: usize,
}

/// Fans inbound frames out to watcher registries.
pub trait FeedRouter: Send + Sync {
    /// Route one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not valid JSON.
    fn route(&self, text: &str) -> Result<RouteSummary>;
}
