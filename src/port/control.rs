//! Subscription control port.

use serde::Serialize;

/// Direction of a subscription change sent upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// A net subscription change produced by one multiplexer flush.
///
/// `epoch` identifies the connection generation the change was computed
/// for. A command whose epoch is older than the multiplexer's current epoch
/// describes interest on a connection that no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionCommand {
    pub action: SubscriptionAction,
    pub ids: Vec<String>,
    pub epoch: u64,
}

/// Receiver for upstream subscription commands.
///
/// Called while the multiplexer holds its state lock, so implementations
/// must not block and must not call back into the multiplexer.
pub trait ControlSink: Send + Sync {
    fn send(&self, command: SubscriptionCommand);
}
