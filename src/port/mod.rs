//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports are the seams adapters plug into:
//!
//! - [`FeedTransport`] - Real-time connection carrying one feed
//! - [`FeedRouter`] - Turns inbound feed frames into watcher dispatches
//! - [`ControlSink`] - Receives net subscribe/unsubscribe commands
//! - [`BatchFetch`] - One upstream call for a batch of identifiers

mod control;
mod feed;
mod fetch;

pub use control::{ControlSink, SubscriptionAction, SubscriptionCommand};
pub use feed::{FeedRouter, FeedTransport, RouteSummary, TransportEvent};
pub use fetch::BatchFetch;
