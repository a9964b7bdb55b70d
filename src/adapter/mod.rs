//! Implementations of ports (hexagonal adapters).
//!
//! - [`protocol`] - Wire records and control frames of both feeds
//! - [`router`] - Inbound frame routing into watchers
//! - [`websocket`] - WebSocket [`FeedTransport`](crate::port::FeedTransport)
//! - [`http`] - HTTP and GraphQL [`BatchFetch`](crate::port::BatchFetch)

pub mod http;
pub mod protocol;
pub mod router;
pub mod websocket;
