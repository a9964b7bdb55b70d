//! Oddsync - Real-time odds synchronization for live betting markets.
//!
//! Keeps many independent observers consistent with push feeds of odds,
//! condition status and live statistics, and prices live selections as the
//! feed data or the candidate stake changes.
//!
//! # Architecture
//!
//! - **Coordination primitives** ([`infrastructure`]): debounced per-key
//!   dispatch, keyed watchers, request batching, reference-counted
//!   subscription multiplexing and a reconnecting connection manager, all
//!   timed through an injectable [`Scheduler`](infrastructure::timer::Scheduler).
//! - **Pricing** ([`application::pricing`]): the live odds solver, the
//!   stake-aware calculator and `calc_min_odds`.
//! - **Adapters** ([`adapter`]): wire protocol, frame routing, WebSocket
//!   transport and HTTP/GraphQL batch fetchers.
//!
//! # Modules
//!
//! - [`domain`] - Identifiers, selections and feed snapshots
//! - [`application`] - Pricing services
//! - [`port`] - Trait seams between infrastructure and adapters
//! - [`infrastructure`] - Timers, dispatch, batching, subscriptions, connections, config
//! - [`adapter`] - Protocol, routers, transports and fetchers
//! - [`cli`] - Command-line interface
//! - [`error`] - Error types for the crate
//!
//! # Example
//!
//! ```
//! use oddsync::application::pricing::calc_min_odds;
//! use rust_decimal_macros::dec;
//!
//! assert_eq!(calc_min_odds(dec!(2.0), dec!(10)), dec!(1.9));
//! ```

pub mod adapter;
pub mod application;
pub mod cli;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
