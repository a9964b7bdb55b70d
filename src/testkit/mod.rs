//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`timer`] - `ManualScheduler`, a virtual clock for debounce windows.
//! - [`transport`] - `ScriptedTransport`, a feed connection driven from the test.
//! - [`sink`] - Recording control sink and feed router.
//! - [`domain`] - Builders for selections and odds snapshots.

pub mod domain;
pub mod sink;
pub mod timer;
pub mod transport;
