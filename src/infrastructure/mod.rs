//! Infrastructure layer.
//!
//! Timing, fan-out and connection plumbing shared by both feeds. Nothing
//! here knows about odds math.
//!
//! # Submodules
//!
//! - [`timer`] - Cancelable timers behind an injectable scheduler
//! - [`dispatch`] - Debounced per-key dispatch and keyed watchers
//! - [`batch`] - Request coalescing into batched upstream calls
//! - [`subscription`] - Reference-counted subscription multiplexing
//! - [`connection`] - Feed connection lifecycle and reconnects
//! - [`feed`] - Condition and live statistics feed facades
//! - [`lookup`] - Batched condition lookups over the configured API
//! - [`config`] - Configuration loading and validation

pub mod batch;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod feed;
pub mod lookup;
pub mod subscription;
pub mod timer;
