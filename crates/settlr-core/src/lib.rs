//! Settlr server workers.
//!
//! Three independent background loops run next to the authority's API:
//! the scheduling worker applies deferred changes, the checkpoint worker coalesces
//! checkpoint triggers, and the webhook worker drains the in-memory notification queue.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod app;
pub mod checkpoint;
pub mod periodic;
pub mod prelude;
pub mod scheduling;
pub mod webhook;

pub use app::{WorkerHost, WorkerHostBuilder, WorkerOpts};

// vim: ts=4
