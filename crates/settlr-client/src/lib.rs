//! Settlr client pipeline.
//!
//! A hosting application builds a `ClientSchema`, creates a `ConfigurationProvider`
//! and awaits `load()` before it starts. From then on the provider keeps a flat
//! key/value snapshot current in the background, falling back to the encrypted
//! offline cache and finally to the schema defaults when the authority is unreachable.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod api;
pub mod client;
pub mod offline;
pub mod opts;
pub mod prelude;
pub mod provider;
pub mod registry;
pub mod transport;

pub use client::{ClientState, PollOutcome, SettlrClient};
pub use offline::OfflineCache;
pub use opts::ClientOpts;
pub use provider::{ConfigSnapshot, ConfigurationProvider, SnapshotSource};
pub use registry::ProviderRegistry;
pub use transport::{BoundClient, RetryPolicy, TransportOpts};

// vim: ts=4
