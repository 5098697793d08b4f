//! Shared types, adapter traits, and core utilities for Settlr.
//!
//! This crate holds the types shared between the client pipeline, the server-side
//! workers and every adapter implementation, so adapters only depend on this crate.

#![forbid(unsafe_code)]

pub mod error;
pub mod meta_adapter;
pub mod offline_adapter;
pub mod prelude;
pub mod schema;
pub mod secret;
pub mod types;
pub mod utils;

/// Lock a `std::sync::Mutex`, mapping poisoning to `Error::Internal`.
#[macro_export]
macro_rules! lock {
	($mutex:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal("mutex poisoned".into()))
	};
	($mutex:expr, $name:expr) => {
		$mutex.lock().map_err(|_| {
			$crate::error::Error::Internal(format!("mutex poisoned: {}", $name))
		})
	};
}

// vim: ts=4
