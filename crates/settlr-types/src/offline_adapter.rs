//! Adapter that persists opaque offline-settings blobs, one per client.
//!
//! Implementations only move bytes; serialization and encryption live in the client.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::prelude::*;
use crate::types::ClientKey;

#[async_trait]
pub trait OfflineAdapter: Debug + Send + Sync {
	/// Replace the blob of a client. Must be atomic: readers see either the old or the new blob.
	async fn write_blob(&self, client: &ClientKey, data: &[u8]) -> ClResult<()>;

	/// Read the blob of a client, `None` if there is none
	async fn read_blob(&self, client: &ClientKey) -> ClResult<Option<Box<[u8]>>>;

	/// Remove the blob of a client. Removing a missing blob is not an error.
	async fn remove_blob(&self, client: &ClientKey) -> ClResult<()>;
}

// vim: ts=4
