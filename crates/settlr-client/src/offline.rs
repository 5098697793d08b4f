//! Encrypted offline settings cache
//!
//! The last good value set of a client is serialized, encrypted with a key derived from
//! the client secret and handed to an `OfflineAdapter`. Anything that fails to decrypt
//! or parse is treated as a cache miss.
//!
//! Blob layout: `version(1) || nonce(12) || ciphertext+tag`

use std::sync::Arc;

use aes_gcm::{
	Aes256Gcm, Nonce,
	aead::{Aead, AeadCore, KeyInit, OsRng},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::prelude::*;
use settlr_types::offline_adapter::OfflineAdapter;

const BLOB_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;

/// Plaintext content of an offline blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineSettings {
	pub saved_at: Timestamp,
	/// Authority change time the values correspond to
	pub last_setting_update: Timestamp,
	pub values: Vec<SettingValue>,
}

fn derive_key(secret: &str) -> [u8; 32] {
	Sha256::digest(secret.as_bytes()).into()
}

fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> ClResult<Vec<u8>> {
	let cipher = Aes256Gcm::new_from_slice(key)
		.map_err(|e| Error::Internal(format!("invalid offline key: {}", e)))?;
	let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
	let ciphertext = cipher
		.encrypt(&nonce, plaintext)
		.map_err(|e| Error::Internal(format!("offline encryption failed: {}", e)))?;

	let mut blob = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
	blob.push(BLOB_VERSION);
	blob.extend_from_slice(&nonce);
	blob.extend_from_slice(&ciphertext);
	Ok(blob)
}

fn decrypt(key: &[u8; 32], blob: &[u8]) -> ClResult<Vec<u8>> {
	let Some((&version, rest)) = blob.split_first() else {
		return Err(Error::Decryption("empty blob".into()));
	};
	if version != BLOB_VERSION {
		return Err(Error::Decryption(format!("unknown blob version {}", version)));
	}
	if rest.len() < NONCE_LEN {
		return Err(Error::Decryption("blob too short".into()));
	}
	let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
	let cipher = Aes256Gcm::new_from_slice(key)
		.map_err(|e| Error::Internal(format!("invalid offline key: {}", e)))?;
	cipher
		.decrypt(Nonce::from_slice(nonce), ciphertext)
		.map_err(|_| Error::Decryption("authentication tag mismatch".into()))
}

/// Offline cache of one client
pub struct OfflineCache {
	adapter: Arc<dyn OfflineAdapter>,
	client: ClientKey,
	key: [u8; 32],
}

impl std::fmt::Debug for OfflineCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("OfflineCache").field("client", &self.client).finish_non_exhaustive()
	}
}

impl OfflineCache {
	pub fn new(adapter: Arc<dyn OfflineAdapter>, identity: &ClientIdentity) -> Self {
		Self { adapter, client: identity.key.clone(), key: derive_key(&identity.secret) }
	}

	/// Overwrite the cached values
	pub async fn save(&self, values: &[SettingValue], last_setting_update: Timestamp) -> ClResult<()> {
		let settings = OfflineSettings {
			saved_at: Timestamp::now(),
			last_setting_update,
			values: values.to_vec(),
		};
		let plaintext = serde_json::to_vec(&settings)?;
		let blob = encrypt(&self.key, &plaintext)?;
		self.adapter.write_blob(&self.client, &blob).await?;
		debug!(client = %self.client, "offline settings saved ({} values)", values.len());
		Ok(())
	}

	/// Cached values, `None` when absent or unreadable
	pub async fn get(&self) -> Option<OfflineSettings> {
		let blob = match self.adapter.read_blob(&self.client).await {
			Ok(Some(blob)) => blob,
			Ok(None) => return None,
			Err(e) => {
				warn!(client = %self.client, "cannot read offline settings: {}", e);
				return None;
			}
		};
		let plaintext = match decrypt(&self.key, &blob) {
			Ok(plaintext) => plaintext,
			Err(e) => {
				warn!(client = %self.client, "ignoring offline settings: {}", e);
				return None;
			}
		};
		match serde_json::from_slice::<OfflineSettings>(&plaintext) {
			Ok(settings) => Some(settings),
			Err(e) => {
				warn!(client = %self.client, "offline settings are corrupt: {}", e);
				None
			}
		}
	}

	pub async fn delete(&self) -> ClResult<()> {
		self.adapter.remove_blob(&self.client).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use settlr_offline_adapter_fs::OfflineAdapterFs;

	const SECRET: &str = "0123456789abcdef0123456789abcdef";

	async fn create_cache(dir: &tempfile::TempDir, secret: &str) -> OfflineCache {
		let adapter = OfflineAdapterFs::new(dir.path().into()).await.unwrap();
		let identity = ClientIdentity::new(ClientKey::new("Orders", None), secret);
		OfflineCache::new(Arc::new(adapter), &identity)
	}

	#[test]
	fn test_encrypt_decrypt() {
		let key = derive_key(SECRET);
		let blob = encrypt(&key, b"hello").unwrap();
		assert_eq!(blob[0], BLOB_VERSION);
		assert_eq!(decrypt(&key, &blob).unwrap(), b"hello");
	}

	#[test]
	fn test_nonce_is_random() {
		let key = derive_key(SECRET);
		assert_ne!(encrypt(&key, b"x").unwrap(), encrypt(&key, b"x").unwrap());
	}

	#[test]
	fn test_tampered_blob_fails() {
		let key = derive_key(SECRET);
		let mut blob = encrypt(&key, b"hello").unwrap();
		let last = blob.len() - 1;
		blob[last] ^= 0x01;
		assert!(matches!(decrypt(&key, &blob), Err(Error::Decryption(_))));
		assert!(matches!(decrypt(&key, &[]), Err(Error::Decryption(_))));
		assert!(matches!(decrypt(&key, &[BLOB_VERSION, 1, 2]), Err(Error::Decryption(_))));
	}

	#[tokio::test]
	async fn test_save_and_get() {
		let dir = tempfile::TempDir::new().unwrap();
		let cache = create_cache(&dir, SECRET).await;
		let values = vec![SettingValue::new("Color", TypedValue::String("Blue".into()))];

		cache.save(&values, Timestamp(42)).await.unwrap();
		let cached = cache.get().await.unwrap();
		assert_eq!(cached.values, values);
		assert_eq!(cached.last_setting_update, Timestamp(42));
	}

	#[tokio::test]
	async fn test_wrong_secret_is_a_miss() {
		let dir = tempfile::TempDir::new().unwrap();
		let cache = create_cache(&dir, SECRET).await;
		cache
			.save(&[SettingValue::new("Color", TypedValue::String("Blue".into()))], Timestamp(1))
			.await
			.unwrap();

		let other = create_cache(&dir, "fedcba9876543210fedcba9876543210").await;
		assert!(other.get().await.is_none());
	}

	#[tokio::test]
	async fn test_delete() {
		let dir = tempfile::TempDir::new().unwrap();
		let cache = create_cache(&dir, SECRET).await;
		cache.save(&[], Timestamp(1)).await.unwrap();
		cache.delete().await.unwrap();
		assert!(cache.get().await.is_none());
	}
}

// vim: ts=4
