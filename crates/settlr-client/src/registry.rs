//! Provider registry: one configuration provider per client name and instance

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::prelude::*;
use crate::provider::ConfigurationProvider;

#[derive(Debug, Default)]
pub struct ProviderRegistry {
	providers: Mutex<HashMap<ClientKey, Arc<ConfigurationProvider>>>,
}

impl ProviderRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a provider. Fails if one is already registered for the same client.
	pub fn register(&self, provider: Arc<ConfigurationProvider>) -> ClResult<()> {
		let mut providers = self.providers.lock();
		let key = provider.key().clone();
		if providers.contains_key(&key) {
			return Err(Error::ConfigError(format!("provider for '{}' already registered", key)));
		}
		debug!(client = %key, "provider registered");
		providers.insert(key, provider);
		Ok(())
	}

	pub fn unregister(&self, key: &ClientKey) -> Option<Arc<ConfigurationProvider>> {
		self.providers.lock().remove(key)
	}

	pub fn lookup(&self, key: &ClientKey) -> Option<Arc<ConfigurationProvider>> {
		self.providers.lock().get(key).cloned()
	}

	/// Existing provider for `key`, or the one built by `create`.
	///
	/// `create` runs without the lock held; when two callers race, the first inserted
	/// provider wins and the other one is stopped.
	pub async fn get_or_insert<F, Fut>(&self, key: &ClientKey, create: F) -> ClResult<Arc<ConfigurationProvider>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = ClResult<Arc<ConfigurationProvider>>>,
	{
		if let Some(provider) = self.lookup(key) {
			return Ok(provider);
		}
		let created = create().await?;
		let (provider, lost) = {
			let mut providers = self.providers.lock();
			match providers.get(key) {
				Some(existing) => (Arc::clone(existing), Some(created)),
				None => {
					providers.insert(key.clone(), Arc::clone(&created));
					(created, None)
				}
			}
		};
		if let Some(lost) = lost {
			lost.stop().await;
		}
		Ok(provider)
	}

	pub fn len(&self) -> usize {
		self.providers.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.providers.lock().is_empty()
	}

	/// Stop and remove every provider
	pub async fn shutdown(&self) {
		let providers: Vec<_> = self.providers.lock().drain().map(|(_, p)| p).collect();
		for provider in providers {
			provider.stop().await;
		}
	}
}

// vim: ts=4
