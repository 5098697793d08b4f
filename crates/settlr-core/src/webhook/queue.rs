//! In-memory webhook queue. Many producers, one consumer (the delivery worker).

use crate::prelude::*;
use crate::webhook::payload::WebHookData;
use settlr_types::meta_adapter::{WebHook, WebHookClientStore};

#[derive(Debug, Clone)]
pub struct WebHookQueueItem {
	pub data: WebHookData,
	pub matching_webhooks: Vec<WebHook>,
}

#[derive(Clone)]
pub struct WebHookQueue {
	tx: flume::Sender<WebHookQueueItem>,
	rx: flume::Receiver<WebHookQueueItem>,
}

impl Default for WebHookQueue {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for WebHookQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WebHookQueue").field("len", &self.len()).finish()
	}
}

impl WebHookQueue {
	pub fn new() -> Self {
		let (tx, rx) = flume::unbounded();
		Self { tx, rx }
	}

	/// Never blocks and never fails the caller
	pub fn enqueue(&self, item: WebHookQueueItem) {
		if item.matching_webhooks.is_empty() {
			return;
		}
		if let Err(e) = self.tx.try_send(item) {
			warn!("webhook queue unavailable, dropping {} event", e.into_inner().data.webhook_type());
		}
	}

	/// Look up the webhooks registered for this event type and queue the event for them
	pub async fn publish(&self, store: &dyn WebHookClientStore, data: WebHookData) {
		let webhook_type = data.webhook_type();
		match store.list_webhooks(webhook_type).await {
			Ok(matching_webhooks) => self.enqueue(WebHookQueueItem { data, matching_webhooks }),
			Err(e) => warn!("cannot list {} webhooks, event dropped: {}", webhook_type, e),
		}
	}

	pub fn try_dequeue(&self) -> Option<WebHookQueueItem> {
		self.rx.try_recv().ok()
	}

	pub fn len(&self) -> usize {
		self.rx.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rx.is_empty()
	}
}


// vim: ts=4
