//! In-memory metadata adapter
//!
//! Implements the storage seams of the background workers on top of plain collections.
//! Suitable for tests and for embedding the workers in a single process.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use settlr_types::meta_adapter::{
	self, ChangeSet, CheckPoint, CheckPointRequest, CheckPointTrigger, DeferredChange,
	DeferredChangeId, TriggerId, WebHook, WebHookClient, WebHookType,
};
use settlr_types::prelude::*;
use settlr_types::types::{ClientKey, TypedValue};

mod checkpoint;
mod deferred;
mod event;
mod setting;
mod webhook;

pub use event::EventRecord;

#[derive(Default)]
pub(crate) struct Data {
	next_id: u64,
	deferred: BTreeMap<DeferredChangeId, DeferredChange>,
	values: HashMap<ClientKey, BTreeMap<String, Option<TypedValue>>>,
	failing_clients: HashSet<String>,
	triggers: BTreeMap<TriggerId, CheckPointTrigger>,
	checkpoints: Vec<CheckPoint>,
	webhook_clients: HashMap<uuid::Uuid, WebHookClient>,
	webhooks: Vec<WebHook>,
	events: Vec<EventRecord>,
}

impl Data {
	fn next_id(&mut self) -> u64 {
		self.next_id += 1;
		self.next_id
	}
}

#[derive(Clone, Default)]
pub struct MetaAdapterMemory {
	data: Arc<RwLock<Data>>,
}

impl std::fmt::Debug for MetaAdapterMemory {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MetaAdapterMemory").finish_non_exhaustive()
	}
}

impl MetaAdapterMemory {
	pub fn new() -> Self {
		Self::default()
	}

	// Inspection and setup helpers
	pub fn setting_value(&self, client_name: &str, instance: Option<&str>, name: &str) -> Option<TypedValue> {
		setting::read_value(&self.data.read(), client_name, instance, name)
	}

	pub fn deferred_changes(&self) -> Vec<DeferredChange> {
		self.data.read().deferred.values().cloned().collect()
	}

	pub fn triggers(&self) -> Vec<CheckPointTrigger> {
		self.data.read().triggers.values().cloned().collect()
	}

	pub fn checkpoints(&self) -> Vec<CheckPoint> {
		self.data.read().checkpoints.clone()
	}

	pub fn events(&self) -> Vec<EventRecord> {
		self.data.read().events.clone()
	}

	/// Make every change applied to `client_name` fail
	pub fn fail_client(&self, client_name: &str, fail: bool) {
		let mut data = self.data.write();
		if fail {
			data.failing_clients.insert(client_name.to_string());
		} else {
			data.failing_clients.remove(client_name);
		}
	}

	pub fn add_webhook_client(&self, name: &str, base_uri: &str, secret: &str) -> uuid::Uuid {
		webhook::add_client(&mut self.data.write(), name, base_uri, secret)
	}

	pub fn add_webhook(&self, webhook: WebHook) {
		self.data.write().webhooks.push(webhook);
	}
}

#[async_trait]
impl meta_adapter::DeferredChangeStore for MetaAdapterMemory {
	async fn list_due(&self, now: Timestamp, limit: usize) -> ClResult<Vec<DeferredChange>> {
		Ok(deferred::list_due(&self.data.read(), now, limit))
	}

	async fn create_deferred_change(
		&self,
		client_name: &str,
		instance: Option<&str>,
		change_set: &ChangeSet,
		execute_at_utc: Timestamp,
		requesting_user: Option<&str>,
	) -> ClResult<DeferredChangeId> {
		Ok(deferred::create(
			&mut self.data.write(),
			client_name,
			instance,
			change_set,
			execute_at_utc,
			requesting_user,
		))
	}

	async fn delete_deferred_change(&self, id: DeferredChangeId) -> ClResult<()> {
		deferred::delete(&mut self.data.write(), id)
	}
}

#[async_trait]
impl meta_adapter::ChangeApplier for MetaAdapterMemory {
	async fn apply_change_set(
		&self,
		client_name: &str,
		instance: Option<&str>,
		change_set: &ChangeSet,
		requesting_user: Option<&str>,
	) -> ClResult<()> {
		setting::apply_change_set(&mut self.data.write(), client_name, instance, change_set, requesting_user)
	}
}

#[async_trait]
impl meta_adapter::CheckPointTriggerStore for MetaAdapterMemory {
	async fn create_trigger(&self, after_event: &str, user: Option<&str>) -> ClResult<TriggerId> {
		Ok(checkpoint::create_trigger(&mut self.data.write(), after_event, user))
	}

	async fn delete_handled_triggers(&self) -> ClResult<usize> {
		Ok(checkpoint::delete_handled(&mut self.data.write()))
	}

	async fn list_unhandled_triggers(&self) -> ClResult<Vec<CheckPointTrigger>> {
		Ok(checkpoint::list_unhandled(&self.data.read()))
	}

	async fn mark_triggers_handled(&self, ids: &[TriggerId]) -> ClResult<()> {
		checkpoint::mark_handled(&mut self.data.write(), ids);
		Ok(())
	}
}

#[async_trait]
impl meta_adapter::CheckpointCreator for MetaAdapterMemory {
	async fn create_checkpoint(&self, request: &CheckPointRequest) -> ClResult<CheckPoint> {
		Ok(checkpoint::create_checkpoint(&mut self.data.write(), request))
	}
}

#[async_trait]
impl meta_adapter::WebHookClientStore for MetaAdapterMemory {
	async fn get_webhook_client(&self, id: uuid::Uuid) -> ClResult<Option<WebHookClient>> {
		Ok(self.data.read().webhook_clients.get(&id).cloned())
	}

	async fn list_webhooks(&self, webhook_type: WebHookType) -> ClResult<Vec<WebHook>> {
		Ok(webhook::list(&self.data.read(), webhook_type))
	}
}

#[async_trait]
impl meta_adapter::EventLogger for MetaAdapterMemory {
	async fn record(&self, event_type: &str, subject: &str, outcome: &str) -> ClResult<()> {
		event::record(&mut self.data.write(), event_type, subject, outcome);
		Ok(())
	}
}

// vim: ts=4
