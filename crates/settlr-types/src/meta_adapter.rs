//! Server-side records and the collaborator traits the background workers consume.
//!
//! The mutation API (outside this workspace) creates deferred changes, checkpoint
//! triggers and webhook queue items; the workers read and retire them through these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Debug;

use crate::prelude::*;
use crate::types::TypedValue;

pub type DeferredChangeId = u64;
pub type TriggerId = u64;

// Deferred changes
//******************

/// When a change set should be applied (and optionally reverted)
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSchedule {
	pub apply_at_utc: Option<Timestamp>,
	pub revert_at_utc: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingUpdate {
	pub name: String,
	pub value: Option<TypedValue>,
}

/// Absolute set of values to apply to one client
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
	pub values: Vec<SettingUpdate>,
	pub change_message: Option<String>,
	/// Set when the user asked for a future application. The mutation path defers any
	/// change set carrying a schedule, so replays must clear it first.
	pub schedule: Option<ChangeSchedule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeferredChange {
	pub id: DeferredChangeId,
	pub client_name: Box<str>,
	pub instance: Option<Box<str>>,
	pub change_set: ChangeSet,
	pub execute_at_utc: Timestamp,
	pub requesting_user: Option<Box<str>>,
}

#[async_trait]
pub trait DeferredChangeStore: Send + Sync {
	/// Changes due at `now`, oldest first, at most `limit`
	async fn list_due(&self, now: Timestamp, limit: usize) -> ClResult<Vec<DeferredChange>>;

	async fn create_deferred_change(
		&self,
		client_name: &str,
		instance: Option<&str>,
		change_set: &ChangeSet,
		execute_at_utc: Timestamp,
		requesting_user: Option<&str>,
	) -> ClResult<DeferredChangeId>;

	async fn delete_deferred_change(&self, id: DeferredChangeId) -> ClResult<()>;
}

/// The mutation path a live user edit goes through
#[async_trait]
pub trait ChangeApplier: Send + Sync {
	async fn apply_change_set(
		&self,
		client_name: &str,
		instance: Option<&str>,
		change_set: &ChangeSet,
		requesting_user: Option<&str>,
	) -> ClResult<()>;
}

// Checkpoints
//*************

#[derive(Debug, Clone, PartialEq)]
pub struct CheckPointTrigger {
	pub id: TriggerId,
	pub timestamp: Timestamp,
	pub after_event: Box<str>,
	pub user: Option<Box<str>>,
	pub handled: bool,
}

/// Input for one coalesced checkpoint
#[derive(Debug, Clone, PartialEq)]
pub struct CheckPointRequest {
	pub timestamp: Timestamp,
	pub after_event: String,
	pub user: Option<String>,
}

/// Immutable versioned snapshot reference
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPoint {
	pub id: uuid::Uuid,
	pub data_id: uuid::Uuid,
	pub timestamp: Timestamp,
	pub number_of_clients: u32,
	pub number_of_settings: u32,
	pub after_event: String,
	pub note: Option<String>,
	pub user: Option<String>,
}

#[async_trait]
pub trait CheckPointTriggerStore: Send + Sync {
	async fn create_trigger(&self, after_event: &str, user: Option<&str>) -> ClResult<TriggerId>;

	/// Garbage-collect handled triggers, returns how many were removed
	async fn delete_handled_triggers(&self) -> ClResult<usize>;

	async fn list_unhandled_triggers(&self) -> ClResult<Vec<CheckPointTrigger>>;

	async fn mark_triggers_handled(&self, ids: &[TriggerId]) -> ClResult<()>;
}

#[async_trait]
pub trait CheckpointCreator: Send + Sync {
	async fn create_checkpoint(&self, request: &CheckPointRequest) -> ClResult<CheckPoint>;
}

// WebHooks
//**********

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WebHookType {
	ClientRegistration,
	SettingValueChanged,
	ClientStatusChanged,
	HealthStatusChanged,
	MinRunSessions,
	SecurityEvent,
}

impl WebHookType {
	/// Route appended to the webhook client's base URI
	pub fn route(&self) -> &'static str {
		match self {
			WebHookType::ClientRegistration => "client-registration",
			WebHookType::SettingValueChanged => "setting-value-changed",
			WebHookType::ClientStatusChanged => "client-status-changed",
			WebHookType::HealthStatusChanged => "health-status-changed",
			WebHookType::MinRunSessions => "min-run-sessions",
			WebHookType::SecurityEvent => "security-event",
		}
	}
}

impl std::fmt::Display for WebHookType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.route())
	}
}

/// A configured webhook: which events, filtered how, delivered to which client
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebHook {
	pub id: uuid::Uuid,
	pub client_id: uuid::Uuid,
	pub webhook_type: WebHookType,
	/// Regex over the settings client name; `None` matches every client
	pub client_name_regex: Option<String>,
	/// Regex over setting names (setting-changed webhooks only)
	pub setting_name_regex: Option<String>,
	/// Threshold for min-run-sessions webhooks
	pub min_sessions: Option<u32>,
}

/// Receiver of webhook notifications
#[derive(Clone)]
pub struct WebHookClient {
	pub id: uuid::Uuid,
	pub name: Box<str>,
	pub base_uri: Box<str>,
	pub secret: Box<str>,
}

impl Debug for WebHookClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WebHookClient")
			.field("id", &self.id)
			.field("name", &self.name)
			.field("base_uri", &self.base_uri)
			.finish_non_exhaustive()
	}
}

#[async_trait]
pub trait WebHookClientStore: Send + Sync {
	async fn get_webhook_client(&self, id: uuid::Uuid) -> ClResult<Option<WebHookClient>>;

	async fn list_webhooks(&self, webhook_type: WebHookType) -> ClResult<Vec<WebHook>>;
}

// Event log
//***********

#[async_trait]
pub trait EventLogger: Send + Sync {
	async fn record(&self, event_type: &str, subject: &str, outcome: &str) -> ClResult<()>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_change_set_wire_format() {
		let cs = ChangeSet {
			values: vec![SettingUpdate {
				name: "Color".into(),
				value: Some(TypedValue::String("Red".into())),
			}],
			change_message: None,
			schedule: Some(ChangeSchedule { apply_at_utc: Some(Timestamp(10)), revert_at_utc: None }),
		};
		let json = serde_json::to_value(&cs).unwrap();
		assert_eq!(json["schedule"]["applyAtUtc"], 10);
		assert!(json.get("changeMessage").is_none());
		let back: ChangeSet = serde_json::from_value(json).unwrap();
		assert_eq!(back, cs);
	}

	#[test]
	fn test_webhook_client_debug_hides_secret() {
		let client = WebHookClient {
			id: uuid::Uuid::new_v4(),
			name: "ops".into(),
			base_uri: "http://localhost".into(),
			secret: "s3cr3t".into(),
		};
		assert!(!format!("{:?}", client).contains("s3cr3t"));
	}
}

// vim: ts=4
