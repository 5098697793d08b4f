//! Webhook payloads, one per category, and the per-webhook send filters

use regex::Regex;
use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::prelude::*;
use settlr_types::meta_adapter::{WebHook, WebHookType};
use settlr_types::types::serialize_timestamp_iso;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrationType {
	New,
	Updated,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRegistrationData {
	pub client_name: String,
	pub instance: Option<String>,
	pub registration_type: RegistrationType,
	pub settings: Vec<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingValueChangedData {
	pub client_name: String,
	pub instance: Option<String>,
	/// Names only, values (secret or not) are never sent
	pub updated_settings: Vec<String>,
	pub username: Option<String>,
	pub change_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionEvent {
	Connected,
	Disconnected,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatusChangedData {
	pub client_name: String,
	pub instance: Option<String>,
	pub connection_event: ConnectionEvent,
	pub run_session_id: uuid::Uuid,
	pub hostname: Option<String>,
	pub ip_address: Option<String>,
	pub app_version: Option<String>,
	#[serde(serialize_with = "serialize_timestamp_iso")]
	pub uptime_since: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
	Healthy,
	Degraded,
	Unhealthy,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatusChangedData {
	pub client_name: String,
	pub instance: Option<String>,
	pub run_session_id: uuid::Uuid,
	pub hostname: Option<String>,
	pub status: HealthStatus,
	pub message: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinRunSessionsData {
	pub client_name: String,
	pub instance: Option<String>,
	pub run_sessions: u32,
	pub previous_run_sessions: u32,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEventData {
	pub event_type: String,
	pub user: Option<String>,
	pub message: Option<String>,
	#[serde(serialize_with = "serialize_timestamp_iso")]
	pub timestamp: Timestamp,
}

/// Event data carried by a queue item
#[derive(Debug, Clone)]
pub enum WebHookData {
	ClientRegistration(ClientRegistrationData),
	SettingValueChanged(SettingValueChangedData),
	ClientStatusChanged(ClientStatusChangedData),
	HealthStatusChanged(HealthStatusChangedData),
	MinRunSessions(MinRunSessionsData),
	SecurityEvent(SecurityEventData),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
enum RunSessionsEvent {
	BelowMinimum,
	MinimumRestored,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MinRunSessionsPayload<'a> {
	#[serde(flatten)]
	data: &'a MinRunSessionsData,
	minimum_run_sessions: u32,
	event: RunSessionsEvent,
}

fn regex_matches(pattern: Option<&str>, webhook: &WebHook, candidate: &str) -> bool {
	let Some(pattern) = pattern else { return true };
	match Regex::new(pattern) {
		Ok(re) => re.is_match(candidate),
		Err(e) => {
			warn!(webhook = %webhook.id, "invalid webhook filter '{}': {}", pattern, e);
			false
		}
	}
}

impl WebHookData {
	pub fn webhook_type(&self) -> WebHookType {
		match self {
			WebHookData::ClientRegistration(_) => WebHookType::ClientRegistration,
			WebHookData::SettingValueChanged(_) => WebHookType::SettingValueChanged,
			WebHookData::ClientStatusChanged(_) => WebHookType::ClientStatusChanged,
			WebHookData::HealthStatusChanged(_) => WebHookType::HealthStatusChanged,
			WebHookData::MinRunSessions(_) => WebHookType::MinRunSessions,
			WebHookData::SecurityEvent(_) => WebHookType::SecurityEvent,
		}
	}

	pub fn client_name(&self) -> Option<&str> {
		match self {
			WebHookData::ClientRegistration(d) => Some(&d.client_name),
			WebHookData::SettingValueChanged(d) => Some(&d.client_name),
			WebHookData::ClientStatusChanged(d) => Some(&d.client_name),
			WebHookData::HealthStatusChanged(d) => Some(&d.client_name),
			WebHookData::MinRunSessions(d) => Some(&d.client_name),
			WebHookData::SecurityEvent(_) => None,
		}
	}

	/// Whether `webhook` wants this event
	pub fn should_send(&self, webhook: &WebHook) -> bool {
		if webhook.webhook_type != self.webhook_type() {
			return false;
		}
		if let Some(client_name) = self.client_name() {
			if !regex_matches(webhook.client_name_regex.as_deref(), webhook, client_name) {
				return false;
			}
		}
		match self {
			WebHookData::SettingValueChanged(data) => {
				webhook.setting_name_regex.is_none()
					|| data.updated_settings.iter().any(|name| {
						regex_matches(webhook.setting_name_regex.as_deref(), webhook, name)
					})
			}
			WebHookData::MinRunSessions(data) => {
				let minimum = webhook.min_sessions.unwrap_or(0);
				(data.previous_run_sessions >= minimum) != (data.run_sessions >= minimum)
			}
			_ => true,
		}
	}

	/// JSON body sent to `webhook`
	pub fn to_payload(&self, webhook: &WebHook) -> ClResult<serde_json::Value> {
		let value = match self {
			WebHookData::ClientRegistration(d) => serde_json::to_value(d)?,
			WebHookData::SettingValueChanged(d) => serde_json::to_value(d)?,
			WebHookData::ClientStatusChanged(d) => serde_json::to_value(d)?,
			WebHookData::HealthStatusChanged(d) => serde_json::to_value(d)?,
			WebHookData::MinRunSessions(d) => {
				let minimum = webhook.min_sessions.unwrap_or(0);
				serde_json::to_value(MinRunSessionsPayload {
					data: d,
					minimum_run_sessions: minimum,
					event: if d.run_sessions < minimum {
						RunSessionsEvent::BelowMinimum
					} else {
						RunSessionsEvent::MinimumRestored
					},
				})?
			}
			WebHookData::SecurityEvent(d) => serde_json::to_value(d)?,
		};
		Ok(value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn webhook(webhook_type: WebHookType) -> WebHook {
		WebHook {
			id: uuid::Uuid::new_v4(),
			client_id: uuid::Uuid::new_v4(),
			webhook_type,
			client_name_regex: None,
			setting_name_regex: None,
			min_sessions: None,
		}
	}

	fn setting_changed(client: &str, settings: &[&str]) -> WebHookData {
		WebHookData::SettingValueChanged(SettingValueChangedData {
			client_name: client.into(),
			instance: None,
			updated_settings: settings.iter().map(|s| (*s).to_string()).collect(),
			username: Some("alice".into()),
			change_message: None,
		})
	}

	#[test]
	fn test_type_mismatch_is_skipped() {
		let data = setting_changed("Orders", &["Color"]);
		assert!(!data.should_send(&webhook(WebHookType::ClientRegistration)));
		assert!(data.should_send(&webhook(WebHookType::SettingValueChanged)));
	}

	#[test]
	fn test_client_and_setting_filters() {
		let mut hook = webhook(WebHookType::SettingValueChanged);
		hook.client_name_regex = Some("^Ord".into());
		hook.setting_name_regex = Some("^Conn".into());

		assert!(setting_changed("Orders", &["Color", "ConnectionString"]).should_send(&hook));
		assert!(!setting_changed("Orders", &["Color"]).should_send(&hook));
		assert!(!setting_changed("Billing", &["ConnectionString"]).should_send(&hook));
	}

	#[test]
	fn test_invalid_regex_never_matches() {
		let mut hook = webhook(WebHookType::SettingValueChanged);
		hook.client_name_regex = Some("([".into());
		assert!(!setting_changed("Orders", &["Color"]).should_send(&hook));
	}

	#[test]
	fn test_min_sessions_fires_on_crossing() {
		let mut hook = webhook(WebHookType::MinRunSessions);
		hook.min_sessions = Some(3);
		let data = |previous, current| {
			WebHookData::MinRunSessions(MinRunSessionsData {
				client_name: "Orders".into(),
				instance: None,
				run_sessions: current,
				previous_run_sessions: previous,
			})
		};
		assert!(data(3, 2).should_send(&hook));
		assert!(data(2, 3).should_send(&hook));
		assert!(!data(5, 4).should_send(&hook));
		assert!(!data(1, 2).should_send(&hook));

		let payload = data(3, 2).to_payload(&hook).unwrap();
		assert_eq!(payload["event"], "BelowMinimum");
		assert_eq!(payload["minimumRunSessions"], 3);
		assert_eq!(payload["runSessions"], 2);
	}

	#[test]
	fn test_security_event_payload() {
		let data = WebHookData::SecurityEvent(SecurityEventData {
			event_type: "Login".into(),
			user: Some("admin".into()),
			message: None,
			timestamp: Timestamp(0),
		});
		let hook = webhook(WebHookType::SecurityEvent);
		assert!(data.should_send(&hook));
		let payload = data.to_payload(&hook).unwrap();
		assert_eq!(payload["eventType"], "Login");
		assert_eq!(payload["timestamp"], "1970-01-01T00:00:00Z");
		assert!(payload.get("message").is_none());
	}
}

// vim: ts=4
