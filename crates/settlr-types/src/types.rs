//! Common types used throughout Settlr.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::time::SystemTime;

// Timestamp //
//***********//
/// Unix timestamp in seconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let secs = SystemTime::now()
			.duration_since(SystemTime::UNIX_EPOCH)
			.map(|d| d.as_secs())
			.unwrap_or_default();
		Timestamp(i64::try_from(secs).unwrap_or(i64::MAX))
	}

	pub fn from_now(delta: i64) -> Timestamp {
		Timestamp(Self::now().0.saturating_add(delta))
	}

	pub fn to_iso_string(&self) -> String {
		chrono::DateTime::<chrono::Utc>::from_timestamp(self.0, 0)
			.map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
			.unwrap_or_default()
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

/// Serialize a timestamp as an RFC 3339 string (webhook payloads)
pub fn serialize_timestamp_iso<S>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_str(&ts.to_iso_string())
}

// ClientKey //
//***********//
/// Name + optional instance, the identity of a logical client
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientKey {
	pub name: Box<str>,
	pub instance: Option<Box<str>>,
}

impl ClientKey {
	pub fn new(name: impl Into<Box<str>>, instance: Option<&str>) -> Self {
		Self { name: name.into(), instance: instance.filter(|i| !i.is_empty()).map(Into::into) }
	}
}

impl std::fmt::Display for ClientKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.instance {
			Some(instance) => write!(f, "{}/{}", self.name, instance),
			None => write!(f, "{}", self.name),
		}
	}
}

/// Client identity for one run session. The secret authenticates the client and keys
/// the offline cache encryption.
#[derive(Clone)]
pub struct ClientIdentity {
	pub key: ClientKey,
	pub secret: Box<str>,
}

impl ClientIdentity {
	pub fn new(key: ClientKey, secret: impl Into<Box<str>>) -> Self {
		Self { key, secret: secret.into() }
	}

	pub fn name(&self) -> &str {
		&self.key.name
	}

	pub fn instance(&self) -> Option<&str> {
		self.key.instance.as_deref()
	}
}

impl std::fmt::Debug for ClientIdentity {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClientIdentity")
			.field("key", &self.key)
			.field("secret", &"<redacted>")
			.finish()
	}
}

// TypedValue //
//************//
/// Setting value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)] // No type tag - type inferred from the setting definition
pub enum TypedValue {
	Bool(bool), // Must be before Int to avoid bool -> int coercion
	Int(i64),
	Double(f64),
	String(String),
	Json(serde_json::Value),
}

impl TypedValue {
	/// Check if this value matches the type of another value
	pub fn matches_type(&self, other: &TypedValue) -> bool {
		matches!(
			(self, other),
			(TypedValue::String(_), TypedValue::String(_))
				| (TypedValue::Int(_), TypedValue::Int(_))
				| (TypedValue::Double(_), TypedValue::Double(_))
				| (TypedValue::Bool(_), TypedValue::Bool(_))
				| (TypedValue::Json(_), TypedValue::Json(_))
		)
	}

	pub fn type_name(&self) -> &'static str {
		match self {
			TypedValue::String(_) => "string",
			TypedValue::Int(_) => "int",
			TypedValue::Double(_) => "double",
			TypedValue::Bool(_) => "bool",
			TypedValue::Json(_) => "json",
		}
	}

	/// String form used by the flat configuration map
	pub fn to_config_string(&self) -> String {
		match self {
			TypedValue::Bool(b) => b.to_string(),
			TypedValue::Int(i) => i.to_string(),
			TypedValue::Double(d) => d.to_string(),
			TypedValue::String(s) => s.clone(),
			TypedValue::Json(j) => j.to_string(),
		}
	}
}

/// Who changed a setting, when and why
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastChanged {
	pub by: Option<String>,
	pub at: Timestamp,
	pub message: Option<String>,
}

/// A setting value as owned by the authority
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingValue {
	pub name: String,
	pub value: Option<TypedValue>,
	#[serde(default)]
	pub is_secret: bool,
	pub last_changed: Option<LastChanged>,
}

impl SettingValue {
	pub fn new(name: impl Into<String>, value: TypedValue) -> Self {
		Self { name: name.into(), value: Some(value), is_secret: false, last_changed: None }
	}
}

/// Run session of a client process, tracked by the authority
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSession {
	pub run_session_id: uuid::Uuid,
	pub start_time_utc: Timestamp,
	pub last_seen: Timestamp,
	pub poll_interval_ms: u64,
	pub live_reload: bool,
	pub offline_settings_enabled: bool,
}

impl RunSession {
	pub fn start(poll_interval_ms: u64, live_reload: bool, offline_settings_enabled: bool) -> Self {
		let now = Timestamp::now();
		Self {
			run_session_id: uuid::Uuid::new_v4(),
			start_time_utc: now,
			last_seen: now,
			poll_interval_ms,
			live_reload,
			offline_settings_enabled,
		}
	}
}


// vim: ts=4
