//! Wire format of the authority's client API

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use url::{Position, Url};

use crate::prelude::*;

pub const HEADER_CLIENT_SECRET_REGISTER: &str = "ClientSecret";
pub const HEADER_CLIENT_SECRET: &str = "clientSecret";
pub const HEADER_IP_ADDRESS: &str = "Fig_IpAddress";
pub const HEADER_HOSTNAME: &str = "Fig_Hostname";

pub const REGISTER_PATH: &str = "/clients";

/// Query parameters attached to every client call
pub type Query<'a> = [(&'a str, &'a str)];

pub fn settings_path(client_name: &str, query: &Query<'_>) -> ClResult<String> {
	endpoint_path(&["clients", client_name, "settings"], query)
}

pub fn status_path(client_name: &str, query: &Query<'_>) -> ClResult<String> {
	endpoint_path(&["statuses", client_name], query)
}

/// Path and query relative to the authority base URI, every segment percent-encoded
fn endpoint_path(segments: &[&str], query: &Query<'_>) -> ClResult<String> {
	let mut url = Url::parse("http://authority/")
		.map_err(|e| Error::Internal(format!("invalid endpoint base: {}", e)))?;
	url.path_segments_mut()
		.map_err(|()| Error::Internal("endpoint base cannot carry a path".into()))?
		.clear()
		.extend(segments);
	if !query.is_empty() {
		url.query_pairs_mut().extend_pairs(query);
	}
	Ok(url[Position::BeforePath..].to_string())
}

/// Status report sent on every poll
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
	pub run_session_id: uuid::Uuid,
	pub start_time_utc: Timestamp,
	/// Last authority change applied locally
	pub last_setting_update: Timestamp,
	pub poll_interval_ms: u64,
	pub live_reload: bool,
	pub offline_settings_enabled: bool,
	pub app_version: Option<String>,
	pub hostname: String,
	pub has_config_error: bool,
}

/// Authority answer to a status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
	/// Time of the latest setting change for this client
	pub last_setting_update: Timestamp,
	#[serde(default)]
	pub poll_interval_ms: Option<u64>,
	#[serde(default = "default_true")]
	pub live_reload: bool,
	#[serde(default = "default_true")]
	pub allow_offline_settings: bool,
	#[serde(default)]
	pub restart_requested: bool,
}

fn default_true() -> bool {
	true
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_paths_are_encoded() {
		assert_eq!(settings_path("Order Service", &[]).unwrap(), "/clients/Order%20Service/settings");
		assert_eq!(status_path("orders/v2", &[]).unwrap(), "/statuses/orders%2Fv2");
	}

	#[test]
	fn test_query_is_encoded() {
		let path = status_path("orders", &[("runSessionId", "abc"), ("instance", "eu&west")]).unwrap();
		assert_eq!(path, "/statuses/orders?runSessionId=abc&instance=eu%26west");
	}

	#[test]
	fn test_status_response_defaults() {
		let resp: StatusResponse = serde_json::from_str(r#"{"lastSettingUpdate": 17}"#).unwrap();
		assert_eq!(resp.last_setting_update, Timestamp(17));
		assert!(resp.live_reload);
		assert!(resp.allow_offline_settings);
		assert!(!resp.restart_requested);
		assert_eq!(resp.poll_interval_ms, None);
	}
}

// vim: ts=4
