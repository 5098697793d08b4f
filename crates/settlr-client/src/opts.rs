//! Client options

use std::path::PathBuf;
use std::time::Duration;

use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct ClientOpts {
	/// Candidate authority endpoints, probed in order
	pub api_uris: Vec<String>,
	pub instance: Option<String>,
	pub poll_interval: Duration,
	pub live_reload: bool,
	/// Keep an encrypted copy of the last good settings on disk
	pub offline_settings: bool,
	/// Number of retries after the first attempt (0 under constrained hosting)
	pub retry_count: u16,
	pub request_timeout: Duration,
	pub probe_timeout: Duration,
	/// Maximum age of the connection pool; a new pool is opened after it, idle
	/// connections are also closed after this long
	pub pool_lease: Duration,
	pub offline_dir: Option<PathBuf>,
	pub app_version: String,
	pub hostname: String,
	pub ip_address: Option<String>,
}

impl Default for ClientOpts {
	fn default() -> Self {
		Self {
			api_uris: Vec::new(),
			instance: None,
			poll_interval: Duration::from_secs(30),
			live_reload: true,
			offline_settings: true,
			retry_count: 2,
			request_timeout: Duration::from_secs(10),
			probe_timeout: Duration::from_secs(2),
			pool_lease: Duration::from_secs(300),
			offline_dir: None,
			app_version: String::new(),
			hostname: default_hostname(),
			ip_address: None,
		}
	}
}

impl ClientOpts {
	pub fn new<S: AsRef<str>>(api_uris: &[S]) -> Self {
		Self {
			api_uris: api_uris.iter().map(|u| u.as_ref().trim_end_matches('/').to_string()).collect(),
			..Self::default()
		}
	}

	/// Defaults overridden by `SETTLR_API_URI` (comma separated), `SETTLR_INSTANCE`,
	/// `SETTLR_POLL_INTERVAL_MS` and `SETTLR_OFFLINE_DIR`
	pub fn from_env() -> ClResult<Self> {
		let mut opts = Self::default();

		if let Ok(uris) = std::env::var("SETTLR_API_URI") {
			opts.api_uris = uris
				.split(',')
				.map(|u| u.trim().trim_end_matches('/'))
				.filter(|u| !u.is_empty())
				.map(str::to_string)
				.collect();
		}
		if let Ok(instance) = std::env::var("SETTLR_INSTANCE") {
			let instance = instance.trim();
			if !instance.is_empty() {
				opts.instance = Some(instance.to_string());
			}
		}
		if let Ok(interval) = std::env::var("SETTLR_POLL_INTERVAL_MS") {
			let ms: u64 = interval.trim().parse().map_err(|_| {
				Error::ConfigError(format!("SETTLR_POLL_INTERVAL_MS is not a number: {}", interval))
			})?;
			opts.poll_interval = Duration::from_millis(ms);
		}
		if let Ok(dir) = std::env::var("SETTLR_OFFLINE_DIR") {
			opts.offline_dir = Some(PathBuf::from(dir));
		}

		if opts.api_uris.is_empty() {
			return Err(Error::ConfigError("SETTLR_API_URI is not set".into()));
		}
		Ok(opts)
	}

	pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
		self.instance = Some(instance.into());
		self
	}

	pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
		self.app_version = version.into();
		self
	}

	/// Offline directory, `<data_local_dir>/settlr/offline` unless configured
	pub fn offline_dir(&self) -> ClResult<PathBuf> {
		if let Some(dir) = &self.offline_dir {
			return Ok(dir.clone());
		}
		dirs::data_local_dir()
			.map(|d| d.join("settlr").join("offline"))
			.ok_or_else(|| Error::ConfigError("no local data directory available".into()))
	}

	pub fn poll_interval_ms(&self) -> u64 {
		u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX)
	}
}

fn default_hostname() -> String {
	std::env::var("HOSTNAME")
		.or_else(|_| std::env::var("COMPUTERNAME"))
		.unwrap_or_else(|_| "unknown".to_string())
}

/// Outbound address of this host, best effort (no packet is sent)
pub fn local_ip_address() -> Option<String> {
	let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
	socket.connect("8.8.8.8:80").ok()?;
	socket.local_addr().ok().map(|addr| addr.ip().to_string())
}


// vim: ts=4
