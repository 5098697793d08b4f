//! Registration and poll client
//!
//! Tracks the connection state of one client towards the authority:
//!
//! ```text
//! Unregistered -> Registering -> Registered <-> Disconnected
//!                                    |
//!                                 Stopped
//! ```
//!
//! A refused registration (401) leaves the client `Unregistered` but polling goes on,
//! since a client registered earlier keeps working with its existing schema.

use hyper::Method;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::api::{self, StatusRequest, StatusResponse};
use crate::opts::{ClientOpts, local_ip_address};
use crate::prelude::*;
use crate::transport::{self, BoundClient, TransportOpts};
use settlr_types::schema::ClientSchema;
use settlr_types::types::RunSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
	Unregistered,
	Registering,
	Registered,
	Disconnected,
	Stopped,
}

/// Result of a successful poll
#[derive(Debug, Clone)]
pub struct PollOutcome {
	pub status: StatusResponse,
	/// The authority may have values not applied locally
	pub change_available: bool,
	/// First successful call after the authority was unreachable
	pub reconnected: bool,
}

/// Change markers have one-second resolution: a marker equal to the applied one may hide
/// a second change made within the same second. Such polls re-fetch, the provider drops
/// identical results.
fn may_have_changed(authority: Timestamp, applied: Timestamp) -> bool {
	authority > applied || (authority == applied && applied > Timestamp(0))
}

pub struct SettlrClient {
	identity: ClientIdentity,
	transport: BoundClient,
	session: Mutex<RunSession>,
	state: RwLock<ClientState>,
	last_applied: Mutex<Timestamp>,
	hostname: String,
	ip_address: String,
	app_version: String,
	offline_requested: bool,
}

impl std::fmt::Debug for SettlrClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SettlrClient")
			.field("client", &self.identity.key)
			.field("endpoint", &self.transport.base_uri())
			.field("state", &*self.state.read())
			.finish_non_exhaustive()
	}
}

impl SettlrClient {
	/// Bind the transport and start a new run session
	pub async fn connect(
		identity: ClientIdentity,
		opts: &ClientOpts,
		cancel: &CancellationToken,
	) -> ClResult<Self> {
		let transport =
			transport::create_client(&opts.api_uris, TransportOpts::from(opts), cancel).await?;
		Ok(Self::with_transport(identity, opts, transport))
	}

	pub fn with_transport(identity: ClientIdentity, opts: &ClientOpts, transport: BoundClient) -> Self {
		let session =
			RunSession::start(opts.poll_interval_ms(), opts.live_reload, opts.offline_settings);
		info!(
			client = %identity.key,
			run_session = %session.run_session_id,
			endpoint = %transport.base_uri(),
			"run session started"
		);
		Self {
			identity,
			transport,
			session: Mutex::new(session),
			state: RwLock::new(ClientState::Unregistered),
			last_applied: Mutex::new(Timestamp(0)),
			hostname: opts.hostname.clone(),
			ip_address: opts.ip_address.clone().or_else(local_ip_address).unwrap_or_default(),
			app_version: opts.app_version.clone(),
			offline_requested: opts.offline_settings,
		}
	}

	pub fn identity(&self) -> &ClientIdentity {
		&self.identity
	}

	pub fn state(&self) -> ClientState {
		*self.state.read()
	}

	pub fn run_session(&self) -> RunSession {
		self.session.lock().clone()
	}

	/// Authority change time of the values currently applied
	pub fn last_applied(&self) -> Timestamp {
		*self.last_applied.lock()
	}

	pub fn mark_applied(&self, last_setting_update: Timestamp) {
		let mut last_applied = self.last_applied.lock();
		if last_setting_update > *last_applied {
			*last_applied = last_setting_update;
		}
	}

	pub fn stop(&self) {
		self.set_state(ClientState::Stopped);
	}

	fn set_state(&self, new_state: ClientState) {
		let mut state = self.state.write();
		if *state == ClientState::Stopped || *state == new_state {
			return;
		}
		debug!(client = %self.identity.key, "state {:?} -> {:?}", *state, new_state);
		*state = new_state;
	}

	fn ensure_running(&self) -> ClResult<()> {
		if self.state() == ClientState::Stopped {
			return Err(Error::Cancelled);
		}
		Ok(())
	}

	/// State after a failed call
	fn record_failure(&self, err: &Error) {
		if err.is_transient() && self.state() != ClientState::Disconnected {
			warn!(client = %self.identity.key, "authority unreachable: {}", err);
			self.set_state(ClientState::Disconnected);
		}
	}

	/// Client endpoint path carrying the run session and instance query
	fn endpoint(&self, path: fn(&str, &api::Query<'_>) -> ClResult<String>) -> ClResult<String> {
		let session_id = self.session.lock().run_session_id.to_string();
		let mut query = vec![("runSessionId", session_id.as_str())];
		if let Some(instance) = self.identity.instance() {
			query.push(("instance", instance));
		}
		path(self.identity.name(), &query)
	}

	fn poll_headers(&self) -> Vec<(&str, &str)> {
		let mut headers = vec![
			(api::HEADER_CLIENT_SECRET, &*self.identity.secret),
			(api::HEADER_HOSTNAME, self.hostname.as_str()),
		];
		if !self.ip_address.is_empty() {
			headers.push((api::HEADER_IP_ADDRESS, self.ip_address.as_str()));
		}
		headers
	}

	/// Send the schema to the authority
	pub async fn register(&self, schema: &ClientSchema, cancel: &CancellationToken) -> ClResult<()> {
		self.ensure_running()?;
		self.set_state(ClientState::Registering);

		let headers = [(api::HEADER_CLIENT_SECRET_REGISTER, &*self.identity.secret)];
		let res = self
			.transport
			.send_json(Method::POST, api::REGISTER_PATH, &headers, schema, cancel)
			.await;
		match res {
			Ok(_) => {
				info!(client = %self.identity.key, "registered {} settings", schema.settings.len());
				self.set_state(ClientState::Registered);
				Ok(())
			}
			Err(Error::Unauthorized) => {
				warn!(
					client = %self.identity.key,
					"registration refused, the secret does not match the registered client"
				);
				self.set_state(ClientState::Unregistered);
				Err(Error::Unauthorized)
			}
			Err(e) => {
				if e.is_transient() {
					self.record_failure(&e);
				} else {
					self.set_state(ClientState::Unregistered);
				}
				Err(e)
			}
		}
	}

	/// Current values from the authority
	pub async fn fetch_settings(&self, cancel: &CancellationToken) -> ClResult<Vec<SettingValue>> {
		self.ensure_running()?;
		let path = self.endpoint(api::settings_path)?;
		let res = self.transport.get_json::<Vec<SettingValue>>(&path, &self.poll_headers(), cancel).await;
		match res {
			Ok(values) => {
				self.mark_reachable();
				Ok(values)
			}
			Err(e) => {
				self.record_failure(&e);
				Err(e)
			}
		}
	}

	/// Report the run session status and learn whether newer values exist
	pub async fn poll(&self, has_config_error: bool, cancel: &CancellationToken) -> ClResult<PollOutcome> {
		self.ensure_running()?;
		let request = {
			let session = self.session.lock();
			StatusRequest {
				run_session_id: session.run_session_id,
				start_time_utc: session.start_time_utc,
				last_setting_update: self.last_applied(),
				poll_interval_ms: session.poll_interval_ms,
				live_reload: session.live_reload,
				offline_settings_enabled: session.offline_settings_enabled,
				app_version: (!self.app_version.is_empty()).then(|| self.app_version.clone()),
				hostname: self.hostname.clone(),
				has_config_error,
			}
		};
		let path = self.endpoint(api::status_path)?;

		let res = self
			.transport
			.send_json(Method::PUT, &path, &self.poll_headers(), &request, cancel)
			.await
			.and_then(|resp| resp.json::<StatusResponse>());
		let status = match res {
			Ok(status) => status,
			Err(e) => {
				self.record_failure(&e);
				return Err(e);
			}
		};

		let reconnected = self.mark_reachable();
		{
			let mut session = self.session.lock();
			session.last_seen = Timestamp::now();
			if let Some(interval) = status.poll_interval_ms.filter(|ms| *ms > 0) {
				session.poll_interval_ms = interval;
			}
			session.live_reload = status.live_reload;
			session.offline_settings_enabled = self.offline_requested && status.allow_offline_settings;
		}
		let change_available = may_have_changed(status.last_setting_update, self.last_applied());
		Ok(PollOutcome { status, change_available, reconnected })
	}

	/// Returns true when this ends a disconnect
	fn mark_reachable(&self) -> bool {
		let mut state = self.state.write();
		match *state {
			ClientState::Disconnected => {
				info!(client = %self.identity.key, "authority reachable again");
				*state = ClientState::Registered;
				true
			}
			ClientState::Registering => {
				*state = ClientState::Registered;
				false
			}
			_ => false,
		}
	}
}


// vim: ts=4
