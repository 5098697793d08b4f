//! Configuration provider
//!
//! Serves a flat key/value view of a client's settings. `load()` is awaited by the host
//! before it starts; afterwards a background task polls the authority and swaps in a new
//! snapshot whenever values change.
//!
//! Fallback order when the authority cannot be reached:
//! in-memory snapshot, then the offline cache, then the schema defaults.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::SettlrClient;
use crate::offline::OfflineCache;
use crate::opts::ClientOpts;
use crate::prelude::*;
use settlr_offline_adapter_fs::OfflineAdapterFs;
use settlr_types::schema::ClientSchema;
use settlr_types::secret::SecretResolver;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where the values of a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
	Empty,
	Defaults,
	OfflineCache,
	Authority,
}

/// Immutable view of a client's configuration
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
	/// Flat configuration keys, JSON values expanded to `Parent:child:0` style keys
	pub values: BTreeMap<String, String>,
	pub settings: Vec<SettingValue>,
	pub source: SnapshotSource,
	pub last_setting_update: Timestamp,
}

impl ConfigSnapshot {
	pub fn empty() -> Self {
		Self {
			values: BTreeMap::new(),
			settings: Vec::new(),
			source: SnapshotSource::Empty,
			last_setting_update: Timestamp(0),
		}
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.values.get(key).map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

fn flatten_json(out: &mut BTreeMap<String, String>, prefix: &str, value: &serde_json::Value) {
	match value {
		serde_json::Value::Object(map) => {
			for (key, child) in map {
				flatten_json(out, &format!("{}:{}", prefix, key), child);
			}
		}
		serde_json::Value::Array(items) => {
			for (idx, child) in items.iter().enumerate() {
				flatten_json(out, &format!("{}:{}", prefix, idx), child);
			}
		}
		serde_json::Value::Null => {}
		serde_json::Value::String(s) => {
			out.insert(prefix.to_string(), s.clone());
		}
		other => {
			out.insert(prefix.to_string(), other.to_string());
		}
	}
}

/// Build the flat key map. Settings missing from `settings` fall back to `defaults`.
pub fn flatten_settings(
	settings: &[SettingValue],
	defaults: &[SettingValue],
) -> BTreeMap<String, String> {
	let mut out = BTreeMap::new();
	let present = |name: &str| settings.iter().any(|s| s.name == name);
	let merged = settings.iter().chain(defaults.iter().filter(|d| !present(&d.name)));

	for setting in merged {
		let Some(value) = &setting.value else { continue };
		out.insert(setting.name.clone(), value.to_config_string());
		if let TypedValue::Json(json) = value {
			flatten_json(&mut out, &setting.name, json);
		}
	}
	out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyResult {
	Changed,
	Unchanged,
	Stale,
}

struct Current {
	snapshot: Arc<ConfigSnapshot>,
	applied_generation: u64,
}

pub struct ConfigurationProvider {
	client: SettlrClient,
	schema: ClientSchema,
	defaults: Vec<SettingValue>,
	offline: Option<OfflineCache>,
	current: RwLock<Current>,
	snapshot_tx: watch::Sender<Arc<ConfigSnapshot>>,
	restart_tx: watch::Sender<bool>,
	next_generation: AtomicU64,
	/// Newest authority change time seen in a status response
	latest_update: AtomicI64,
	offline_allowed: AtomicBool,
	blob_may_exist: AtomicBool,
	needs_registration: AtomicBool,
	cancel: CancellationToken,
	poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConfigurationProvider {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConfigurationProvider")
			.field("client", &self.client)
			.field("source", &self.snapshot().source)
			.finish_non_exhaustive()
	}
}

impl ConfigurationProvider {
	/// Resolve the secret, bind the transport and open the offline cache.
	///
	/// Fails only when no secret is available or the endpoint configuration is invalid.
	pub async fn new(
		mut schema: ClientSchema,
		secrets: &dyn SecretResolver,
		opts: &ClientOpts,
		cancel: CancellationToken,
	) -> ClResult<Arc<Self>> {
		let secret = secrets.get_secret(&schema.name)?;
		if schema.instance.is_none() {
			schema.instance.clone_from(&opts.instance);
		}
		let identity = ClientIdentity::new(
			ClientKey::new(schema.name.clone(), schema.instance.as_deref()),
			secret,
		);

		let offline = if opts.offline_settings { open_offline_cache(opts, &identity).await } else { None };
		let client = SettlrClient::connect(identity, opts, &cancel).await?;
		Ok(Self::with_parts(client, schema, offline, cancel))
	}

	/// Assemble from already constructed parts
	pub fn with_parts(
		client: SettlrClient,
		schema: ClientSchema,
		offline: Option<OfflineCache>,
		cancel: CancellationToken,
	) -> Arc<Self> {
		let empty = Arc::new(ConfigSnapshot::empty());
		let (snapshot_tx, _) = watch::channel(Arc::clone(&empty));
		let (restart_tx, _) = watch::channel(false);
		let defaults = schema.default_values();
		Arc::new(Self {
			client,
			schema,
			defaults,
			offline,
			current: RwLock::new(Current { snapshot: empty, applied_generation: 0 }),
			snapshot_tx,
			restart_tx,
			next_generation: AtomicU64::new(1),
			latest_update: AtomicI64::new(0),
			offline_allowed: AtomicBool::new(true),
			blob_may_exist: AtomicBool::new(true),
			needs_registration: AtomicBool::new(false),
			cancel,
			poll_task: Mutex::new(None),
		})
	}

	pub fn client(&self) -> &SettlrClient {
		&self.client
	}

	pub fn key(&self) -> &ClientKey {
		&self.client.identity().key
	}

	pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
		Arc::clone(&self.current.read().snapshot)
	}

	pub fn get(&self, key: &str) -> Option<String> {
		self.current.read().snapshot.get(key).map(str::to_string)
	}

	/// Receives every published snapshot
	pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
		self.snapshot_tx.subscribe()
	}

	/// Flips to true when the authority asks the host to restart
	pub fn restart_signal(&self) -> watch::Receiver<bool> {
		self.restart_tx.subscribe()
	}

	fn issue_generation(&self) -> u64 {
		self.next_generation.fetch_add(1, Ordering::Relaxed)
	}

	fn offline_cache(&self) -> Option<&OfflineCache> {
		self.offline.as_ref().filter(|_| self.offline_allowed.load(Ordering::Relaxed))
	}

	/// Swap in a new snapshot unless it is stale or identical to the current one
	fn apply(
		&self,
		generation: u64,
		settings: Vec<SettingValue>,
		last_setting_update: Timestamp,
		source: SnapshotSource,
	) -> ApplyResult {
		let snapshot = {
			let mut current = self.current.write();
			if generation <= current.applied_generation {
				debug!(client = %self.key(), generation, "discarding stale configuration");
				return ApplyResult::Stale;
			}
			current.applied_generation = generation;
			if current.snapshot.source == source && current.snapshot.settings == settings {
				return ApplyResult::Unchanged;
			}
			let snapshot = Arc::new(ConfigSnapshot {
				values: flatten_settings(&settings, &self.defaults),
				settings,
				source,
				last_setting_update,
			});
			current.snapshot = Arc::clone(&snapshot);
			snapshot
		};
		info!(
			client = %self.key(),
			source = ?source,
			"configuration updated ({} keys)", snapshot.values.len()
		);
		self.snapshot_tx.send_replace(snapshot);
		ApplyResult::Changed
	}

	/// Initial load: register, fetch, or fall back. Never fails on network errors.
	pub async fn load(&self) -> ClResult<Arc<ConfigSnapshot>> {
		match self.client.register(&self.schema, &self.cancel).await {
			Ok(()) => {}
			Err(Error::Cancelled) => return Err(Error::Cancelled),
			Err(e) if e.is_transient() => {
				self.needs_registration.store(true, Ordering::Relaxed);
				warn!(client = %self.key(), "registration failed, using fallback configuration: {}", e);
				self.apply_fallback().await;
				return Ok(self.snapshot());
			}
			// Refused or rejected: a previously registered client keeps working
			Err(e) => debug!(client = %self.key(), "continuing without registration: {}", e),
		}

		match self.reload().await {
			Ok(_) => {}
			Err(Error::Cancelled) => return Err(Error::Cancelled),
			Err(e) => {
				warn!(client = %self.key(), "initial fetch failed, using fallback configuration: {}", e);
				self.apply_fallback().await;
			}
		}
		Ok(self.snapshot())
	}

	/// Fetch values from the authority and apply them.
	///
	/// Returns true when the snapshot changed. Identical values cause no event and no
	/// cache write.
	pub async fn reload(&self) -> ClResult<bool> {
		let generation = self.issue_generation();
		let settings = self.client.fetch_settings(&self.cancel).await?;

		let newest_value = settings
			.iter()
			.filter_map(|s| s.last_changed.as_ref().map(|c| c.at))
			.max()
			.unwrap_or_default();
		let last_update =
			newest_value.max(Timestamp(self.latest_update.load(Ordering::Relaxed)));

		let result =
			self.apply(generation, settings.clone(), last_update, SnapshotSource::Authority);
		if result == ApplyResult::Stale {
			return Ok(false);
		}
		self.client.mark_applied(last_update);

		if result == ApplyResult::Changed {
			self.save_offline(&settings, last_update).await;
		}
		Ok(result == ApplyResult::Changed)
	}

	async fn save_offline(&self, settings: &[SettingValue], last_update: Timestamp) {
		if self.cancel.is_cancelled() {
			return;
		}
		if let Some(offline) = self.offline_cache() {
			match offline.save(settings, last_update).await {
				Ok(()) => self.blob_may_exist.store(true, Ordering::Relaxed),
				Err(e) => warn!(client = %self.key(), "failed to save offline settings: {}", e),
			}
		}
	}

	/// Offline cache, then defaults. Live values already in memory are kept.
	async fn apply_fallback(&self) {
		let source = self.snapshot().source;
		if matches!(source, SnapshotSource::Authority | SnapshotSource::OfflineCache) {
			return;
		}
		let generation = self.issue_generation();

		if let Some(offline) = self.offline_cache() {
			if let Some(cached) = offline.get().await {
				info!(client = %self.key(), "using offline settings saved at {}", cached.saved_at);
				self.apply(
					generation,
					cached.values,
					cached.last_setting_update,
					SnapshotSource::OfflineCache,
				);
				return;
			}
		}
		if source == SnapshotSource::Empty {
			info!(client = %self.key(), "using default settings");
			self.apply(generation, self.defaults.clone(), Timestamp(0), SnapshotSource::Defaults);
		}
	}

	/// One poll cycle
	pub async fn poll_once(&self) -> ClResult<()> {
		let outcome = match self.client.poll(false, &self.cancel).await {
			Ok(outcome) => outcome,
			Err(e) => {
				if e.is_transient() {
					self.apply_fallback().await;
				}
				return Err(e);
			}
		};
		let status = &outcome.status;
		self.latest_update.fetch_max(status.last_setting_update.0, Ordering::Relaxed);

		self.offline_allowed.store(status.allow_offline_settings, Ordering::Relaxed);
		if !status.allow_offline_settings && self.blob_may_exist.swap(false, Ordering::Relaxed) {
			if let Some(offline) = &self.offline {
				info!(client = %self.key(), "offline settings disabled, removing cached settings");
				if let Err(e) = offline.delete().await {
					warn!(client = %self.key(), "failed to remove offline settings: {}", e);
				}
			}
		}

		if status.restart_requested && !*self.restart_tx.borrow() {
			info!(client = %self.key(), "restart requested by the authority");
			self.restart_tx.send_replace(true);
		}

		if outcome.reconnected && self.needs_registration.swap(false, Ordering::Relaxed) {
			if let Err(e) = self.client.register(&self.schema, &self.cancel).await {
				debug!(client = %self.key(), "registration after reconnect failed: {}", e);
			}
		}

		let on_fallback = self.snapshot().source != SnapshotSource::Authority;
		if outcome.reconnected || outcome.change_available {
			if status.live_reload || on_fallback {
				self.reload().await?;
			} else {
				info!(client = %self.key(), "settings update available, live reload is disabled");
			}
		}
		Ok(())
	}

	async fn poll_loop(&self) {
		let mut period = self.poll_period();
		let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				biased;
				() = self.cancel.cancelled() => break,
				_ = ticker.tick() => {}
			}
			match self.poll_once().await {
				Ok(()) | Err(Error::Cancelled) => {}
				Err(e) => debug!(client = %self.key(), "poll failed: {}", e),
			}

			let new_period = self.poll_period();
			if new_period != period {
				debug!(client = %self.key(), "poll interval changed to {:?}", new_period);
				period = new_period;
				ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
				ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			}
		}
		info!(client = %self.key(), "poll loop stopped");
	}

	fn poll_period(&self) -> Duration {
		Duration::from_millis(self.client.run_session().poll_interval_ms).max(MIN_POLL_INTERVAL)
	}

	/// Start background polling (no-op when already running)
	pub fn start(self: &Arc<Self>) {
		let mut task = self.poll_task.lock();
		if task.is_some() {
			return;
		}
		let this = Arc::clone(self);
		*task = Some(tokio::spawn(async move { this.poll_loop().await }));
	}

	/// Stop polling and wait for the background task
	pub async fn stop(&self) {
		self.cancel.cancel();
		self.client.stop();
		let task = self.poll_task.lock().take();
		if let Some(task) = task {
			if let Err(e) = task.await {
				warn!(client = %self.key(), "poll task ended abnormally: {}", e);
			}
		}
	}
}

async fn open_offline_cache(opts: &ClientOpts, identity: &ClientIdentity) -> Option<OfflineCache> {
	let dir = match opts.offline_dir() {
		Ok(dir) => dir,
		Err(e) => {
			warn!(client = %identity.key, "offline settings unavailable: {}", e);
			return None;
		}
	};
	match OfflineAdapterFs::new(dir.into_boxed_path()).await {
		Ok(adapter) => Some(OfflineCache::new(Arc::new(adapter), identity)),
		Err(e) => {
			warn!(client = %identity.key, "offline settings unavailable: {}", e);
			None
		}
	}
}


// vim: ts=4
