//! Provider tests against a mock authority
//!
//! Tests load, fallback ordering, reload idempotence and poll-driven updates

use std::sync::Arc;
use std::time::Duration;

use axum::{
	Json, Router,
	extract::State,
	http::{HeaderMap, StatusCode},
	routing::{get, post, put},
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use settlr_client::offline::OfflineCache;
use settlr_client::{ClientOpts, ClientState, ConfigurationProvider, ProviderRegistry, SnapshotSource};
use settlr_offline_adapter_fs::OfflineAdapterFs;
use settlr_types::schema::{ClientSchema, SchemaBuilder, SettingDefinition};
use settlr_types::secret::StaticSecretResolver;
use settlr_types::types::{ClientIdentity, ClientKey, SettingValue, Timestamp, TypedValue};

const SECRET: &str = "0123456789abcdef0123456789abcdef";

struct AuthorityState {
	values: Vec<SettingValue>,
	last_update: i64,
	allow_offline: bool,
	restart_requested: bool,
	register_status: StatusCode,
	settings_delay: Duration,
	registrations: usize,
	fetches: usize,
	/// When false every client call answers 503
	online: bool,
}

#[derive(Clone)]
struct Authority(Arc<Mutex<AuthorityState>>);

impl Authority {
	fn new(color: &str) -> Self {
		Self(Arc::new(Mutex::new(AuthorityState {
			values: vec![SettingValue::new("Color", TypedValue::String(color.into()))],
			last_update: 0,
			allow_offline: true,
			restart_requested: false,
			register_status: StatusCode::OK,
			settings_delay: Duration::ZERO,
			registrations: 0,
			fetches: 0,
			online: true,
		})))
	}

	fn set_color(&self, color: &str, last_update: i64) {
		let mut state = self.0.lock();
		state.values = vec![SettingValue::new("Color", TypedValue::String(color.into()))];
		state.last_update = last_update;
	}
}

async fn register(State(auth): State<Authority>, headers: HeaderMap) -> StatusCode {
	let mut state = auth.0.lock();
	state.registrations += 1;
	if headers.get("ClientSecret").and_then(|v| v.to_str().ok()) != Some(SECRET) {
		return StatusCode::UNAUTHORIZED;
	}
	state.register_status
}

async fn settings(State(auth): State<Authority>, headers: HeaderMap) -> Result<Json<Vec<SettingValue>>, StatusCode> {
	if headers.get("clientSecret").and_then(|v| v.to_str().ok()) != Some(SECRET) {
		return Err(StatusCode::UNAUTHORIZED);
	}
	let delay = {
		let state = auth.0.lock();
		if !state.online {
			return Err(StatusCode::SERVICE_UNAVAILABLE);
		}
		state.settings_delay
	};
	tokio::time::sleep(delay).await;
	let mut state = auth.0.lock();
	state.fetches += 1;
	Ok(Json(state.values.clone()))
}

async fn status(State(auth): State<Authority>) -> Result<Json<serde_json::Value>, StatusCode> {
	let state = auth.0.lock();
	if !state.online {
		return Err(StatusCode::SERVICE_UNAVAILABLE);
	}
	Ok(Json(serde_json::json!({
		"lastSettingUpdate": state.last_update,
		"allowOfflineSettings": state.allow_offline,
		"restartRequested": state.restart_requested,
		"liveReload": true,
	})))
}

async fn spawn_authority(auth: Authority) -> String {
	let app = Router::new()
		.route("/_health", get(|| async { "ok" }))
		.route("/clients", post(register))
		.route("/clients/{name}/settings", get(settings))
		.route("/statuses/{name}", put(status))
		.with_state(auth);
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, app).await.unwrap();
	});
	format!("http://{}", addr)
}

/// An address nothing listens on
async fn dead_endpoint() -> String {
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	drop(listener);
	format!("http://{}", addr)
}

fn schema() -> ClientSchema {
	let mut builder = SchemaBuilder::new("Orders", "Order service");
	builder
		.register(
			SettingDefinition::builder("Color")
				.description("Theme color")
				.default(TypedValue::String("Gray".into()))
				.build()
				.unwrap(),
		)
		.unwrap();
	builder.build(None).unwrap()
}

fn opts(uris: &[String], dir: &TempDir) -> ClientOpts {
	let mut opts = ClientOpts::new(uris);
	opts.offline_dir = Some(dir.path().to_path_buf());
	opts.ip_address = Some("127.0.0.1".into());
	opts.hostname = "test-host".into();
	opts.retry_count = 0;
	opts.request_timeout = Duration::from_millis(500);
	opts.probe_timeout = Duration::from_millis(200);
	opts
}

fn init_logging() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

async fn create_provider(opts: &ClientOpts) -> Arc<ConfigurationProvider> {
	init_logging();
	let secrets = StaticSecretResolver::new().with("Orders", SECRET);
	ConfigurationProvider::new(schema(), &secrets, opts, CancellationToken::new())
		.await
		.expect("provider creation failed")
}

async fn offline_cache(dir: &TempDir) -> OfflineCache {
	let adapter = OfflineAdapterFs::new(dir.path().into()).await.unwrap();
	let identity = ClientIdentity::new(ClientKey::new("Orders", None), SECRET);
	OfflineCache::new(Arc::new(adapter), &identity)
}

fn color(value: &str) -> Vec<SettingValue> {
	vec![SettingValue::new("Color", TypedValue::String(value.into()))]
}

#[tokio::test]
async fn test_live_value_overrides_cache() {
	let dir = TempDir::new().unwrap();
	offline_cache(&dir).await.save(&color("Blue"), Timestamp(0)).await.unwrap();

	let uri = spawn_authority(Authority::new("Red")).await;
	let provider = create_provider(&opts(&[uri], &dir)).await;

	let snapshot = provider.load().await.unwrap();
	assert_eq!(snapshot.source, SnapshotSource::Authority);
	assert_eq!(snapshot.get("Color"), Some("Red"));

	let cached = offline_cache(&dir).await.get().await.expect("cache missing");
	assert_eq!(cached.values, color("Red"));
}

#[tokio::test]
async fn test_timeout_falls_back_to_cache() {
	let dir = TempDir::new().unwrap();
	offline_cache(&dir).await.save(&color("Blue"), Timestamp(0)).await.unwrap();

	let auth = Authority::new("Red");
	auth.0.lock().settings_delay = Duration::from_secs(3);
	let uri = spawn_authority(auth).await;
	let provider = create_provider(&opts(&[uri], &dir)).await;

	let snapshot = provider.load().await.unwrap();
	assert_eq!(snapshot.source, SnapshotSource::OfflineCache);
	assert_eq!(snapshot.get("Color"), Some("Blue"));
	assert_eq!(provider.client().state(), ClientState::Disconnected);
}

#[tokio::test]
async fn test_unreachable_without_cache_uses_defaults() {
	let dir = TempDir::new().unwrap();
	let provider = create_provider(&opts(&[dead_endpoint().await], &dir)).await;

	let snapshot = provider.load().await.unwrap();
	assert_eq!(snapshot.source, SnapshotSource::Defaults);
	assert_eq!(snapshot.get("Color"), Some("Gray"));
}

#[tokio::test]
async fn test_cache_with_other_secret_is_ignored() {
	let dir = TempDir::new().unwrap();
	let adapter = OfflineAdapterFs::new(dir.path().into()).await.unwrap();
	let other = ClientIdentity::new(ClientKey::new("Orders", None), "ffffffffffffffffffffffffffffffff");
	OfflineCache::new(Arc::new(adapter), &other).save(&color("Blue"), Timestamp(0)).await.unwrap();

	let provider = create_provider(&opts(&[dead_endpoint().await], &dir)).await;
	let snapshot = provider.load().await.unwrap();
	assert_eq!(snapshot.source, SnapshotSource::Defaults);
}

#[tokio::test]
async fn test_reload_is_idempotent() {
	let dir = TempDir::new().unwrap();
	let auth = Authority::new("Red");
	let uri = spawn_authority(auth.clone()).await;
	let provider = create_provider(&opts(&[uri], &dir)).await;
	provider.load().await.unwrap();

	let before = provider.snapshot();
	let mut rx = provider.subscribe();
	rx.borrow_and_update();

	assert!(!provider.reload().await.unwrap());
	assert!(!rx.has_changed().unwrap());
	assert!(Arc::ptr_eq(&before, &provider.snapshot()));
	assert_eq!(auth.0.lock().fetches, 2);
}

#[tokio::test]
async fn test_poll_applies_newer_values() {
	let dir = TempDir::new().unwrap();
	let auth = Authority::new("Red");
	let uri = spawn_authority(auth.clone()).await;
	let provider = create_provider(&opts(&[uri], &dir)).await;
	provider.load().await.unwrap();

	// Nothing newer: no fetch
	provider.poll_once().await.unwrap();
	assert_eq!(auth.0.lock().fetches, 1);

	auth.set_color("Green", 5);
	provider.poll_once().await.unwrap();
	assert_eq!(provider.get("Color").as_deref(), Some("Green"));
	assert_eq!(provider.client().last_applied(), Timestamp(5));

	let cached = offline_cache(&dir).await.get().await.expect("cache missing");
	assert_eq!(cached.values, color("Green"));
}

#[tokio::test]
async fn test_change_within_same_second_is_picked_up() {
	let dir = TempDir::new().unwrap();
	let auth = Authority::new("Red");
	auth.set_color("Red", 5);
	let uri = spawn_authority(auth.clone()).await;
	let provider = create_provider(&opts(&[uri], &dir)).await;
	provider.load().await.unwrap();
	provider.poll_once().await.unwrap();
	assert_eq!(provider.client().last_applied(), Timestamp(5));

	let mut rx = provider.subscribe();
	rx.borrow_and_update();

	// Second change, same change marker
	auth.set_color("Green", 5);
	provider.poll_once().await.unwrap();
	assert_eq!(provider.get("Color").as_deref(), Some("Green"));
	assert!(rx.has_changed().unwrap());
	rx.borrow_and_update();

	// Re-fetching identical values publishes nothing
	provider.poll_once().await.unwrap();
	assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn test_background_polling_picks_up_change() {
	let dir = TempDir::new().unwrap();
	let auth = Authority::new("Red");
	let uri = spawn_authority(auth.clone()).await;
	let mut opts = opts(&[uri], &dir);
	opts.poll_interval = Duration::from_millis(100);
	let provider = create_provider(&opts).await;
	provider.load().await.unwrap();

	let mut rx = provider.subscribe();
	provider.start();
	auth.set_color("Green", 7);

	tokio::time::timeout(Duration::from_secs(5), rx.changed()).await.unwrap().unwrap();
	assert_eq!(rx.borrow().get("Color"), Some("Green"));

	provider.stop().await;
	assert_eq!(provider.client().state(), ClientState::Stopped);
}

#[tokio::test]
async fn test_disabled_offline_settings_remove_blob() {
	let dir = TempDir::new().unwrap();
	let auth = Authority::new("Red");
	let uri = spawn_authority(auth.clone()).await;
	let provider = create_provider(&opts(&[uri], &dir)).await;
	provider.load().await.unwrap();
	assert!(offline_cache(&dir).await.get().await.is_some());

	auth.0.lock().allow_offline = false;
	provider.poll_once().await.unwrap();
	assert!(offline_cache(&dir).await.get().await.is_none());

	// Later changes are not cached either
	auth.set_color("Green", 9);
	provider.poll_once().await.unwrap();
	assert_eq!(provider.get("Color").as_deref(), Some("Green"));
	assert!(offline_cache(&dir).await.get().await.is_none());
}

#[tokio::test]
async fn test_offline_disabled_while_disconnected_removes_blob_on_reconnect() {
	let dir = TempDir::new().unwrap();
	let auth = Authority::new("Red");
	let uri = spawn_authority(auth.clone()).await;
	let provider = create_provider(&opts(&[uri], &dir)).await;
	provider.load().await.unwrap();
	assert!(offline_cache(&dir).await.get().await.is_some());

	auth.0.lock().online = false;
	assert!(provider.poll_once().await.is_err());
	assert_eq!(provider.client().state(), ClientState::Disconnected);
	// In-memory values are kept while disconnected
	assert_eq!(provider.get("Color").as_deref(), Some("Red"));
	assert_eq!(provider.snapshot().source, SnapshotSource::Authority);

	{
		let mut state = auth.0.lock();
		state.allow_offline = false;
		state.values = color("Green");
		state.online = true;
	}
	let fetches = auth.0.lock().fetches;
	provider.poll_once().await.unwrap();

	assert_eq!(provider.client().state(), ClientState::Registered);
	assert!(offline_cache(&dir).await.get().await.is_none());
	// Reconnecting re-pulls even without a newer change marker
	assert_eq!(auth.0.lock().fetches, fetches + 1);
	assert_eq!(provider.get("Color").as_deref(), Some("Green"));
}

#[tokio::test]
async fn test_refused_registration_keeps_polling() {
	let dir = TempDir::new().unwrap();
	let auth = Authority::new("Red");
	auth.0.lock().register_status = StatusCode::UNAUTHORIZED;
	let uri = spawn_authority(auth.clone()).await;
	let provider = create_provider(&opts(&[uri], &dir)).await;

	let snapshot = provider.load().await.unwrap();
	assert_eq!(snapshot.get("Color"), Some("Red"));
	assert_eq!(provider.client().state(), ClientState::Unregistered);
	assert_eq!(auth.0.lock().registrations, 1);

	auth.set_color("Green", 3);
	provider.poll_once().await.unwrap();
	assert_eq!(provider.get("Color").as_deref(), Some("Green"));
}

#[tokio::test]
async fn test_restart_signal() {
	let dir = TempDir::new().unwrap();
	let auth = Authority::new("Red");
	let uri = spawn_authority(auth.clone()).await;
	let provider = create_provider(&opts(&[uri], &dir)).await;
	provider.load().await.unwrap();

	let restart = provider.restart_signal();
	assert!(!*restart.borrow());
	auth.0.lock().restart_requested = true;
	provider.poll_once().await.unwrap();
	assert!(*restart.borrow());
}

#[tokio::test]
async fn test_failover_binds_healthy_endpoint() {
	let dir = TempDir::new().unwrap();
	let live = spawn_authority(Authority::new("Red")).await;
	let provider = create_provider(&opts(&[dead_endpoint().await, live.clone()], &dir)).await;

	let snapshot = provider.load().await.unwrap();
	assert_eq!(snapshot.get("Color"), Some("Red"));
	assert!(format!("{:?}", provider.client()).contains(&live));
}

#[tokio::test]
async fn test_missing_secret_is_fatal() {
	let dir = TempDir::new().unwrap();
	let secrets = StaticSecretResolver::new();
	let res = ConfigurationProvider::new(
		schema(),
		&secrets,
		&opts(&[dead_endpoint().await], &dir),
		CancellationToken::new(),
	)
	.await;
	assert!(res.is_err());
}

#[tokio::test]
async fn test_registry_keeps_one_provider_per_client() {
	let dir = TempDir::new().unwrap();
	let uri = spawn_authority(Authority::new("Red")).await;
	let opts = opts(&[uri], &dir);
	let registry = ProviderRegistry::new();
	let key = ClientKey::new("Orders", None);

	let first = registry.get_or_insert(&key, || async { Ok(create_provider(&opts).await) }).await.unwrap();
	let second = registry.get_or_insert(&key, || async { Ok(create_provider(&opts).await) }).await.unwrap();
	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(registry.len(), 1);

	assert!(registry.register(Arc::clone(&first)).is_err());
	assert!(registry.unregister(&key).is_some());
	assert!(registry.lookup(&key).is_none());
}

// vim: ts=4
