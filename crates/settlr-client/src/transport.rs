//! Resilient transport
//!
//! An HTTP client bound to one authority endpoint. With several candidate endpoints the
//! first one answering the health probe wins; when none answers the first candidate is
//! used anyway, so the poll loop can keep trying it.
//!
//! Every request has a timeout, honors a cancellation token and is retried with
//! exponential backoff on transient failures only. The connection pool is replaced once
//! its lease expires, so endpoint DNS changes are picked up even while connections stay busy.

use std::time::{Duration, Instant};

use http_body_util::{BodyExt, Full};
use hyper::Method;
use hyper::body::Bytes;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;

use crate::opts::ClientOpts;
use crate::prelude::*;

pub const HEALTH_PATH: &str = "/_health";

/// Retry policy for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	pub wait_min_max: (Duration, Duration),
	/// Retries after the first attempt
	pub times: u16,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self { wait_min_max: (Duration::from_millis(200), Duration::from_secs(5)), times: 2 }
	}
}

impl RetryPolicy {
	pub fn new(wait_min_max: (Duration, Duration), times: u16) -> Self {
		Self { wait_min_max, times }
	}

	pub fn none() -> Self {
		Self { times: 0, ..Self::default() }
	}

	pub fn should_retry(&self, attempt: u16) -> bool {
		attempt < self.times
	}

	/// min * 2^attempt, capped at max
	pub fn calculate_backoff(&self, attempt: u16) -> Duration {
		let (min, max) = self.wait_min_max;
		min.saturating_mul(2u32.saturating_pow(u32::from(attempt))).min(max)
	}
}

#[derive(Debug, Clone)]
pub struct TransportOpts {
	pub request_timeout: Duration,
	pub probe_timeout: Duration,
	pub pool_lease: Duration,
	pub retry: RetryPolicy,
}

impl Default for TransportOpts {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(10),
			probe_timeout: Duration::from_secs(2),
			pool_lease: Duration::from_secs(300),
			retry: RetryPolicy::default(),
		}
	}
}

impl From<&ClientOpts> for TransportOpts {
	fn from(opts: &ClientOpts) -> Self {
		Self {
			request_timeout: opts.request_timeout,
			probe_timeout: opts.probe_timeout,
			pool_lease: opts.pool_lease,
			retry: RetryPolicy { times: opts.retry_count, ..RetryPolicy::default() },
		}
	}
}

type PlainClient = Client<HttpConnector, Full<Bytes>>;
type TlsClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Connector chosen by the scheme of the bound endpoint
#[derive(Clone)]
enum HttpClient {
	Plain(PlainClient),
	Tls(TlsClient),
}

impl HttpClient {
	fn new(base_uri: &str, pool_lease: Duration) -> ClResult<Self> {
		if base_uri.starts_with("https://") {
			let connector = hyper_rustls::HttpsConnectorBuilder::new()
				.with_native_roots()
				.map_err(|_| Error::ConfigError("no native root CA certificates found".into()))?
				.https_only()
				.enable_http1()
				.build();
			Ok(HttpClient::Tls(
				Client::builder(TokioExecutor::new()).pool_idle_timeout(pool_lease).build(connector),
			))
		} else if base_uri.starts_with("http://") {
			Ok(HttpClient::Plain(
				Client::builder(TokioExecutor::new())
					.pool_idle_timeout(pool_lease)
					.build(HttpConnector::new()),
			))
		} else {
			Err(Error::ConfigError(format!("unsupported endpoint URI: {}", base_uri)))
		}
	}

	async fn request(
		&self,
		req: hyper::Request<Full<Bytes>>,
	) -> Result<hyper::Response<hyper::body::Incoming>, hyper_util::client::legacy::Error> {
		match self {
			HttpClient::Plain(client) => client.request(req).await,
			HttpClient::Tls(client) => client.request(req).await,
		}
	}
}

/// Successful response with its collected body
#[derive(Debug)]
pub struct HttpResponse {
	pub status: u16,
	pub body: Bytes,
}

impl HttpResponse {
	pub fn json<T: DeserializeOwned>(&self) -> ClResult<T> {
		Ok(serde_json::from_slice(&self.body)?)
	}
}

fn check_status(status: u16) -> ClResult<()> {
	match status {
		200..=299 => Ok(()),
		401 => Err(Error::Unauthorized),
		404 => Err(Error::NotFound),
		status => Err(Error::Http(status)),
	}
}

/// Connection pool with the time it was opened
struct LeasedPool {
	client: HttpClient,
	opened_at: Instant,
	renewals: u64,
}

/// HTTP client bound to one authority endpoint
pub struct BoundClient {
	base_uri: Box<str>,
	pool: Mutex<LeasedPool>,
	opts: TransportOpts,
}

impl std::fmt::Debug for BoundClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BoundClient").field("base_uri", &self.base_uri).finish_non_exhaustive()
	}
}

impl BoundClient {
	pub fn bind(base_uri: &str, opts: TransportOpts) -> ClResult<Self> {
		let base_uri = base_uri.trim_end_matches('/');
		let client = HttpClient::new(base_uri, opts.pool_lease)?;
		let pool = LeasedPool { client, opened_at: Instant::now(), renewals: 0 };
		Ok(Self { base_uri: base_uri.into(), pool: Mutex::new(pool), opts })
	}

	/// Client of the current pool, opening a new pool when the lease has expired.
	///
	/// Connections of the old pool close once their in-flight requests finish.
	fn leased_client(&self) -> ClResult<HttpClient> {
		let mut pool = self.pool.lock();
		if pool.opened_at.elapsed() >= self.opts.pool_lease {
			debug!(endpoint = %self.base_uri, "connection lease expired, opening new connections");
			pool.client = HttpClient::new(&self.base_uri, self.opts.pool_lease)?;
			pool.opened_at = Instant::now();
			pool.renewals += 1;
		}
		Ok(pool.client.clone())
	}

	pub fn base_uri(&self) -> &str {
		&self.base_uri
	}

	/// Unauthenticated health check, no retry
	pub async fn probe(&self, cancel: &CancellationToken) -> bool {
		match self
			.request_once(&Method::GET, HEALTH_PATH, &[], Bytes::new(), self.opts.probe_timeout, cancel)
			.await
		{
			Ok(_) => true,
			Err(e) => {
				debug!(endpoint = %self.base_uri, "health probe failed: {}", e);
				false
			}
		}
	}

	/// Send a request, retrying transient failures
	pub async fn request(
		&self,
		method: Method,
		path: &str,
		headers: &[(&str, &str)],
		body: Bytes,
		cancel: &CancellationToken,
	) -> ClResult<HttpResponse> {
		let mut attempt: u16 = 0;
		loop {
			let res = self
				.request_once(&method, path, headers, body.clone(), self.opts.request_timeout, cancel)
				.await;
			match res {
				Ok(resp) => return Ok(resp),
				Err(e) if e.is_transient() && self.opts.retry.should_retry(attempt) => {
					let wait = self.opts.retry.calculate_backoff(attempt);
					debug!(
						endpoint = %self.base_uri,
						path = %path,
						"transient failure ({}), retrying in {:?}", e, wait
					);
					tokio::select! {
						biased;
						() = cancel.cancelled() => return Err(Error::Cancelled),
						() = tokio::time::sleep(wait) => {}
					}
					attempt += 1;
				}
				Err(e) => return Err(e),
			}
		}
	}

	pub async fn get_json<T: DeserializeOwned>(
		&self,
		path: &str,
		headers: &[(&str, &str)],
		cancel: &CancellationToken,
	) -> ClResult<T> {
		self.request(Method::GET, path, headers, Bytes::new(), cancel).await?.json()
	}

	pub async fn send_json<B: Serialize + ?Sized>(
		&self,
		method: Method,
		path: &str,
		headers: &[(&str, &str)],
		body: &B,
		cancel: &CancellationToken,
	) -> ClResult<HttpResponse> {
		let body = Bytes::from(serde_json::to_vec(body)?);
		self.request(method, path, headers, body, cancel).await
	}

	async fn request_once(
		&self,
		method: &Method,
		path: &str,
		headers: &[(&str, &str)],
		body: Bytes,
		timeout: Duration,
		cancel: &CancellationToken,
	) -> ClResult<HttpResponse> {
		let mut builder =
			hyper::Request::builder().method(method.clone()).uri(format!("{}{}", self.base_uri, path));
		if !body.is_empty() {
			builder = builder.header("Content-Type", "application/json");
		}
		for (name, value) in headers {
			builder = builder.header(*name, *value);
		}
		let req = builder
			.body(Full::new(body))
			.map_err(|e| Error::Internal(format!("request build error: {}", e)))?;

		let client = self.leased_client()?;
		let exchange = async {
			let resp = client.request(req).await.map_err(|e| Error::NetworkError(e.to_string()))?;
			let status = resp.status().as_u16();
			let body = resp
				.into_body()
				.collect()
				.await
				.map_err(|e| Error::NetworkError(e.to_string()))?
				.to_bytes();
			Ok::<_, Error>(HttpResponse { status, body })
		};

		let resp = tokio::select! {
			biased;
			() = cancel.cancelled() => return Err(Error::Cancelled),
			res = tokio::time::timeout(timeout, exchange) => match res {
				Ok(res) => res?,
				Err(_) => return Err(Error::Timeout),
			},
		};
		check_status(resp.status)?;
		Ok(resp)
	}
}

/// Bind to the first healthy candidate, or to the first one if none is healthy
pub async fn create_client(
	candidates: &[String],
	opts: TransportOpts,
	cancel: &CancellationToken,
) -> ClResult<BoundClient> {
	match candidates {
		[] => Err(Error::ConfigError("no authority endpoint configured".into())),
		[single] => BoundClient::bind(single, opts),
		[first, ..] => {
			for uri in candidates {
				let client = BoundClient::bind(uri, opts.clone())?;
				if client.probe(cancel).await {
					info!(endpoint = %uri, "bound to healthy endpoint");
					return Ok(client);
				}
				if cancel.is_cancelled() {
					return Err(Error::Cancelled);
				}
			}
			warn!(endpoint = %first, "no endpoint passed the health probe, using the first one");
			BoundClient::bind(first, opts)
		}
	}
}


// vim: ts=4
