//! Webhook delivery worker
//!
//! Drains the queue one item at a time and posts each event to every matching webhook
//! client. Delivery is best effort: every outcome is written to the event log, nothing
//! is retried or re-queued.

use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;
use crate::webhook::queue::{WebHookQueue, WebHookQueueItem};
use settlr_types::meta_adapter::{EventLogger, WebHook, WebHookClient, WebHookClientStore};

pub const EVENT_WEBHOOK_SENT: &str = "WebHookSent";

#[derive(Debug, Clone)]
pub struct WebHookWorkerOpts {
	/// Sleep when the queue is empty
	pub idle_delay: Duration,
	pub timeout: Duration,
}

impl Default for WebHookWorkerOpts {
	fn default() -> Self {
		Self { idle_delay: Duration::from_millis(500), timeout: Duration::from_secs(10) }
	}
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
	Delivered(u16),
	Rejected(u16),
	Failed(String),
	Cancelled,
}

impl std::fmt::Display for DeliveryOutcome {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			DeliveryOutcome::Delivered(_) => write!(f, "Succeeded"),
			DeliveryOutcome::Rejected(status) => write!(f, "Failed with status code {}", status),
			DeliveryOutcome::Failed(msg) => write!(f, "Failed: {}", msg),
			DeliveryOutcome::Cancelled => write!(f, "Cancelled"),
		}
	}
}

type TlsClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;
type PlainClient = Client<HttpConnector, Full<Bytes>>;

enum HttpClient {
	Tls(TlsClient),
	/// No root certificates available: only http:// targets can be reached
	Plain(PlainClient),
}

impl HttpClient {
	fn new() -> Self {
		match hyper_rustls::HttpsConnectorBuilder::new().with_native_roots() {
			Ok(builder) => {
				let connector = builder.https_or_http().enable_http1().build();
				HttpClient::Tls(Client::builder(TokioExecutor::new()).build(connector))
			}
			Err(e) => {
				warn!("no native root CA certificates ({}), https webhooks will fail", e);
				HttpClient::Plain(Client::builder(TokioExecutor::new()).build(HttpConnector::new()))
			}
		}
	}

	async fn request(
		&self,
		req: hyper::Request<Full<Bytes>>,
	) -> Result<hyper::Response<hyper::body::Incoming>, hyper_util::client::legacy::Error> {
		match self {
			HttpClient::Tls(client) => client.request(req).await,
			HttpClient::Plain(client) => client.request(req).await,
		}
	}
}

pub struct WebHookWorker {
	queue: WebHookQueue,
	clients: Arc<dyn WebHookClientStore>,
	events: Arc<dyn EventLogger>,
	http: HttpClient,
	opts: WebHookWorkerOpts,
}

impl WebHookWorker {
	pub fn new(
		queue: WebHookQueue,
		clients: Arc<dyn WebHookClientStore>,
		events: Arc<dyn EventLogger>,
		opts: WebHookWorkerOpts,
	) -> Self {
		Self { queue, clients, events, http: HttpClient::new(), opts }
	}

	/// Consume the queue until `cancel` fires
	pub async fn run(&self, cancel: CancellationToken) {
		info!(worker = "webhook", "worker started");
		while !cancel.is_cancelled() {
			if let Some(item) = self.queue.try_dequeue() {
				self.process(item, &cancel).await;
				continue;
			}
			tokio::select! {
				biased;
				() = cancel.cancelled() => break,
				() = tokio::time::sleep(self.opts.idle_delay) => {}
			}
		}
		info!(worker = "webhook", "worker stopped, {} events left in queue", self.queue.len());
	}

	/// Deliver one queue item to all of its webhooks
	pub async fn process(&self, item: WebHookQueueItem, cancel: &CancellationToken) -> Vec<DeliveryOutcome> {
		let mut outcomes = Vec::with_capacity(item.matching_webhooks.len());
		for webhook in &item.matching_webhooks {
			if !item.data.should_send(webhook) {
				debug!(webhook = %webhook.id, "event filtered out");
				continue;
			}
			let client = match self.clients.get_webhook_client(webhook.client_id).await {
				Ok(Some(client)) => client,
				Ok(None) => {
					warn!(webhook = %webhook.id, "webhook client {} not found", webhook.client_id);
					continue;
				}
				Err(e) => {
					error!(webhook = %webhook.id, "cannot load webhook client: {}", e);
					continue;
				}
			};

			let outcome = match item.data.to_payload(webhook) {
				Ok(payload) => self.deliver(&client, webhook, &payload, cancel).await,
				Err(e) => DeliveryOutcome::Failed(format!("payload error: {}", e)),
			};
			self.record(webhook, &client, &outcome).await;
			outcomes.push(outcome);
		}
		outcomes
	}

	async fn deliver(
		&self,
		client: &WebHookClient,
		webhook: &WebHook,
		payload: &serde_json::Value,
		cancel: &CancellationToken,
	) -> DeliveryOutcome {
		let uri = format!("{}/{}", client.base_uri.trim_end_matches('/'), webhook.webhook_type.route());
		let body = match serde_json::to_vec(payload) {
			Ok(body) => body,
			Err(e) => return DeliveryOutcome::Failed(e.to_string()),
		};
		let req = match hyper::Request::builder()
			.method(hyper::Method::POST)
			.uri(&uri)
			.header("Content-Type", "application/json")
			.header("Authorization", format!("Secret {}", client.secret))
			.body(Full::new(Bytes::from(body)))
		{
			Ok(req) => req,
			Err(e) => return DeliveryOutcome::Failed(format!("request build error: {}", e)),
		};

		tokio::select! {
			biased;
			() = cancel.cancelled() => DeliveryOutcome::Cancelled,
			res = tokio::time::timeout(self.opts.timeout, self.http.request(req)) => match res {
				Ok(Ok(resp)) if resp.status().is_success() => DeliveryOutcome::Delivered(resp.status().as_u16()),
				Ok(Ok(resp)) => DeliveryOutcome::Rejected(resp.status().as_u16()),
				Ok(Err(e)) => DeliveryOutcome::Failed(e.to_string()),
				Err(_) => DeliveryOutcome::Failed(format!("timed out after {:?}", self.opts.timeout)),
			},
		}
	}

	async fn record(&self, webhook: &WebHook, client: &WebHookClient, outcome: &DeliveryOutcome) {
		match outcome {
			DeliveryOutcome::Delivered(_) => {
				debug!(webhook = %webhook.id, client = %client.name, "webhook delivered");
			}
			outcome => {
				warn!(webhook = %webhook.id, client = %client.name, "webhook delivery: {}", outcome);
			}
		}
		let subject = format!("{} -> {}", webhook.webhook_type, client.name);
		if let Err(e) = self.events.record(EVENT_WEBHOOK_SENT, &subject, &outcome.to_string()).await {
			error!(webhook = %webhook.id, "cannot record webhook outcome: {}", e);
		}
	}
}

// vim: ts=4
