//! Worker host - wires and runs the background workers

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointScope, CheckpointWorker};
use crate::periodic::run_periodic;
use crate::prelude::*;
use crate::scheduling::{DEFAULT_BATCH_SIZE, SchedulingScope, SchedulingWorker};
use crate::webhook::{WebHookQueue, WebHookWorker, WebHookWorkerOpts};
use settlr_types::meta_adapter::{EventLogger, WebHookClientStore};

#[derive(Debug, Clone)]
pub struct WorkerOpts {
	pub scheduling_interval: Duration,
	pub scheduling_batch_size: usize,
	pub checkpoint_interval: Duration,
	pub webhook_idle_delay: Duration,
	pub webhook_timeout: Duration,
}

impl Default for WorkerOpts {
	fn default() -> Self {
		Self {
			scheduling_interval: Duration::from_secs(60),
			scheduling_batch_size: DEFAULT_BATCH_SIZE,
			checkpoint_interval: Duration::from_secs(60),
			webhook_idle_delay: Duration::from_millis(500),
			webhook_timeout: Duration::from_secs(10),
		}
	}
}

struct WebHookParts {
	queue: WebHookQueue,
	clients: Arc<dyn WebHookClientStore>,
	events: Arc<dyn EventLogger>,
}

pub struct WorkerHostBuilder {
	opts: WorkerOpts,
	scheduling: Option<ScopeFactory<SchedulingScope>>,
	checkpoint: Option<ScopeFactory<CheckpointScope>>,
	webhooks: Option<WebHookParts>,
	cancel: CancellationToken,
}

impl WorkerHostBuilder {
	fn new() -> Self {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.try_init();
		Self {
			opts: WorkerOpts::default(),
			scheduling: None,
			checkpoint: None,
			webhooks: None,
			cancel: CancellationToken::new(),
		}
	}

	// Opts
	pub fn opts(&mut self, opts: WorkerOpts) -> &mut Self {
		self.opts = opts;
		self
	}

	pub fn scheduling_interval(&mut self, interval: Duration) -> &mut Self {
		self.opts.scheduling_interval = interval;
		self
	}

	pub fn scheduling_batch_size(&mut self, batch_size: usize) -> &mut Self {
		self.opts.scheduling_batch_size = batch_size;
		self
	}

	pub fn checkpoint_interval(&mut self, interval: Duration) -> &mut Self {
		self.opts.checkpoint_interval = interval;
		self
	}

	pub fn webhook_idle_delay(&mut self, delay: Duration) -> &mut Self {
		self.opts.webhook_idle_delay = delay;
		self
	}

	pub fn webhook_timeout(&mut self, timeout: Duration) -> &mut Self {
		self.opts.webhook_timeout = timeout;
		self
	}

	/// Share a cancellation token with the host application
	pub fn cancel_token(&mut self, cancel: CancellationToken) -> &mut Self {
		self.cancel = cancel;
		self
	}

	// Workers
	pub fn scheduling(&mut self, scope: ScopeFactory<SchedulingScope>) -> &mut Self {
		self.scheduling = Some(scope);
		self
	}

	pub fn checkpoint(&mut self, scope: ScopeFactory<CheckpointScope>) -> &mut Self {
		self.checkpoint = Some(scope);
		self
	}

	pub fn webhooks(
		&mut self,
		queue: WebHookQueue,
		clients: Arc<dyn WebHookClientStore>,
		events: Arc<dyn EventLogger>,
	) -> &mut Self {
		self.webhooks = Some(WebHookParts { queue, clients, events });
		self
	}

	/// Spawn one task per configured worker
	pub fn start(self) -> ClResult<WorkerHost> {
		if self.scheduling.is_none() && self.checkpoint.is_none() && self.webhooks.is_none() {
			return Err(Error::ConfigError("no worker configured".into()));
		}
		let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

		if let Some(scope) = self.scheduling {
			let worker = Arc::new(SchedulingWorker::new(scope, self.opts.scheduling_batch_size));
			tasks.push((
				"scheduling",
				tokio::spawn(run_periodic(worker, self.opts.scheduling_interval, self.cancel.clone())),
			));
		}
		if let Some(scope) = self.checkpoint {
			let worker = Arc::new(CheckpointWorker::new(scope));
			tasks.push((
				"checkpoint",
				tokio::spawn(run_periodic(worker, self.opts.checkpoint_interval, self.cancel.clone())),
			));
		}
		if let Some(parts) = self.webhooks {
			let worker = WebHookWorker::new(
				parts.queue,
				parts.clients,
				parts.events,
				WebHookWorkerOpts {
					idle_delay: self.opts.webhook_idle_delay,
					timeout: self.opts.webhook_timeout,
				},
			);
			let cancel = self.cancel.clone();
			tasks.push(("webhook", tokio::spawn(async move { worker.run(cancel).await })));
		}

		info!("worker host started with {} workers", tasks.len());
		Ok(WorkerHost { cancel: self.cancel, tasks })
	}
}

pub struct WorkerHost {
	cancel: CancellationToken,
	tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl WorkerHost {
	pub fn builder() -> WorkerHostBuilder {
		WorkerHostBuilder::new()
	}

	pub fn cancel_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	pub fn worker_count(&self) -> usize {
		self.tasks.len()
	}

	/// Cancel all workers and wait for them to finish
	pub async fn shutdown(self) {
		info!("shutting down workers");
		self.cancel.cancel();
		for (name, task) in self.tasks {
			if let Err(e) = task.await {
				error!(worker = name, "worker ended abnormally: {}", e);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_setters_update_opts() {
		let mut builder = WorkerHost::builder();
		builder
			.scheduling_interval(Duration::from_secs(5))
			.scheduling_batch_size(10)
			.checkpoint_interval(Duration::from_secs(7))
			.webhook_idle_delay(Duration::from_millis(50))
			.webhook_timeout(Duration::from_secs(3));

		assert_eq!(builder.opts.scheduling_interval, Duration::from_secs(5));
		assert_eq!(builder.opts.scheduling_batch_size, 10);
		assert_eq!(builder.opts.checkpoint_interval, Duration::from_secs(7));
		assert_eq!(builder.opts.webhook_idle_delay, Duration::from_millis(50));
		assert_eq!(builder.opts.webhook_timeout, Duration::from_secs(3));
	}
}

// vim: ts=4
