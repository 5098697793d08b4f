//! Cancellation-aware periodic loop shared by the tick-based workers

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;

/// Builds the collaborators for one tick. Every tick gets a fresh scope, so nothing
/// carries over between ticks.
pub type ScopeFactory<C> = Arc<dyn Fn() -> C + Send + Sync>;

#[async_trait]
pub trait PeriodicJob: Send + Sync {
	fn name(&self) -> &'static str;

	/// One unit of work. Not interrupted by shutdown once started.
	async fn tick(&self) -> ClResult<()>;
}

/// Run `job` every `interval` until `cancel` fires. The first tick runs immediately.
pub async fn run_periodic(job: Arc<dyn PeriodicJob>, interval: Duration, cancel: CancellationToken) {
	let mut ticker = tokio::time::interval(interval);
	ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	info!(worker = job.name(), "worker started, interval {:?}", interval);

	loop {
		tokio::select! {
			biased;
			() = cancel.cancelled() => break,
			_ = ticker.tick() => {}
		}
		if let Err(e) = job.tick().await {
			error!(worker = job.name(), "tick failed: {}", e);
		}
	}
	info!(worker = job.name(), "worker stopped");
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct Counter(AtomicUsize);

	#[async_trait]
	impl PeriodicJob for Counter {
		fn name(&self) -> &'static str {
			"counter"
		}

		async fn tick(&self) -> ClResult<()> {
			self.0.fetch_add(1, Ordering::SeqCst);
			Err(Error::Internal("every tick fails".into()))
		}
	}

	#[tokio::test]
	async fn test_failing_ticks_keep_running_until_cancelled() {
		let job = Arc::new(Counter(AtomicUsize::new(0)));
		let cancel = CancellationToken::new();
		let handle =
			tokio::spawn(run_periodic(job.clone(), Duration::from_millis(10), cancel.clone()));

		tokio::time::sleep(Duration::from_millis(100)).await;
		cancel.cancel();
		tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
		assert!(job.0.load(Ordering::SeqCst) >= 2);
	}
}

// vim: ts=4
