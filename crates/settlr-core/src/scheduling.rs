//! Scheduling worker: applies deferred changes whose time has come.
//!
//! A due change is replayed through the same mutation path a live edit uses, with its
//! apply time cleared first (otherwise the mutation path would defer it again), and its
//! row is deleted only after the change was applied. A failed change stays in place and
//! is retried on the next tick.

use std::sync::Arc;

use async_trait::async_trait;

use crate::prelude::*;
use settlr_types::meta_adapter::{
	ChangeApplier, ChangeSchedule, ChangeSet, DeferredChange, DeferredChangeStore,
};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Collaborators of one scheduling tick
pub struct SchedulingScope {
	pub store: Arc<dyn DeferredChangeStore>,
	pub applier: Arc<dyn ChangeApplier>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingReport {
	pub applied: usize,
	pub failed: usize,
}

pub struct SchedulingWorker {
	scope: ScopeFactory<SchedulingScope>,
	batch_size: usize,
}

impl SchedulingWorker {
	pub fn new(scope: ScopeFactory<SchedulingScope>, batch_size: usize) -> Self {
		Self { scope, batch_size: batch_size.max(1) }
	}

	/// Apply every change due at `now`, up to the batch size
	pub async fn run_once(&self, now: Timestamp) -> ClResult<SchedulingReport> {
		let scope = (self.scope)();
		let due = scope.store.list_due(now, self.batch_size).await?;
		let mut report = SchedulingReport::default();

		for change in due {
			match apply_deferred(&scope, &change).await {
				Ok(()) => report.applied += 1,
				Err(e) => {
					error!(
						change = change.id,
						client = %change.client_name,
						"failed to apply deferred change, keeping it for the next run: {}", e
					);
					report.failed += 1;
				}
			}
		}
		if report.applied > 0 || report.failed > 0 {
			info!(applied = report.applied, failed = report.failed, "deferred changes processed");
		}
		Ok(report)
	}
}

/// Clear the apply time so the mutation path applies the change instead of deferring it
/// again. A scheduled revert is kept.
pub fn disarm(change_set: &ChangeSet) -> ChangeSet {
	let mut change_set = change_set.clone();
	change_set.schedule = change_set
		.schedule
		.take()
		.map(|schedule| ChangeSchedule { apply_at_utc: None, ..schedule })
		.filter(|schedule| schedule.revert_at_utc.is_some());
	change_set
}

async fn apply_deferred(scope: &SchedulingScope, change: &DeferredChange) -> ClResult<()> {
	let change_set = disarm(&change.change_set);

	scope
		.applier
		.apply_change_set(
			&change.client_name,
			change.instance.as_deref(),
			&change_set,
			change.requesting_user.as_deref(),
		)
		.await?;
	debug!(change = change.id, client = %change.client_name, "deferred change applied");

	if let Err(e) = scope.store.delete_deferred_change(change.id).await {
		// Applied but still stored: the next run would apply it again
		error!(change = change.id, "deferred change applied but not deleted: {}", e);
	}
	Ok(())
}

#[async_trait]
impl PeriodicJob for SchedulingWorker {
	fn name(&self) -> &'static str {
		"scheduling"
	}

	async fn tick(&self) -> ClResult<()> {
		self.run_once(Timestamp::now()).await.map(|_| ())
	}
}


// vim: ts=4
