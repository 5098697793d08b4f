//! Checkpoint worker: collapses pending checkpoint triggers into one checkpoint per tick

use std::sync::Arc;

use async_trait::async_trait;

use crate::prelude::*;
use settlr_types::meta_adapter::{
	CheckPoint, CheckPointRequest, CheckPointTrigger, CheckPointTriggerStore, CheckpointCreator,
};
use settlr_types::utils::dedup_join;

const JOIN_SEPARATOR: &str = ", ";

pub struct CheckpointScope {
	pub triggers: Arc<dyn CheckPointTriggerStore>,
	pub creator: Arc<dyn CheckpointCreator>,
}

pub struct CheckpointWorker {
	scope: ScopeFactory<CheckpointScope>,
}

/// Merge triggers into one request, keeping the first-seen order of events and users
pub fn coalesce_triggers(triggers: &[CheckPointTrigger], now: Timestamp) -> CheckPointRequest {
	let after_event = dedup_join(triggers.iter().map(|t| &*t.after_event), JOIN_SEPARATOR);
	let user = dedup_join(triggers.iter().filter_map(|t| t.user.as_deref()), JOIN_SEPARATOR);
	CheckPointRequest { timestamp: now, after_event, user: (!user.is_empty()).then_some(user) }
}

impl CheckpointWorker {
	pub fn new(scope: ScopeFactory<CheckpointScope>) -> Self {
		Self { scope }
	}

	/// Returns the checkpoint created, if any trigger was pending
	pub async fn run_once(&self) -> ClResult<Option<CheckPoint>> {
		let scope = (self.scope)();

		let removed = scope.triggers.delete_handled_triggers().await?;
		if removed > 0 {
			debug!("removed {} handled checkpoint triggers", removed);
		}

		let pending = scope.triggers.list_unhandled_triggers().await?;
		if pending.is_empty() {
			return Ok(None);
		}

		let request = coalesce_triggers(&pending, Timestamp::now());
		let checkpoint = scope.creator.create_checkpoint(&request).await?;
		let ids: Vec<_> = pending.iter().map(|t| t.id).collect();
		scope.triggers.mark_triggers_handled(&ids).await?;

		info!(
			checkpoint = %checkpoint.id,
			triggers = ids.len(),
			"checkpoint created after: {}", checkpoint.after_event
		);
		Ok(Some(checkpoint))
	}
}

#[async_trait]
impl PeriodicJob for CheckpointWorker {
	fn name(&self) -> &'static str {
		"checkpoint"
	}

	async fn tick(&self) -> ClResult<()> {
		self.run_once().await.map(|_| ())
	}
}


// vim: ts=4
