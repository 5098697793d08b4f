//! Checkpoint triggers and checkpoints

use settlr_types::meta_adapter::{CheckPoint, CheckPointRequest, CheckPointTrigger, TriggerId};
use settlr_types::prelude::*;

use crate::Data;

pub(crate) fn create_trigger(data: &mut Data, after_event: &str, user: Option<&str>) -> TriggerId {
	let id = data.next_id();
	data.triggers.insert(
		id,
		CheckPointTrigger {
			id,
			timestamp: Timestamp::now(),
			after_event: after_event.into(),
			user: user.map(Into::into),
			handled: false,
		},
	);
	id
}

pub(crate) fn delete_handled(data: &mut Data) -> usize {
	let before = data.triggers.len();
	data.triggers.retain(|_, t| !t.handled);
	before - data.triggers.len()
}

pub(crate) fn list_unhandled(data: &Data) -> Vec<CheckPointTrigger> {
	data.triggers.values().filter(|t| !t.handled).cloned().collect()
}

pub(crate) fn mark_handled(data: &mut Data, ids: &[TriggerId]) {
	for id in ids {
		if let Some(trigger) = data.triggers.get_mut(id) {
			trigger.handled = true;
		}
	}
}

pub(crate) fn create_checkpoint(data: &mut Data, request: &CheckPointRequest) -> CheckPoint {
	let number_of_settings: usize = data.values.values().map(|v| v.len()).sum();
	let checkpoint = CheckPoint {
		id: uuid::Uuid::new_v4(),
		data_id: uuid::Uuid::new_v4(),
		timestamp: request.timestamp,
		number_of_clients: u32::try_from(data.values.len()).unwrap_or(u32::MAX),
		number_of_settings: u32::try_from(number_of_settings).unwrap_or(u32::MAX),
		after_event: request.after_event.clone(),
		note: None,
		user: request.user.clone(),
	};
	data.checkpoints.push(checkpoint.clone());
	checkpoint
}

// vim: ts=4
