//! Setting values and the change-set mutation path

use settlr_types::meta_adapter::{ChangeSchedule, ChangeSet, SettingUpdate};
use settlr_types::prelude::*;
use settlr_types::types::{ClientKey, TypedValue};

use crate::{Data, deferred};

pub(crate) fn read_value(
	data: &Data,
	client_name: &str,
	instance: Option<&str>,
	name: &str,
) -> Option<TypedValue> {
	data.values.get(&ClientKey::new(client_name, instance))?.get(name).cloned().flatten()
}

/// Apply a change set the way a live edit is applied.
///
/// A change set carrying an `apply_at_utc` is not applied but stored as a deferred
/// change for that time. A `revert_at_utc` schedules the restoration of the previous
/// values once the change was applied.
pub(crate) fn apply_change_set(
	data: &mut Data,
	client_name: &str,
	instance: Option<&str>,
	change_set: &ChangeSet,
	requesting_user: Option<&str>,
) -> ClResult<()> {
	if let Some(apply_at) = change_set.schedule.as_ref().and_then(|s| s.apply_at_utc) {
		deferred::create(data, client_name, instance, change_set, apply_at, requesting_user);
		return Ok(());
	}
	if data.failing_clients.contains(client_name) {
		return Err(Error::ApplyError(format!("client '{}' rejected the change", client_name)));
	}

	let values = data.values.entry(ClientKey::new(client_name, instance)).or_default();
	let mut previous = Vec::with_capacity(change_set.values.len());
	for update in &change_set.values {
		let old = values.insert(update.name.clone(), update.value.clone()).flatten();
		previous.push(SettingUpdate { name: update.name.clone(), value: old });
	}
	info!(client = %client_name, "applied {} setting values", change_set.values.len());

	if let Some(revert_at) = change_set.schedule.as_ref().and_then(|s| s.revert_at_utc) {
		let revert = ChangeSet {
			values: previous,
			change_message: Some("Scheduled revert".into()),
			schedule: Some(ChangeSchedule { apply_at_utc: Some(revert_at), revert_at_utc: None }),
		};
		deferred::create(data, client_name, instance, &revert, revert_at, requesting_user);
	}
	Ok(())
}

// vim: ts=4
