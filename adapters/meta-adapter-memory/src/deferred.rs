//! Deferred change rows

use settlr_types::meta_adapter::{ChangeSet, DeferredChange, DeferredChangeId};
use settlr_types::prelude::*;

use crate::Data;

pub(crate) fn list_due(data: &Data, now: Timestamp, limit: usize) -> Vec<DeferredChange> {
	let mut due: Vec<_> =
		data.deferred.values().filter(|c| c.execute_at_utc <= now).cloned().collect();
	due.sort_by_key(|c| (c.execute_at_utc, c.id));
	due.truncate(limit);
	due
}

pub(crate) fn create(
	data: &mut Data,
	client_name: &str,
	instance: Option<&str>,
	change_set: &ChangeSet,
	execute_at_utc: Timestamp,
	requesting_user: Option<&str>,
) -> DeferredChangeId {
	let id = data.next_id();
	data.deferred.insert(
		id,
		DeferredChange {
			id,
			client_name: client_name.into(),
			instance: instance.map(Into::into),
			change_set: change_set.clone(),
			execute_at_utc,
			requesting_user: requesting_user.map(Into::into),
		},
	);
	debug!(change = id, client = %client_name, "deferred change stored for {}", execute_at_utc);
	id
}

pub(crate) fn delete(data: &mut Data, id: DeferredChangeId) -> ClResult<()> {
	data.deferred.remove(&id).map(|_| ()).ok_or(Error::NotFound)
}

// vim: ts=4
