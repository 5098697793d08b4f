//! Event log

use settlr_types::prelude::*;

use crate::Data;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
	pub timestamp: Timestamp,
	pub event_type: Box<str>,
	pub subject: Box<str>,
	pub outcome: Box<str>,
}

pub(crate) fn record(data: &mut Data, event_type: &str, subject: &str, outcome: &str) {
	data.events.push(EventRecord {
		timestamp: Timestamp::now(),
		event_type: event_type.into(),
		subject: subject.into(),
		outcome: outcome.into(),
	});
}

// vim: ts=4
