use settlr_types::meta_adapter::{WebHook, WebHookClient, WebHookType};

use crate::Data;

pub(crate) fn add_client(data: &mut Data, name: &str, base_uri: &str, secret: &str) -> uuid::Uuid {
	let id = uuid::Uuid::new_v4();
	data.webhook_clients.insert(
		id,
		WebHookClient { id, name: name.into(), base_uri: base_uri.into(), secret: secret.into() },
	);
	id
}

pub(crate) fn list(data: &Data, webhook_type: WebHookType) -> Vec<WebHook> {
	data.webhooks.iter().filter(|w| w.webhook_type == webhook_type).cloned().collect()
}

// vim: ts=4
