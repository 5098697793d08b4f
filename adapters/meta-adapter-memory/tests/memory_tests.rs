//! In-memory meta adapter tests
//!
//! Tests the mutation path, deferred change rows and checkpoint triggers

use settlr_meta_adapter_memory::MetaAdapterMemory;
use settlr_types::meta_adapter::{
	ChangeApplier, ChangeSchedule, ChangeSet, CheckPointRequest, CheckPointTriggerStore,
	CheckpointCreator, DeferredChangeStore, EventLogger, SettingUpdate,
};
use settlr_types::types::{Timestamp, TypedValue};

fn change_set(value: &str, schedule: Option<ChangeSchedule>) -> ChangeSet {
	ChangeSet {
		values: vec![SettingUpdate { name: "Color".into(), value: Some(TypedValue::String(value.into())) }],
		change_message: Some("test".into()),
		schedule,
	}
}

#[tokio::test]
async fn test_apply_change_set() {
	let adapter = MetaAdapterMemory::new();
	adapter.apply_change_set("Orders", None, &change_set("Red", None), Some("alice")).await.unwrap();

	assert_eq!(adapter.setting_value("Orders", None, "Color"), Some(TypedValue::String("Red".into())));
	assert_eq!(adapter.setting_value("Orders", Some("eu"), "Color"), None);
}

#[tokio::test]
async fn test_scheduled_change_is_deferred() {
	let adapter = MetaAdapterMemory::new();
	let schedule = ChangeSchedule { apply_at_utc: Some(Timestamp(1000)), revert_at_utc: None };
	adapter.apply_change_set("Orders", None, &change_set("Red", Some(schedule)), None).await.unwrap();

	assert_eq!(adapter.setting_value("Orders", None, "Color"), None);
	let deferred = adapter.deferred_changes();
	assert_eq!(deferred.len(), 1);
	assert_eq!(deferred[0].execute_at_utc, Timestamp(1000));
}

#[tokio::test]
async fn test_revert_is_scheduled_with_previous_values() {
	let adapter = MetaAdapterMemory::new();
	adapter.apply_change_set("Orders", None, &change_set("Blue", None), None).await.unwrap();

	let schedule = ChangeSchedule { apply_at_utc: None, revert_at_utc: Some(Timestamp(2000)) };
	adapter.apply_change_set("Orders", None, &change_set("Red", Some(schedule)), None).await.unwrap();
	assert_eq!(adapter.setting_value("Orders", None, "Color"), Some(TypedValue::String("Red".into())));

	let deferred = adapter.deferred_changes();
	assert_eq!(deferred.len(), 1);
	assert_eq!(deferred[0].execute_at_utc, Timestamp(2000));
	assert_eq!(deferred[0].change_set.values[0].value, Some(TypedValue::String("Blue".into())));
}

#[tokio::test]
async fn test_list_due_orders_and_limits() {
	let adapter = MetaAdapterMemory::new();
	let cs = change_set("Red", None);
	let late = adapter.create_deferred_change("Orders", None, &cs, Timestamp(30), None).await.unwrap();
	let early = adapter.create_deferred_change("Orders", None, &cs, Timestamp(10), None).await.unwrap();
	adapter.create_deferred_change("Orders", None, &cs, Timestamp(99), None).await.unwrap();

	let due = adapter.list_due(Timestamp(50), 10).await.unwrap();
	assert_eq!(due.iter().map(|c| c.id).collect::<Vec<_>>(), vec![early, late]);
	assert_eq!(adapter.list_due(Timestamp(50), 1).await.unwrap().len(), 1);

	adapter.delete_deferred_change(early).await.unwrap();
	assert!(adapter.delete_deferred_change(early).await.is_err());
}

#[tokio::test]
async fn test_trigger_lifecycle() {
	let adapter = MetaAdapterMemory::new();
	let a = adapter.create_trigger("Setting value changed", Some("alice")).await.unwrap();
	adapter.create_trigger("Client registered", None).await.unwrap();

	adapter.mark_triggers_handled(&[a]).await.unwrap();
	assert_eq!(adapter.list_unhandled_triggers().await.unwrap().len(), 1);
	assert_eq!(adapter.delete_handled_triggers().await.unwrap(), 1);
	assert_eq!(adapter.triggers().len(), 1);
}

#[tokio::test]
async fn test_checkpoint_counts() {
	let adapter = MetaAdapterMemory::new();
	adapter.apply_change_set("Orders", None, &change_set("Red", None), None).await.unwrap();
	adapter.apply_change_set("Billing", None, &change_set("Red", None), None).await.unwrap();

	let request = CheckPointRequest {
		timestamp: Timestamp(5),
		after_event: "Import".into(),
		user: None,
	};
	let checkpoint = adapter.create_checkpoint(&request).await.unwrap();
	assert_eq!(checkpoint.number_of_clients, 2);
	assert_eq!(checkpoint.number_of_settings, 2);
	assert_eq!(adapter.checkpoints(), vec![checkpoint]);
}

#[tokio::test]
async fn test_event_log() {
	let adapter = MetaAdapterMemory::new();
	adapter.record("WebHookSent", "security-event -> ops", "Succeeded").await.unwrap();
	let events = adapter.events();
	assert_eq!(events.len(), 1);
	assert_eq!(&*events[0].outcome, "Succeeded");
}

// vim: ts=4
