use super::*;
use crate::entity::{
    AgentDraft, AgentStatus, BuildingCommand, EntityKind, Record, Secret, SecretDraft, SecretPatch,
};
use crate::error::{ErrorKind, ServiceError};
use crate::protocol::{self, Envelope, EventVerb, Snapshot};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

fn store() -> (ClientStore, mpsc::UnboundedReceiver<Envelope>) {
    let (sink, commands) = CommandSink::channel();
    (ClientStore::new(Arc::new(Notifier::new()), sink), commands)
}

fn secret(id: &str, key: &str, value: &str) -> Secret {
    Secret::from_draft(
        id.to_string(),
        SecretDraft {
            name: key.to_lowercase(),
            key: key.to_string(),
            value: value.to_string(),
            description: None,
        },
        Utc::now(),
    )
    .unwrap()
}

/// Records every notification.
fn record_notifications(store: &ClientStore) -> Arc<Mutex<Vec<EntityKind>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store
        .notifier()
        .subscribe(move |kind| sink.lock().unwrap().push(kind));
    seen
}

fn event(kind: EntityKind, verb: EventVerb, payload: &impl serde::Serialize) -> Envelope {
    Envelope::event(kind, verb, payload).unwrap()
}

#[test]
fn test_add_then_get() {
    let (store, _commands) = store();
    let s = secret("sec_1", "OPENAI_KEY", "sk-1");

    store.secrets.add_from_server(s.clone());

    assert_eq!(store.secrets.get("sec_1"), Some(s.clone()));
    assert_eq!(store.get_secret_by_key("OPENAI_KEY"), Some(s));
    assert!(store.get_secret_by_key("OTHER").is_none());
}

#[test]
fn test_set_replaces_and_keeps_order() {
    let (store, _commands) = store();
    store
        .secrets
        .add_from_server(secret("sec_old", "OLD", "x"));

    store.secrets.set_from_server(vec![
        secret("sec_b", "B", "1"),
        secret("sec_a", "A", "2"),
    ]);

    let ids: Vec<String> = store.secrets.get_all().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["sec_b", "sec_a"]);
    assert!(store.secrets.get("sec_old").is_none());
}

#[test]
fn test_update_unknown_id_is_upsert() {
    let (store, _commands) = store();
    store
        .secrets
        .update_from_server(secret("sec_1", "KEY", "v"));
    assert_eq!(store.secrets.len(), 1);
}

#[test]
fn test_update_keeps_position() {
    let (store, _commands) = store();
    store.secrets.set_from_server(vec![
        secret("sec_a", "A", "1"),
        secret("sec_b", "B", "2"),
    ]);

    let mut changed = store.secrets.get("sec_a").unwrap();
    changed.value = "changed".to_string();
    changed.updated_at = changed.updated_at + Duration::seconds(1);
    store.secrets.update_from_server(changed);

    let all = store.secrets.get_all();
    assert_eq!(all[0].id, "sec_a");
    assert_eq!(all[0].value, "changed");
}

#[test]
fn test_stale_update_ignored() {
    let (store, _commands) = store();
    let current = secret("sec_1", "KEY", "new");
    store.secrets.add_from_server(current.clone());

    let mut stale = current.clone();
    stale.value = "old".to_string();
    stale.updated_at = current.updated_at - Duration::seconds(5);
    store.secrets.update_from_server(stale);

    assert_eq!(store.secrets.get("sec_1").unwrap().value, "new");
}

#[test]
fn test_same_version_update_ignored() {
    let (store, _commands) = store();
    let current = secret("sec_1", "KEY", "first");
    store.secrets.add_from_server(current.clone());

    let mut rival = current.clone();
    rival.value = "second".to_string();
    store.secrets.update_from_server(rival);

    assert_eq!(store.secrets.get("sec_1").unwrap().value, "first");
}

#[test]
fn test_deleted_id_never_reappears() {
    let (store, _commands) = store();
    let s = secret("sec_1", "KEY", "v");
    let mut late = s.clone();
    late.value = "late".to_string();
    late.updated_at = s.updated_at + Duration::seconds(1);

    store
        .apply(&event(EntityKind::Secret, EventVerb::Created, &s))
        .unwrap();
    store
        .apply(&Envelope::new("secret_deleted", json!({"id": "sec_1"})))
        .unwrap();
    store
        .apply(&event(EntityKind::Secret, EventVerb::Updated, &late))
        .unwrap();
    store
        .apply(&event(EntityKind::Secret, EventVerb::Created, &late))
        .unwrap();

    assert!(store.secrets.get_all().is_empty());
}

#[test]
fn test_delete_before_create_keeps_id_out() {
    let (store, _commands) = store();
    store.secrets.remove_from_server("sec_1");
    store.secrets.add_from_server(secret("sec_1", "KEY", "v"));
    store
        .secrets
        .set_from_server(vec![secret("sec_1", "KEY", "v"), secret("sec_2", "B", "v")]);

    let ids: Vec<String> = store.secrets.get_all().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["sec_2"]);
}

#[test]
fn test_remove_unknown_id_is_noop_but_notifies() {
    let (store, _commands) = store();
    store.secrets.add_from_server(secret("sec_1", "KEY", "v"));
    let seen = record_notifications(&store);

    store.secrets.remove_from_server("sec_missing");

    assert_eq!(store.secrets.len(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![EntityKind::Secret]);
}

#[test]
fn test_each_from_server_call_notifies_exactly_once() {
    let (store, _commands) = store();
    let seen = record_notifications(&store);
    let s = secret("sec_1", "KEY", "v");

    store.secrets.set_from_server(vec![s.clone()]);
    store.secrets.add_from_server(secret("sec_2", "KEY_2", "v"));
    store.secrets.update_from_server(s.clone());
    store.secrets.remove_from_server(&s.id);
    store.agents.set_from_server(Vec::new());

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            EntityKind::Secret,
            EntityKind::Secret,
            EntityKind::Secret,
            EntityKind::Secret,
            EntityKind::Agent,
        ]
    );
}

#[test]
fn test_snapshot_is_isolated_from_later_changes() {
    let (store, _commands) = store();
    store.secrets.add_from_server(secret("sec_1", "KEY", "v"));

    let before = store.secrets.snapshot();
    store.secrets.add_from_server(secret("sec_2", "KEY_2", "v"));
    store.secrets.remove_from_server("sec_1");

    assert_eq!(before.len(), 1);
    assert!(before.contains_key("sec_1"));
    assert_eq!(store.secrets.len(), 1);
}

#[test]
fn test_subscriber_sees_new_state() {
    let (store, _commands) = store();
    let store = Arc::new(store);
    let observed = Arc::new(Mutex::new(Vec::new()));

    let reader = Arc::clone(&store);
    let sink = Arc::clone(&observed);
    store.notifier().subscribe(move |_| {
        sink.lock().unwrap().push(reader.secrets.len());
    });

    store.secrets.add_from_server(secret("sec_1", "A", "v"));
    store.secrets.add_from_server(secret("sec_2", "B", "v"));

    assert_eq!(*observed.lock().unwrap(), vec![1, 2]);
}

#[test]
fn test_unsubscribe_stops_notifications() {
    let notifier = Notifier::new();
    let count = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&count);
    let id = notifier.subscribe(move |_| *sink.lock().unwrap() += 1);

    notifier.notify(EntityKind::Agent);
    assert!(notifier.unsubscribe(id));
    notifier.notify(EntityKind::Agent);

    assert_eq!(*count.lock().unwrap(), 1);
    assert!(!notifier.unsubscribe(id));
    assert_eq!(notifier.subscriber_count(), 0);
}

#[test]
fn test_intents_send_commands_without_touching_store() {
    let (store, mut commands) = store();
    let seen = record_notifications(&store);

    store
        .create_secret(SecretDraft {
            name: "OpenAI".to_string(),
            key: "OPENAI_KEY".to_string(),
            value: "sk-1".to_string(),
            description: None,
        })
        .unwrap();
    store
        .update_secret(
            "sec_1",
            SecretPatch {
                value: Some("B".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    store.delete_custom_class("cls_1").unwrap();
    store
        .execute_building_command("bld_1", BuildingCommand::HealthCheck)
        .unwrap();
    store.assign_skill("skl_1", "agt_1").unwrap();
    store.sync().unwrap();

    let sent: Vec<Envelope> = std::iter::from_fn(|| commands.try_recv().ok()).collect();
    assert_eq!(
        sent,
        vec![
            Envelope::new(
                "create_secret",
                json!({"name": "OpenAI", "key": "OPENAI_KEY", "value": "sk-1"})
            ),
            Envelope::new(
                "update_secret",
                json!({"id": "sec_1", "updates": {"value": "B"}})
            ),
            Envelope::new("delete_custom_class", json!({"id": "cls_1"})),
            Envelope::new(
                protocol::BUILDING_COMMAND,
                json!({"buildingId": "bld_1", "command": "healthCheck"})
            ),
            Envelope::new(
                protocol::ASSIGN_SKILL,
                json!({"skillId": "skl_1", "agentId": "agt_1"})
            ),
            Envelope::new(protocol::SYNC, Value::Null),
        ]
    );

    assert!(store.secrets.is_empty());
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_intent_after_disconnect_fails() {
    let (store, commands) = store();
    drop(commands);

    let err = store.delete_agent("agt_1").unwrap_err();
    assert!(matches!(err, SendError::Disconnected));
}

#[test]
fn test_apply_routes_events() {
    let (store, _commands) = store();
    let s = secret("sec_1", "OPENAI_KEY", "A");

    store
        .apply(&event(EntityKind::Secret, EventVerb::Created, &s))
        .unwrap();
    assert_eq!(store.get_secret_by_key("OPENAI_KEY").unwrap().id, "sec_1");

    let mut b = s.clone();
    b.value = "B".to_string();
    b.updated_at = s.updated_at + Duration::milliseconds(1);
    store
        .apply(&event(EntityKind::Secret, EventVerb::Updated, &b))
        .unwrap();
    assert_eq!(store.secrets.get("sec_1").unwrap().value, "B");

    store
        .apply(&Envelope::new("secret_deleted", json!({"id": "sec_1"})))
        .unwrap();
    assert!(store.secrets.is_empty());
}

#[test]
fn test_apply_snapshot_replaces_every_kind() {
    let (store, _commands) = store();
    store
        .secrets
        .add_from_server(secret("sec_stale", "STALE", "x"));
    let seen = record_notifications(&store);

    let agent = crate::entity::Agent::from_draft(
        "agt_1".to_string(),
        AgentDraft {
            name: "Scout".to_string(),
            class: "scout".to_string(),
            building_id: Some("bld_1".to_string()),
            status: AgentStatus::Working,
            cwd: None,
        },
        Utc::now(),
    )
    .unwrap();
    let snapshot = Snapshot {
        agents: vec![agent.clone()],
        secrets: vec![secret("sec_1", "KEY", "v")],
        ..Default::default()
    };

    store.apply(&Envelope::snapshot(&snapshot).unwrap()).unwrap();

    assert!(store.secrets.get("sec_stale").is_none());
    assert_eq!(store.secrets.len(), 1);
    assert_eq!(store.agents_in_building("bld_1"), vec![agent]);
    assert!(store.agents_in_building("bld_2").is_empty());
    assert_eq!(seen.lock().unwrap().len(), 5);
}

#[test]
fn test_apply_error_is_reported_not_stored() {
    let (store, _commands) = store();
    let seen = record_notifications(&store);

    let err = store
        .apply(&Envelope::error(&ServiceError::conflict("key 'K' is already in use")))
        .unwrap_err();

    match err {
        ReconcileError::Rejected(payload) => {
            assert_eq!(payload.kind, ErrorKind::Conflict);
            assert_eq!(payload.message, "key 'K' is already in use");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_apply_rejects_unknown_and_malformed() {
    let (store, _commands) = store();

    assert!(matches!(
        store.apply(&Envelope::new("weather_report", Value::Null)),
        Err(ReconcileError::UnknownType(_))
    ));
    assert!(matches!(
        store.apply(&Envelope::new("secret_created", json!({"id": 7}))),
        Err(ReconcileError::InvalidPayload { .. })
    ));
    assert!(store.secrets.is_empty());
}
