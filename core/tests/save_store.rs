//! Save store tests over the in-memory file store, plus one pass over a
//! real directory.

use questlog_core::{
    demo::DemoSession,
    deserializer::DecodeIssue,
    entity::{ConnectionHandle, Entity, Npc},
    frame::{FrameState, StateStack},
    record::{FieldValue, Fields},
    storage::{FileStore, MemoryFs},
    store::SaveStore,
    PersistError, StoreConfig,
};
use serde_json::json;
use std::path::Path;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn build() -> SaveStore<MemoryFs> {
    init_logging();
    SaveStore::with_fs(StoreConfig::under("/mem"), MemoryFs::new())
}

fn build_with_retention(retention: usize) -> SaveStore<MemoryFs> {
    init_logging();
    SaveStore::with_fs(StoreConfig::under("/mem").with_retention(retention), MemoryFs::new())
}

fn seed_slot(store: &SaveStore<MemoryFs>, slot: &str, value: serde_json::Value) {
    store.fs().seed(store.slot_path(slot), value.to_string());
}

#[test]
fn demo_session_survives_save_and_load() {
    let mut store = build();
    let demo = DemoSession::generate(7);

    let report = store.save("quick", &demo.stack, &demo.world).expect("save");
    assert!(report.backup.is_none(), "first save has nothing to back up");
    assert!(report.dropped_fields.is_empty());

    let session = store.load("quick").expect("load");
    assert!(session.report.is_clean(), "issues: {:?}", session.report.issues);
    assert_eq!(session.metadata.name, "quick");
    assert_eq!(session.metadata.schema_version, "1.3.0");
    assert_eq!(session.stack.tags(), vec!["main_menu", "exploring", "dialogue"]);
    assert_eq!(session.world.entities.len(), demo.world.entities.len());
    assert_eq!(
        session.world.player().map(|p| p.name.clone()),
        demo.world.player().map(|p| p.name.clone())
    );
    assert!(
        session.stack.iter().all(|f| f.session() == Some(session.session_id)),
        "every frame should be wired to the new session"
    );

    // The dialogue frame and the map's occupant list name the same merchant.
    let Some(FrameState::Dialogue { npc, .. }) = session.stack.top().map(|f| &f.state) else {
        panic!("top frame should be dialogue");
    };
    let Some(FrameState::Exploring { area }) = session.stack.iter().nth(1).map(|f| &f.state) else {
        panic!("frame 1 should be exploring");
    };
    let occupants = &session.world.entities.map_area(*area).expect("map").occupants;
    assert!(occupants.contains(npc), "dialogue npc should be one of the map's occupants");
}

#[test]
fn save_in_combat_is_refused_without_writing() {
    let store = build();
    let demo = DemoSession::generate(11);
    let mut stack = demo.stack.clone();
    stack.push(FrameState::Combat { enemies: vec![demo.guard], round: 1 });

    let err = store.save("quick", &stack, &demo.world).expect_err("combat save must fail");
    assert!(
        matches!(&err, PersistError::UnsafeToSave { state } if state == "combat"),
        "expected UnsafeToSave(combat), got {err:?}"
    );
    assert_eq!(store.fs().write_count(), 0, "a refused save must not write");
    assert!(store.fs().paths().is_empty());
    assert!(err.user_message().contains("combat"));
}

#[test]
fn refused_save_leaves_existing_slot_untouched() {
    let store = build();
    let demo = DemoSession::generate(12);
    store.save("quick", &demo.stack, &demo.world).expect("first save");
    let before = store.fs().read_bytes(&store.slot_path("quick")).expect("read");

    let mut stack = demo.stack.clone();
    stack.push(FrameState::Trade { partner: demo.merchant, offered: Vec::new() });
    assert!(matches!(
        store.save("quick", &stack, &demo.world),
        Err(PersistError::UnsafeToSave { .. })
    ));

    assert_eq!(store.fs().write_count(), 1);
    assert_eq!(store.fs().read_bytes(&store.slot_path("quick")).expect("read"), before);
}

#[test]
fn newer_schema_version_is_rejected() {
    let mut store = build();
    seed_slot(
        &store,
        "future",
        json!({
            "metadata": {"name": "future", "created_at": "2030-01-01T00:00:00Z", "schema_version": "99.0.0"},
            "stack": [],
            "world": {"entities": {}}
        }),
    );

    let err = store.load("future").expect_err("99.0.0 must not load");
    match err {
        PersistError::UnsupportedVersion { found, current } => {
            assert_eq!(found, "99.0.0");
            assert_eq!(current, "1.3.0");
        }
        other => panic!("expected UnsupportedVersion, got {other:?}"),
    }
}

#[test]
fn missing_top_level_fields_are_malformed() {
    let mut store = build();
    seed_slot(&store, "nometa", json!({"world": {}}));
    seed_slot(&store, "badstack", json!({"stack": 5}));

    for slot in ["nometa", "badstack"] {
        let err = store.load(slot).expect_err("malformed envelope must not load");
        assert!(
            matches!(err, PersistError::MalformedEnvelope { .. }),
            "{slot}: expected MalformedEnvelope, got {err:?}"
        );
    }
}

#[test]
fn missing_and_invalid_slots_are_typed_errors() {
    let mut store = build();
    assert!(matches!(store.load("nobody"), Err(PersistError::SlotNotFound { .. })));
    assert!(matches!(store.delete("nobody"), Err(PersistError::SlotNotFound { .. })));
    assert!(matches!(store.load("../etc"), Err(PersistError::InvalidSlotName { .. })));
    assert!(matches!(store.load(""), Err(PersistError::InvalidSlotName { .. })));
}

#[test]
fn backups_are_taken_and_pruned_to_retention() {
    let store = build_with_retention(2);
    let demo = DemoSession::generate(3);

    let mut last = None;
    for _ in 0..4 {
        last = Some(store.save("slot1", &demo.stack, &demo.world).expect("save"));
    }
    let last = last.expect("at least one save");
    assert!(last.backup.is_some(), "overwriting save should back up");
    assert_eq!(last.pruned.len(), 1, "third backup pushes the oldest out");

    let backups = store.list_backups("slot1").expect("list backups");
    assert_eq!(backups.len(), 2);
    assert!(backups[0].taken_at > backups[1].taken_at, "newest first");
    assert!(backups.iter().all(|b| b.path.starts_with("/mem/backups")));
}

#[test]
fn zero_retention_disables_backups() {
    let store = build_with_retention(0);
    let demo = DemoSession::generate(3);
    store.save("slot1", &demo.stack, &demo.world).expect("save");
    let report = store.save("slot1", &demo.stack, &demo.world).expect("save again");
    assert!(report.backup.is_none());
    assert!(store.list_backups("slot1").expect("list").is_empty());
}

#[test]
fn list_skips_unreadable_files_and_flags_incompatible_ones() {
    let store = build();
    let demo = DemoSession::generate(5);
    store.save("b", &demo.stack, &demo.world).expect("save b");
    store.save("a", &demo.stack, &demo.world).expect("save a");
    store.fs().seed(Path::new("/mem/saves/broken.json"), "not json at all");
    store.fs().seed(Path::new("/mem/saves/notes.txt"), "ignored");
    seed_slot(
        &store,
        "old",
        json!({
            "metadata": {"name": "old", "schema_version": "99.0.0"},
            "stack": [],
            "world": {}
        }),
    );

    let slots = store.list_slots().expect("list");
    let names: Vec<&str> = slots.iter().map(|s| s.slot.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "old"]);
    assert!(slots[0].compatible && slots[0].created_at.is_some());
    assert!(!slots[2].compatible);
    assert_eq!(slots[2].created_at, None);
}

#[test]
fn delete_removes_the_slot() {
    let mut store = build();
    let demo = DemoSession::generate(9);
    store.save("gone", &demo.stack, &demo.world).expect("save");
    store.delete("gone").expect("delete");
    assert!(matches!(store.load("gone"), Err(PersistError::SlotNotFound { .. })));
    assert!(store.list_slots().expect("list").is_empty());
}

#[test]
fn bare_state_bundle_is_normalized() {
    let mut store = build();
    let bundle = json!({
        "stack": [{"type": "main_menu", "fields": {}}],
        "entities": {"0": {"type": "player", "id": 0, "fields": {"name": "Ada"}}},
        "player": 0
    });

    let session = store.restore(bundle, "bare").expect("bare bundle should load");
    assert_eq!(session.metadata.name, "bare");
    assert_eq!(session.metadata.schema_version, "1.3.0");
    assert_eq!(session.stack.tags(), vec!["main_menu"]);
    let player = session.world.player().expect("player restored");
    assert_eq!(player.name, "Ada");
    assert_eq!(player.level, 1, "missing fields fall back to defaults");
}

#[test]
fn unresolvable_player_fails_the_load() {
    let mut store = build();
    let bundle = json!({
        "stack": [],
        "entities": {"0": {"type": "Wizard", "id": 0, "fields": {"name": "Ada"}}},
        "player": 0
    });
    let err = store.restore(bundle, "wiz").expect_err("player is mandatory");
    assert!(
        matches!(&err, PersistError::UnknownType { tag } if tag == "Wizard"),
        "expected UnknownType(Wizard), got {err:?}"
    );
}

#[test]
fn unknown_entity_degrades_but_keeps_its_nested_entities() {
    let mut store = build();
    let bundle = json!({
        "stack": [],
        "entities": {
            "3": {"type": "dragon", "id": 3, "fields": {
                "name": "Smaug",
                "hoard": [{"type": "item", "id": 7, "fields": {"name": "Arkenstone"}}]
            }},
            "5": {"type": "player", "id": 5, "fields": {"name": "Bilbo", "inventory": [{"ref": 7}]}},
            "7": {"ref": 7}
        },
        "player": 5
    });

    let session = store.restore(bundle, "hoard").expect("degraded load still succeeds");
    let issues = &session.report.issues;
    assert!(
        issues.iter().any(|i| matches!(i, DecodeIssue::UnknownType { tag } if tag == "dragon")),
        "dragon should be reported: {issues:?}"
    );

    let world = &session.world;
    let dragon = world
        .entities
        .iter()
        .find_map(|(_, e)| match e {
            Entity::Unresolved(u) => Some(u),
            _ => None,
        })
        .expect("placeholder kept");
    assert_eq!(dragon.type_tag, "dragon");
    assert!(dragon.fields.contains_key("name"));
    assert!(!dragon.fields.contains_key("hoard"), "only primitive fields survive");

    let player = world.player().expect("player");
    let stone = world.entities.item(player.inventory[0]).expect("item rebuilt from the hoard");
    assert_eq!(stone.name, "Arkenstone");
}

#[test]
fn dangling_world_entry_is_dropped_and_reported() {
    let mut store = build();
    let bundle = json!({
        "stack": [],
        "entities": {
            "1": {"type": "npc", "id": 1, "fields": {"name": "Hale"}},
            "2": {"ref": 40}
        }
    });
    let session = store.restore(bundle, "dangle").expect("load");
    assert_eq!(session.world.entities.len(), 1);
    assert!(session
        .report
        .issues
        .iter()
        .any(|i| matches!(i, DecodeIssue::WorldEntryDropped { key, .. } if key == "2")));
}

#[test]
fn corrupted_map_inside_a_frame_keeps_the_player() {
    let mut store = build();
    let demo = DemoSession::generate(7);
    store.save("quick", &demo.stack, &demo.world).expect("save");

    let bytes = store.fs().read_bytes(&store.slot_path("quick")).expect("read");
    let mut raw: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(raw["stack"][1]["fields"]["area"]["type"], json!("map_area"));
    raw["stack"][1]["fields"]["area"]["fields"]["width"] = json!("wide");
    seed_slot(&store, "quick", raw);

    let session = store.load("quick").expect("one bad field must not lose the save");
    assert_eq!(
        session.world.player().map(|p| p.name.clone()),
        demo.world.player().map(|p| p.name.clone())
    );
    assert_eq!(session.world.player().map(|p| p.inventory.len()), Some(2));
    assert_eq!(session.world.entities.len(), demo.world.entities.len());
    assert_eq!(session.stack.tags(), vec!["main_menu", "main_menu", "dialogue"]);

    let issues = &session.report.issues;
    assert!(
        issues.iter().any(|i| matches!(i, DecodeIssue::Malformed { tag, .. } if tag == "map_area")),
        "map should be reported: {issues:?}"
    );
    assert!(issues.iter().any(|i| matches!(i, DecodeIssue::FrameReplaced { index: 1, .. })));
}

#[test]
fn item_properties_with_record_keys_round_trip() {
    let mut store = build();
    let mut demo = DemoSession::generate(11);
    let items: Vec<_> = demo
        .world
        .entities
        .iter()
        .filter(|(_, e)| matches!(e, Entity::Item(_)))
        .map(|(r, _)| r)
        .collect();
    assert!(items.len() >= 2, "demo should hold several items");

    let mut slashing = Fields::new();
    slashing.insert("type".into(), FieldValue::from("slashing"));
    let mut pointer = Fields::new();
    pointer.insert("ref".into(), FieldValue::Int(3));
    for (r, props) in items.iter().zip([&slashing, &pointer]) {
        if let Some(Entity::Item(item)) = demo.world.entities.get_mut(*r) {
            item.properties = props.clone();
        }
    }

    store.save("props", &demo.stack, &demo.world).expect("save");
    let session = store.load("props").expect("load");
    assert!(session.report.is_clean(), "issues: {:?}", session.report.issues);

    for props in [&slashing, &pointer] {
        let item = session
            .world
            .entities
            .iter()
            .find_map(|(_, e)| match e {
                Entity::Item(item) if &item.properties == props => Some(item),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no item came back with properties {props:?}"));
        assert!(item.owner.is_some(), "owner link survives");
    }
}

#[test]
fn live_connection_is_not_persisted() {
    let mut store = build();
    let mut demo = DemoSession::generate(21);
    let player = demo.world.player.expect("demo has a player");
    if let Some(Entity::Player(p)) = demo.world.entities.get_mut(player) {
        p.connection = Some(ConnectionHandle { peer: "10.0.0.2:7777".into() });
    }

    let report = store.save("net", &demo.stack, &demo.world).expect("save");
    assert_eq!(report.dropped_fields.len(), 1);
    assert_eq!(report.dropped_fields[0].field, "connection");

    let session = store.load("net").expect("load");
    assert!(session.world.player().expect("player").connection.is_none());
}

#[test]
fn failed_write_is_an_io_error_with_the_slot() {
    let store = build();
    store.fs().set_fail_writes(true);
    let demo = DemoSession::generate(1);
    let err = store.save("disk", &demo.stack, &demo.world).expect_err("write fails");
    assert!(
        matches!(&err, PersistError::Io { slot, operation: "write", .. } if slot == "disk"),
        "got {err:?}"
    );
}

#[test]
fn local_directory_round_trip() {
    init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = SaveStore::open(StoreConfig::under(dir.path()));

    let mut world = questlog_core::World::new();
    let npc = world.spawn(Npc::new("Nell", "herbalist"));
    let stack: StateStack = [FrameState::MainMenu, FrameState::Market { merchant: npc, page: 1 }]
        .into_iter()
        .collect();

    store.save("disk", &stack, &world).expect("first save");
    store.save("disk", &stack, &world).expect("second save");

    assert!(dir.path().join("saves").join("disk.json").is_file());
    assert_eq!(store.list_backups("disk").expect("backups").len(), 1);

    let session = store.load("disk").expect("load");
    assert_eq!(session.stack.tags(), vec!["main_menu", "market"]);
    assert_eq!(store.list_slots().expect("list").len(), 1);
}
