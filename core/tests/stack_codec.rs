//! State-stack codec tests: order preservation, per-frame degradation and
//! post-load wiring to the session.

use questlog_core::{
    deserializer::{DecodeIssue, GraphDeserializer},
    entity::{Entity, Npc},
    frame::{FrameState, GameContext, StateStack},
    record::{FieldValue, Fields, Record},
    registry::TypeRegistry,
    serializer::GraphSerializer,
    stack_codec::StateStackCodec,
    types::SessionId,
    world::{EntityArena, World},
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Decode `records` with fresh built-in registries.
fn decode(records: &[Record]) -> (StateStack, EntityArena, Vec<DecodeIssue>) {
    let mut entities = TypeRegistry::<Entity>::with_builtins();
    let mut frames = TypeRegistry::<FrameState>::with_builtins();
    let mut de = GraphDeserializer::new(&mut entities);
    let stack = StateStackCodec::new(&mut frames).decode(records, &mut de);
    let (arena, issues) = de.finish();
    (stack, arena, issues)
}

fn menu_dialogue_combat() -> (World, StateStack) {
    let mut world = World::new();
    let x = world.spawn(Npc::new("Corwin", "innkeeper"));
    let y = world.spawn(Npc::new("Bandit", "raider"));
    let stack = [
        FrameState::MainMenu,
        FrameState::Dialogue { npc: x, node: "rumours".into() },
        FrameState::Combat { enemies: vec![y], round: 3 },
    ]
    .into_iter()
    .collect();
    (world, stack)
}

#[test]
fn three_frame_stack_keeps_order_and_types() {
    let (world, stack) = menu_dialogue_combat();
    let mut ser = GraphSerializer::new(&world.entities);
    let records = StateStackCodec::encode(&stack, &mut ser);
    assert_eq!(records.len(), 3);

    let (decoded, arena, issues) = decode(&records);
    assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    assert_eq!(decoded.tags(), vec!["main_menu", "dialogue", "combat"]);

    let frames: Vec<&FrameState> = decoded.iter().map(|f| &f.state).collect();
    match frames[1] {
        FrameState::Dialogue { npc, node } => {
            assert_eq!(node, "rumours");
            assert_eq!(arena.npc(*npc).map(|n| n.name.as_str()), Some("Corwin"));
        }
        other => panic!("frame 1 should be dialogue, got {other:?}"),
    }
    match frames[2] {
        FrameState::Combat { enemies, round } => {
            assert_eq!(*round, 3);
            assert_eq!(arena.npc(enemies[0]).map(|n| n.name.as_str()), Some("Bandit"));
        }
        other => panic!("frame 2 should be combat, got {other:?}"),
    }
}

#[test]
fn unknown_frame_type_degrades_in_place() {
    init_logging();
    let mut ghost_fields = Fields::new();
    ghost_fields.insert("mood".into(), FieldValue::from("eerie"));
    let records = vec![
        Record::node("main_menu", None, Fields::new()),
        Record::node("GhostState", None, ghost_fields),
        Record::node("inventory", None, Fields::new()),
    ];

    let (decoded, _, issues) = decode(&records);

    assert_eq!(decoded.len(), 3, "one bad frame must not shorten the stack");
    assert_eq!(decoded.tags(), vec!["main_menu", "main_menu", "main_menu"]);
    assert!(
        issues.iter().any(|i| matches!(
            i,
            DecodeIssue::FrameReplaced { index: 1, tag: Some(tag), .. } if tag == "GhostState"
        )),
        "ghost frame should be reported: {issues:?}"
    );
    // The inventory frame has no owner field, so it is malformed and also replaced.
    assert!(issues.iter().any(|i| matches!(i, DecodeIssue::FrameReplaced { index: 2, .. })));
}

#[test]
fn type_name_tags_resolve_through_the_builtin_fallback() {
    let mut world = World::new();
    let npc = world.spawn(Npc::new("Liora", "scribe"));
    let mut ser = GraphSerializer::new(&world.entities);
    let npc_record = ser.serialize(npc).expect("serialize npc");

    let mut fields = Fields::new();
    fields.insert("npc".into(), FieldValue::from(npc_record));
    let records = vec![Record::node("DialogueState", None, fields)];

    let mut entities = TypeRegistry::<Entity>::with_builtins();
    let mut frames = TypeRegistry::<FrameState>::new();
    let mut de = GraphDeserializer::new(&mut entities);
    let decoded = StateStackCodec::new(&mut frames).decode(&records, &mut de);

    assert_eq!(decoded.tags(), vec!["dialogue"]);
    assert!(frames.contains("DialogueState"), "fallback hit should be registered");
}

#[test]
fn attach_wires_session_and_replaces_wrong_kind_frames() {
    init_logging();
    let mut world = World::new();
    let npc = world.spawn(Npc::new("Osric", "miller"));
    let stack: StateStack = [
        FrameState::MainMenu,
        // An npc where a map area belongs.
        FrameState::Exploring { area: npc },
        FrameState::Market { merchant: npc, page: 2 },
    ]
    .into_iter()
    .collect();

    let mut ser = GraphSerializer::new(&world.entities);
    let records = StateStackCodec::encode(&stack, &mut ser);
    let (mut decoded, arena, _) = decode(&records);

    let restored = World { entities: arena, player: None };
    let session = SessionId::new();
    let issues = StateStackCodec::attach(&mut decoded, &GameContext::new(session, &restored));

    assert_eq!(decoded.tags(), vec!["main_menu", "main_menu", "market"]);
    assert_eq!(issues.len(), 1, "only the exploring frame is wrong: {issues:?}");
    assert!(decoded.iter().all(|f| f.session() == Some(session)));
}

#[test]
fn malformed_frame_still_yields_its_nested_entities() {
    init_logging();
    let mut world = World::new();
    let npc = world.spawn(Npc::new("Odo", "merchant"));
    let mut ser = GraphSerializer::new(&world.entities);
    let npc_record = ser.serialize(npc).expect("serialize npc");
    let identity = npc_record.identity().expect("entities carry an id");

    let mut market = Fields::new();
    market.insert("merchant".into(), FieldValue::from(npc_record));
    market.insert("page".into(), FieldValue::from("two"));
    let mut dialogue = Fields::new();
    dialogue.insert("npc".into(), FieldValue::from(Record::reference(identity)));
    let records = vec![
        Record::node("market", None, market),
        Record::node("dialogue", None, dialogue),
    ];

    let (decoded, arena, issues) = decode(&records);

    assert_eq!(decoded.tags(), vec!["main_menu", "dialogue"]);
    assert_eq!(arena.len(), 1, "the merchant is rebuilt once, not again when its frame fails");
    let Some(FrameState::Dialogue { npc, .. }) = decoded.top().map(|f| &f.state) else {
        panic!("top frame should be dialogue");
    };
    assert_eq!(arena.npc(*npc).map(|n| n.name.as_str()), Some("Odo"));
    assert!(
        issues.iter().any(|i| matches!(
            i,
            DecodeIssue::FrameReplaced { index: 0, tag: Some(tag), .. } if tag == "market"
        )),
        "market frame should be reported: {issues:?}"
    );
}
