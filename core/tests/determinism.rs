//! Same seed, same session, same bytes.
//!
//! Two demo sessions generated from one seed must encode to byte-identical
//! save files. Any divergence means something in the encode path depends
//! on hash order, addresses or the clock.

use chrono::{TimeZone, Utc};
use questlog_core::{
    demo::DemoSession,
    storage::MemoryFs,
    store::{build_envelope, SaveStore},
    StoreConfig,
};

fn encode(seed: u64) -> Vec<u8> {
    let store = SaveStore::with_fs(StoreConfig::under("/mem"), MemoryFs::new());
    let demo = DemoSession::generate(seed);
    let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let (envelope, dropped) = build_envelope("det", &demo.stack, &demo.world, at);
    assert!(dropped.is_empty(), "demo sessions should encode without drops: {dropped:?}");
    store.encode(&envelope).expect("encode")
}

#[test]
fn same_seed_produces_identical_save_bytes() {
    const SEED: u64 = 0xDEAD_BEEF_CAFE_1234;

    let a = encode(SEED);
    let b = encode(SEED);

    assert_eq!(a.len(), b.len(), "Save sizes differ: {} vs {}", a.len(), b.len());
    if let Some(i) = a.iter().zip(&b).position(|(x, y)| x != y) {
        panic!(
            "Save bytes diverged at offset {i}:\n  A: {}\n  B: {}",
            String::from_utf8_lossy(&a[i.saturating_sub(40)..(i + 40).min(a.len())]),
            String::from_utf8_lossy(&b[i.saturating_sub(40)..(i + 40).min(b.len())])
        );
    }
}

#[test]
fn different_seeds_produce_different_saves() {
    assert_ne!(encode(42), encode(99), "Different seeds produced identical saves; seed is not being used");
}

#[test]
fn reloaded_session_saves_the_same_content() {
    let mut store = SaveStore::with_fs(StoreConfig::under("/mem"), MemoryFs::new());
    let demo = DemoSession::generate(7);
    store.save("first", &demo.stack, &demo.world).expect("save");
    let loaded = store.load("first").expect("load");

    store.save("second", &loaded.stack, &loaded.world).expect("re-save");
    let reloaded = store.load("second").expect("reload");

    assert_eq!(reloaded.stack.tags(), loaded.stack.tags());
    assert_eq!(reloaded.world.entities.len(), demo.world.entities.len());
    let mut names_a: Vec<_> = demo.world.entities.iter().filter_map(|(_, e)| e.name().map(str::to_string)).collect();
    let mut names_b: Vec<_> = reloaded.world.entities.iter().filter_map(|(_, e)| e.name().map(str::to_string)).collect();
    names_a.sort();
    names_b.sort();
    assert_eq!(names_a, names_b);
}
