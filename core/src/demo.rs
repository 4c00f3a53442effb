//! Seeded demo session: a small world and a three-frame stack.
//!
//! Used by `save-runner demo` and the determinism tests. The world has
//! the shapes the persistence layer cares about: items that point back at
//! their holders, NPCs and the player sharing a map that lists them, and
//! an item lying on the ground with no owner.

use crate::{
    entity::{Entity, Item, MapArea, Npc, Player},
    frame::{FrameState, StateStack},
    name_generator::NameGenerator,
    record::FieldValue,
    rng::{RngStream, SeededRng},
    world::{EntityRef, World},
};

const ITEM_KINDS: &[&str] = &["weapon", "armor", "trinket"];

pub struct DemoSession {
    pub seed:     u64,
    pub world:    World,
    pub stack:    StateStack,
    pub area:     EntityRef,
    pub merchant: EntityRef,
    pub guard:    EntityRef,
}

impl DemoSession {
    pub fn generate(seed: u64) -> Self {
        let mut names = SeededRng::new(seed, RngStream::Names);
        let mut rolls = SeededRng::new(seed, RngStream::World);
        let mut items = SeededRng::new(seed, RngStream::Items);
        let mut world = World::new();

        let mut area = MapArea::new(
            NameGenerator::area_name(&mut names),
            rolls.range_u32(16, 64),
            rolls.range_u32(16, 64),
        );
        area.discovered = true;
        let area = world.spawn(area);

        let mut player = Player::new(NameGenerator::given_name(&mut names));
        player.level = rolls.range_u32(1, 10);
        player.max_hp = 20 + 5 * player.level as i32;
        player.hp = player.max_hp - rolls.range_i64(0, 10) as i32;
        player.gold = rolls.range_i64(10, 500);
        player.flags.insert("tutorial_done".into(), true);
        player.flags.insert("met_merchant".into(), rolls.chance(0.5));
        let player = world.spawn(player);
        world.player = Some(player);

        let mut merchant = Npc::new(NameGenerator::character_name(&mut names), "merchant");
        merchant.disposition = rolls.range_i64(0, 50) as i32;
        merchant.dialogue_node = Some("greeting".into());
        let merchant = world.spawn(merchant);

        let mut guard = Npc::new(NameGenerator::character_name(&mut names), "guard");
        guard.disposition = rolls.range_i64(-20, 20) as i32;
        let guard = world.spawn(guard);

        for occupant in [player, merchant, guard] {
            world.place(area, occupant);
        }

        for (holder, count) in [(player, 2), (merchant, 3), (guard, 1)] {
            for _ in 0..count {
                let item = world.spawn(roll_item(&mut items));
                world.give_item(holder, item);
            }
        }

        let loot = world.spawn(roll_item(&mut items));
        if let Some(Entity::MapArea(m)) = world.entities.get_mut(area) {
            m.loot.push(loot);
        }

        let stack = [
            FrameState::MainMenu,
            FrameState::Exploring { area },
            FrameState::Dialogue { npc: merchant, node: "greeting".into() },
        ]
        .into_iter()
        .collect();

        log::debug!("Generated demo session for seed {seed}");
        Self { seed, world, stack, area, merchant, guard }
    }
}

fn roll_item(rng: &mut SeededRng) -> Item {
    let kind = *rng.pick(ITEM_KINDS);
    let mut item = Item::new(NameGenerator::item_name(rng, kind), kind, rng.range_i64(1, 250));
    item.weight = rng.range_u32(1, 80) as f64 / 10.0;
    item.tags.push(kind.to_string());
    if kind == "weapon" {
        item.properties.insert("damage".into(), FieldValue::Int(rng.range_i64(2, 12)));
    }
    if rng.chance(0.2) {
        item.tags.push("quest".into());
    }
    item
}
