//! Domain entities that can appear in the persisted graph.
//!
//! Each kind implements `Serializable` (its own field set) and provides a
//! reconstructor registered under its tag. Cross-entity fields hold
//! `EntityRef`s into the world arena, never owned entities.

use crate::{
    deserializer::{FieldReader, GraphDeserializer},
    error::{FieldError, PersistResult},
    record::{FieldValue, Fields},
    registry::{BuiltinCatalog, Reconstructor},
    serializer::{FieldWriter, Serializable},
    types::TypeTag,
    world::EntityRef,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Player,
    Npc,
    Item,
    MapArea,
    Unresolved,
}

impl EntityKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Player     => "player",
            Self::Npc        => "npc",
            Self::Item       => "item",
            Self::MapArea    => "map_area",
            Self::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Entity {
    Player(Player),
    Npc(Npc),
    Item(Item),
    MapArea(MapArea),
    /// Degraded stand-in for a record whose type could not be rebuilt.
    Unresolved(UnresolvedEntity),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Player(_)     => EntityKind::Player,
            Self::Npc(_)        => EntityKind::Npc,
            Self::Item(_)       => EntityKind::Item,
            Self::MapArea(_)    => EntityKind::MapArea,
            Self::Unresolved(_) => EntityKind::Unresolved,
        }
    }

    pub fn as_serializable(&self) -> &dyn Serializable {
        match self {
            Self::Player(p)     => p,
            Self::Npc(n)        => n,
            Self::Item(i)       => i,
            Self::MapArea(m)    => m,
            Self::Unresolved(u) => u,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Player(p)     => Some(&p.name),
            Self::Npc(n)        => Some(&n.name),
            Self::Item(i)       => Some(&i.name),
            Self::MapArea(m)    => Some(&m.name),
            Self::Unresolved(u) => u.fields.get("name").and_then(FieldValue::as_str),
        }
    }
}

impl From<Player> for Entity {
    fn from(v: Player) -> Self { Entity::Player(v) }
}
impl From<Npc> for Entity {
    fn from(v: Npc) -> Self { Entity::Npc(v) }
}
impl From<Item> for Entity {
    fn from(v: Item) -> Self { Entity::Item(v) }
}
impl From<MapArea> for Entity {
    fn from(v: MapArea) -> Self { Entity::MapArea(v) }
}

// ── Player ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Player {
    pub name:       String,
    pub level:      u32,
    pub hp:         i32,
    pub max_hp:     i32,
    pub gold:       i64,
    pub location:   Option<EntityRef>,
    pub inventory:  Vec<EntityRef>,
    /// Quest and tutorial flags.
    pub flags:      BTreeMap<String, bool>,
    /// Live transport handle. Never persisted.
    pub connection: Option<ConnectionHandle>,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: 1,
            hp: 20,
            max_hp: 20,
            ..Self::default()
        }
    }
}

impl Serializable for Player {
    fn type_tag(&self) -> &str {
        EntityKind::Player.tag()
    }

    fn write_fields(&self, out: &mut FieldWriter<'_, '_>) {
        out.put("name", self.name.as_str());
        out.put("level", self.level);
        out.put("hp", self.hp);
        out.put("max_hp", self.max_hp);
        out.put("gold", self.gold);
        out.optional_entity("location", self.location);
        out.entity_list("inventory", &self.inventory);
        out.bool_map("flags", &self.flags);
        if let Some(conn) = &self.connection {
            out.try_put("connection", conn.to_field());
        }
    }
}

fn reconstruct_player(f: &FieldReader<'_>, de: &mut GraphDeserializer<'_>) -> PersistResult<Entity> {
    Ok(Entity::Player(Player {
        name:       f.text("name")?,
        level:      f.int_or("level", 1)?,
        hp:         f.int_or("hp", 20)?,
        max_hp:     f.int_or("max_hp", 20)?,
        gold:       f.int_or("gold", 0)?,
        location:   f.optional_entity(de, "location")?,
        inventory:  f.entity_list(de, "inventory")?,
        flags:      f.bool_map("flags")?,
        connection: None,
    }))
}

/// A handle to the player's live client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub peer: String,
}

impl ConnectionHandle {
    pub fn to_field(&self) -> Result<FieldValue, FieldError> {
        Err(FieldError::Unserializable { type_name: "ConnectionHandle" })
    }
}

// ── NPC ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Npc {
    pub name:          String,
    pub role:          String,
    /// -100 (hostile) .. 100 (devoted).
    pub disposition:   i32,
    pub hostile:       bool,
    pub home:          Option<EntityRef>,
    pub inventory:     Vec<EntityRef>,
    pub dialogue_node: Option<String>,
}

impl Npc {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            ..Self::default()
        }
    }
}

impl Serializable for Npc {
    fn type_tag(&self) -> &str {
        EntityKind::Npc.tag()
    }

    fn write_fields(&self, out: &mut FieldWriter<'_, '_>) {
        out.put("name", self.name.as_str());
        out.put("role", self.role.as_str());
        out.put("disposition", self.disposition);
        out.put("hostile", self.hostile);
        out.optional_entity("home", self.home);
        out.entity_list("inventory", &self.inventory);
        out.optional_text("dialogue_node", self.dialogue_node.as_deref());
    }
}

fn reconstruct_npc(f: &FieldReader<'_>, de: &mut GraphDeserializer<'_>) -> PersistResult<Entity> {
    Ok(Entity::Npc(Npc {
        name:          f.text("name")?,
        role:          f.text_or("role", "villager")?,
        disposition:   f.int_or("disposition", 0)?,
        hostile:       f.bool_or("hostile", false)?,
        home:          f.optional_entity(de, "home")?,
        inventory:     f.entity_list(de, "inventory")?,
        dialogue_node: f.optional_text("dialogue_node")?,
    }))
}

// ── Item ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Item {
    pub name:       String,
    pub kind:       String,
    pub value:      i64,
    pub quantity:   u32,
    pub weight:     f64,
    /// Back-reference to whoever holds the item.
    pub owner:      Option<EntityRef>,
    pub tags:       Vec<String>,
    /// Free-form primitive attributes (damage, charges, ...).
    pub properties: Fields,
}

impl Item {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            value,
            quantity: 1,
            ..Self::default()
        }
    }
}

impl Serializable for Item {
    fn type_tag(&self) -> &str {
        EntityKind::Item.tag()
    }

    fn write_fields(&self, out: &mut FieldWriter<'_, '_>) {
        out.put("name", self.name.as_str());
        out.put("kind", self.kind.as_str());
        out.put("value", self.value);
        out.put("quantity", self.quantity);
        out.float("weight", self.weight);
        out.optional_entity("owner", self.owner);
        out.text_list("tags", &self.tags);
        out.map("properties", &self.properties);
    }
}

fn reconstruct_item(f: &FieldReader<'_>, de: &mut GraphDeserializer<'_>) -> PersistResult<Entity> {
    Ok(Entity::Item(Item {
        name:       f.text("name")?,
        kind:       f.text_or("kind", "misc")?,
        value:      f.int_or("value", 0)?,
        quantity:   f.int_or("quantity", 1)?,
        weight:     f.float_or("weight", 0.0)?,
        owner:      f.optional_entity(de, "owner")?,
        tags:       f.text_list("tags")?,
        properties: f.primitive_map("properties")?,
    }))
}

// ── Map area ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MapArea {
    pub name:       String,
    pub width:      u32,
    pub height:     u32,
    pub discovered: bool,
    pub occupants:  Vec<EntityRef>,
    /// Items lying on the ground.
    pub loot:       Vec<EntityRef>,
}

impl MapArea {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            ..Self::default()
        }
    }
}

impl Serializable for MapArea {
    fn type_tag(&self) -> &str {
        EntityKind::MapArea.tag()
    }

    fn write_fields(&self, out: &mut FieldWriter<'_, '_>) {
        out.put("name", self.name.as_str());
        out.put("width", self.width);
        out.put("height", self.height);
        out.put("discovered", self.discovered);
        out.entity_list("occupants", &self.occupants);
        out.entity_list("loot", &self.loot);
    }
}

fn reconstruct_map_area(f: &FieldReader<'_>, de: &mut GraphDeserializer<'_>) -> PersistResult<Entity> {
    Ok(Entity::MapArea(MapArea {
        name:       f.text("name")?,
        width:      f.int("width")?,
        height:     f.int("height")?,
        discovered: f.bool_or("discovered", false)?,
        occupants:  f.entity_list(de, "occupants")?,
        loot:       f.entity_list(de, "loot")?,
    }))
}

// ── Unresolved ─────────────────────────────────────────────────

/// Keeps the original tag and the primitive fields that survived, so a
/// later save writes them back out under the same tag.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedEntity {
    pub type_tag: TypeTag,
    pub fields:   Fields,
}

impl Serializable for UnresolvedEntity {
    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn write_fields(&self, out: &mut FieldWriter<'_, '_>) {
        for (name, value) in &self.fields {
            out.put(name, value.clone());
        }
    }
}

impl BuiltinCatalog for Entity {
    fn builtins() -> Vec<(&'static str, Reconstructor<Self>)> {
        vec![
            (EntityKind::Player.tag(), reconstruct_player as Reconstructor<Self>),
            (EntityKind::Npc.tag(), reconstruct_npc as Reconstructor<Self>),
            (EntityKind::Item.tag(), reconstruct_item as Reconstructor<Self>),
            (EntityKind::MapArea.tag(), reconstruct_map_area as Reconstructor<Self>),
        ]
    }
}
