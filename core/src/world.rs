//! Flat entity arena.
//!
//! RULE: entities never own each other. A field that points at another
//! entity stores its `EntityRef`, so cyclic graphs (NPC holds item, item
//! names its owner) are plain data.

use crate::{
    entity::{Entity, EntityKind, Item, MapArea, Npc, Player},
    types::IdentityKey,
};

/// Typed index into an `EntityArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef(u32);

impl EntityRef {
    pub fn index(self) -> u32 {
        self.0
    }

    /// Identity key used while serializing this arena.
    pub fn identity(self) -> IdentityKey {
        IdentityKey(u64::from(self.0))
    }
}

fn slot_index(len: usize) -> u32 {
    match u32::try_from(len) {
        Ok(index) => index,
        Err(_) => panic!(
            "entity arena is full: an EntityRef addresses at most {} slots",
            u64::from(u32::MAX) + 1
        ),
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityArena {
    slots: Vec<Option<Entity>>,
}

impl EntityArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity) -> EntityRef {
        let r = self.reserve();
        self.slots[r.0 as usize] = Some(entity);
        r
    }

    /// Claim a slot before its entity exists. The deserializer does this
    /// so that cyclic fields can resolve to the slot while it is being built.
    ///
    /// Panics once the arena holds more slots than an `EntityRef` can
    /// address (`u32::MAX + 1`).
    pub fn reserve(&mut self) -> EntityRef {
        let index = slot_index(self.slots.len());
        self.slots.push(None);
        EntityRef(index)
    }

    pub fn fill(&mut self, r: EntityRef, entity: Entity) {
        if let Some(slot) = self.slots.get_mut(r.0 as usize) {
            *slot = Some(entity);
        }
    }

    pub fn get(&self, r: EntityRef) -> Option<&Entity> {
        self.slots.get(r.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, r: EntityRef) -> Option<&mut Entity> {
        self.slots.get_mut(r.0 as usize).and_then(Option::as_mut)
    }

    pub fn kind_of(&self, r: EntityRef) -> Option<EntityKind> {
        self.get(r).map(Entity::kind)
    }

    /// Number of filled slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Filled slots in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityRef, &Entity)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (EntityRef(i as u32), e)))
    }

    pub fn player(&self, r: EntityRef) -> Option<&Player> {
        match self.get(r)? {
            Entity::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn npc(&self, r: EntityRef) -> Option<&Npc> {
        match self.get(r)? {
            Entity::Npc(n) => Some(n),
            _ => None,
        }
    }

    pub fn item(&self, r: EntityRef) -> Option<&Item> {
        match self.get(r)? {
            Entity::Item(i) => Some(i),
            _ => None,
        }
    }

    pub fn map_area(&self, r: EntityRef) -> Option<&MapArea> {
        match self.get(r)? {
            Entity::MapArea(m) => Some(m),
            _ => None,
        }
    }
}

/// Everything the session persists besides the state stack.
#[derive(Debug, Clone, Default)]
pub struct World {
    pub entities: EntityArena,
    pub player:   Option<EntityRef>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, entity: impl Into<Entity>) -> EntityRef {
        self.entities.insert(entity.into())
    }

    pub fn player(&self) -> Option<&Player> {
        self.player.and_then(|r| self.entities.player(r))
    }

    /// Move `item` into `holder`'s inventory and point the item back at it.
    /// Returns false if either side is not a valid holder/item.
    pub fn give_item(&mut self, holder: EntityRef, item: EntityRef) -> bool {
        if self.entities.item(item).is_none() {
            return false;
        }
        let inventory = match self.entities.get_mut(holder) {
            Some(Entity::Player(p)) => &mut p.inventory,
            Some(Entity::Npc(n))    => &mut n.inventory,
            _ => return false,
        };
        if !inventory.contains(&item) {
            inventory.push(item);
        }
        if let Some(Entity::Item(i)) = self.entities.get_mut(item) {
            i.owner = Some(holder);
        }
        true
    }

    /// Add an occupant to a map area and set its location/home.
    pub fn place(&mut self, area: EntityRef, occupant: EntityRef) -> bool {
        match self.entities.get_mut(area) {
            Some(Entity::MapArea(m)) => {
                if !m.occupants.contains(&occupant) {
                    m.occupants.push(occupant);
                }
            }
            _ => return false,
        }
        match self.entities.get_mut(occupant) {
            Some(Entity::Player(p)) => p.location = Some(area),
            Some(Entity::Npc(n))    => n.home = Some(area),
            _ => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_addressable_slot_is_u32_max() {
        assert_eq!(slot_index(0), 0);
        assert_eq!(slot_index(u32::MAX as usize), u32::MAX);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    #[should_panic(expected = "entity arena is full")]
    fn slot_past_u32_max_is_never_reused() {
        slot_index(u32::MAX as usize + 1);
    }
}
