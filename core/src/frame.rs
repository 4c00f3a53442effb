//! The interactive-state stack and its frames.
//!
//! A frame is pushed when an interaction begins and popped when it ends.
//! Its position in the stack is significant and must round-trip exactly.
//! Frames only mean something inside a running session: after a load they
//! are wired to the session through `StateStackCodec::attach`.

use crate::{
    deserializer::{FieldReader, GraphDeserializer},
    entity::EntityKind,
    error::PersistResult,
    registry::{BuiltinCatalog, Reconstructor},
    serializer::{FieldWriter, Serializable},
    types::SessionId,
    world::{EntityRef, World},
};

#[derive(Debug, Clone, PartialEq)]
pub enum FrameState {
    /// Neutral top-level menu. Also the substitute for frames that fail
    /// to decode.
    MainMenu,
    Exploring { area: EntityRef },
    Dialogue { npc: EntityRef, node: String },
    Market { merchant: EntityRef, page: u32 },
    Combat { enemies: Vec<EntityRef>, round: u32 },
    Trade { partner: EntityRef, offered: Vec<EntityRef> },
    Inventory { owner: EntityRef },
}

impl FrameState {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::MainMenu         => "main_menu",
            Self::Exploring { .. } => "exploring",
            Self::Dialogue { .. }  => "dialogue",
            Self::Market { .. }    => "market",
            Self::Combat { .. }    => "combat",
            Self::Trade { .. }     => "trade",
            Self::Inventory { .. } => "inventory",
        }
    }

    /// Every entity this frame points at, with the kinds it accepts there.
    pub fn references(&self) -> Vec<(EntityRef, &'static [EntityKind])> {
        const MAP: &[EntityKind] = &[EntityKind::MapArea];
        const NPC: &[EntityKind] = &[EntityKind::Npc];
        const ITEM: &[EntityKind] = &[EntityKind::Item];
        const HOLDER: &[EntityKind] = &[EntityKind::Player, EntityKind::Npc];

        match self {
            Self::MainMenu => Vec::new(),
            Self::Exploring { area } => vec![(*area, MAP)],
            Self::Dialogue { npc, .. } => vec![(*npc, NPC)],
            Self::Market { merchant, .. } => vec![(*merchant, NPC)],
            Self::Combat { enemies, .. } => enemies.iter().map(|e| (*e, NPC)).collect(),
            Self::Trade { partner, offered } => std::iter::once((*partner, NPC))
                .chain(offered.iter().map(|i| (*i, ITEM)))
                .collect(),
            Self::Inventory { owner } => vec![(*owner, HOLDER)],
        }
    }
}

impl Serializable for FrameState {
    fn type_tag(&self) -> &str {
        self.tag()
    }

    fn write_fields(&self, out: &mut FieldWriter<'_, '_>) {
        match self {
            Self::MainMenu => {}
            Self::Exploring { area } => out.entity("area", *area),
            Self::Dialogue { npc, node } => {
                out.entity("npc", *npc);
                out.put("node", node.as_str());
            }
            Self::Market { merchant, page } => {
                out.entity("merchant", *merchant);
                out.put("page", *page);
            }
            Self::Combat { enemies, round } => {
                out.entity_list("enemies", enemies);
                out.put("round", *round);
            }
            Self::Trade { partner, offered } => {
                out.entity("partner", *partner);
                out.entity_list("offered", offered);
            }
            Self::Inventory { owner } => out.entity("owner", *owner),
        }
    }
}

fn reconstruct_main_menu(_: &FieldReader<'_>, _: &mut GraphDeserializer<'_>) -> PersistResult<FrameState> {
    Ok(FrameState::MainMenu)
}

fn reconstruct_exploring(f: &FieldReader<'_>, de: &mut GraphDeserializer<'_>) -> PersistResult<FrameState> {
    Ok(FrameState::Exploring { area: f.entity(de, "area")? })
}

fn reconstruct_dialogue(f: &FieldReader<'_>, de: &mut GraphDeserializer<'_>) -> PersistResult<FrameState> {
    Ok(FrameState::Dialogue {
        npc:  f.entity(de, "npc")?,
        node: f.text_or("node", "start")?,
    })
}

fn reconstruct_market(f: &FieldReader<'_>, de: &mut GraphDeserializer<'_>) -> PersistResult<FrameState> {
    Ok(FrameState::Market {
        merchant: f.entity(de, "merchant")?,
        page:     f.int_or("page", 0)?,
    })
}

fn reconstruct_combat(f: &FieldReader<'_>, de: &mut GraphDeserializer<'_>) -> PersistResult<FrameState> {
    Ok(FrameState::Combat {
        enemies: f.entity_list(de, "enemies")?,
        round:   f.int_or("round", 1)?,
    })
}

fn reconstruct_trade(f: &FieldReader<'_>, de: &mut GraphDeserializer<'_>) -> PersistResult<FrameState> {
    Ok(FrameState::Trade {
        partner: f.entity(de, "partner")?,
        offered: f.entity_list(de, "offered")?,
    })
}

fn reconstruct_inventory(f: &FieldReader<'_>, de: &mut GraphDeserializer<'_>) -> PersistResult<FrameState> {
    Ok(FrameState::Inventory { owner: f.entity(de, "owner")? })
}

impl BuiltinCatalog for FrameState {
    fn builtins() -> Vec<(&'static str, Reconstructor<Self>)> {
        vec![
            ("main_menu", reconstruct_main_menu as Reconstructor<Self>),
            ("exploring", reconstruct_exploring as Reconstructor<Self>),
            ("dialogue", reconstruct_dialogue as Reconstructor<Self>),
            ("market", reconstruct_market as Reconstructor<Self>),
            ("combat", reconstruct_combat as Reconstructor<Self>),
            ("trade", reconstruct_trade as Reconstructor<Self>),
            ("inventory", reconstruct_inventory as Reconstructor<Self>),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateFrame {
    pub state: FrameState,
    session:   Option<SessionId>,
}

impl StateFrame {
    pub fn new(state: FrameState) -> Self {
        Self { state, session: None }
    }

    pub fn safe_default() -> Self {
        Self::new(FrameState::MainMenu)
    }

    pub fn tag(&self) -> &'static str {
        self.state.tag()
    }

    /// The session this frame is wired to; None until attached.
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub(crate) fn attach_to(&mut self, session: SessionId) {
        self.session = Some(session);
    }
}

impl From<FrameState> for StateFrame {
    fn from(state: FrameState) -> Self {
        Self::new(state)
    }
}

/// Ordered stack of active frames. Index 0 is the bottom.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateStack {
    frames: Vec<StateFrame>,
}

impl StateStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: impl Into<StateFrame>) {
        self.frames.push(frame.into());
    }

    pub fn pop(&mut self) -> Option<StateFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&StateFrame> {
        self.frames.last()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Bottom to top.
    pub fn iter(&self) -> std::slice::Iter<'_, StateFrame> {
        self.frames.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut StateFrame> {
        self.frames.iter_mut()
    }

    pub fn tags(&self) -> Vec<&'static str> {
        self.frames.iter().map(StateFrame::tag).collect()
    }
}

impl From<Vec<StateFrame>> for StateStack {
    fn from(frames: Vec<StateFrame>) -> Self {
        Self { frames }
    }
}

impl FromIterator<FrameState> for StateStack {
    fn from_iter<I: IntoIterator<Item = FrameState>>(iter: I) -> Self {
        Self { frames: iter.into_iter().map(StateFrame::new).collect() }
    }
}

/// The live session that reconstructed frames are wired to.
pub struct GameContext<'w> {
    pub session_id: SessionId,
    pub world:      &'w World,
}

impl<'w> GameContext<'w> {
    pub fn new(session_id: SessionId, world: &'w World) -> Self {
        Self { session_id, world }
    }
}
