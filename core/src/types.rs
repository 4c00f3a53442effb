//! Shared primitive types used across the entire persistence engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A string naming the concrete type a Record or StateFrame is rebuilt as.
pub type TypeTag = String;

/// A save slot name, as chosen by the player.
pub type SlotName = String;

/// Per-object identity used only inside one serialize/deserialize pass.
/// Never an in-game id: it is the arena index at save time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(pub u64);

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one running session that frames are wired to after a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
