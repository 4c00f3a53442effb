//! Slot names and slot listings.

use crate::{
    error::{PersistError, PersistResult},
    types::SlotName,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const MAX_SLOT_NAME_LEN: usize = 64;

/// A slot name becomes a file name, so it may not escape the save directory.
pub fn validate_slot_name(slot: &str) -> PersistResult<()> {
    let ok = !slot.is_empty()
        && slot.chars().count() <= MAX_SLOT_NAME_LEN
        && !slot.starts_with('.')
        && !slot.chars().any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
    if ok {
        Ok(())
    } else {
        Err(PersistError::InvalidSlotName { slot: slot.to_string() })
    }
}

/// One entry of `SaveStore::list_slots`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotInfo {
    pub slot:           SlotName,
    /// Name stored in the save's metadata.
    pub name:           String,
    /// None for legacy saves that predate `created_at`.
    pub created_at:     Option<DateTime<Utc>>,
    pub schema_version: String,
    /// Whether the migration chain can bring this save up to current.
    pub compatible:     bool,
}
