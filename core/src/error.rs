use crate::types::{IdentityKey, SlotName, TypeTag};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Unknown type tag '{tag}'")]
    UnknownType { tag: TypeTag },

    #[error("Dangling reference to {identity}: no full record was emitted before it")]
    DanglingReference { identity: IdentityKey },

    #[error("Schema version {found} has no migration path to {current}")]
    UnsupportedVersion { found: String, current: String },

    #[error("Cannot save while in state '{state}'")]
    UnsafeToSave { state: TypeTag },

    #[error("Malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    #[error("Malformed '{tag}' record: {reason}")]
    MalformedRecord { tag: TypeTag, reason: String },

    #[error("Invalid slot name '{slot}'")]
    InvalidSlotName { slot: SlotName },

    #[error("Save slot '{slot}' not found")]
    SlotNotFound { slot: SlotName },

    #[error("Failed to {operation} save slot '{slot}': {source}")]
    Io {
        slot:      SlotName,
        operation: &'static str,
        #[source]
        source:    std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PersistError {
    pub fn malformed(tag: impl Into<TypeTag>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord { tag: tag.into(), reason: reason.into() }
    }

    /// Node-level failures are recovered locally with a degraded substitute.
    /// Everything else aborts the whole save/load.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownType { .. } | Self::MalformedRecord { .. } | Self::DanglingReference { .. }
        )
    }

    /// Text suitable for showing to the player.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedVersion { found, .. } => {
                format!("Incompatible save (version {found}). It was made by a newer or unknown build.")
            }
            Self::UnsafeToSave { state } => {
                format!("You cannot save right now ({} in progress).", state.replace('_', " "))
            }
            Self::MalformedEnvelope { .. } | Self::Serialization(_) => {
                "This save file is damaged and cannot be loaded.".to_string()
            }
            Self::SlotNotFound { slot } => format!("There is no save named '{slot}'."),
            Self::InvalidSlotName { slot } => format!("'{slot}' is not a valid save name."),
            Self::Io { slot, operation, .. } => {
                format!("Could not {operation} the save '{slot}'. Check disk space and permissions.")
            }
            Self::UnknownType { .. }
            | Self::DanglingReference { .. }
            | Self::MalformedRecord { .. } => {
                "Part of this save could not be restored.".to_string()
            }
            Self::Other(_) => "An unexpected error occurred.".to_string(),
        }
    }
}

pub type PersistResult<T> = Result<T, PersistError>;

/// Failure to turn one field value into a record value.
/// The field is omitted and the failure logged; the save continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("value of type {type_name} cannot be persisted")]
    Unserializable { type_name: &'static str },

    #[error("reference points outside the world ({index})")]
    MissingEntity { index: u32 },

    #[error("non-finite float {0}")]
    NonFinite(f64),
}
