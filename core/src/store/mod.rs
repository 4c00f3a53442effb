//! Save store: the only component that touches the filesystem.
//!
//! RULE: all file access goes through the `FileStore` seam.
//!
//! Save:  refuse unsafe states → encode → back up the old file → prune
//!        old backups → atomic write.
//! Load:  read → normalize → validate → migrate → decode stack and world
//!        through one deserializer → attach frames to a new session.
//!
//! Envelope-level failures abort the call. Node-level failures are
//! recovered during decode and reported in `LoadReport::issues`.

mod backup;
mod slot;

pub use backup::BackupInfo;
pub use slot::{validate_slot_name, SlotInfo, MAX_SLOT_NAME_LEN};

use crate::{
    config::StoreConfig,
    deserializer::{DecodeIssue, GraphDeserializer},
    entity::{Entity, EntityKind},
    envelope::{
        self, ordered_by_identity, SaveEnvelope, SaveMetadata, WorldBlock, CURRENT_SCHEMA_VERSION,
    },
    error::{PersistError, PersistResult},
    frame::{FrameState, GameContext, StateStack},
    migrate::{MigrationChain, MigrationReport},
    record::Record,
    registry::TypeRegistry,
    serializer::{DroppedField, GraphSerializer},
    stack_codec::StateStackCodec,
    storage::{FileStore, LocalFs},
    types::{IdentityKey, SessionId},
    world::World,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::BTreeMap, path::PathBuf};

/// Outcome of a successful save.
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub path:           PathBuf,
    pub bytes:          usize,
    /// Backup of the file this save replaced, if there was one.
    pub backup:         Option<PathBuf>,
    pub pruned:         Vec<PathBuf>,
    pub dropped_fields: Vec<DroppedField>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// None when the input was not read from a versioned envelope.
    pub migration: Option<MigrationReport>,
    pub issues:    Vec<DecodeIssue>,
}

impl LoadReport {
    /// Nothing was degraded or substituted.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// A reconstructed session, ready to hand to the game loop.
#[derive(Debug)]
pub struct LoadedSession {
    pub metadata:   SaveMetadata,
    pub session_id: SessionId,
    pub stack:      StateStack,
    pub world:      World,
    pub report:     LoadReport,
}

/// The envelope as read from disk: records are parsed one at a time so a
/// single bad record cannot fail the whole file.
#[derive(Deserialize)]
struct RawEnvelope {
    metadata: SaveMetadata,
    stack:    Vec<Value>,
    world:    RawWorld,
}

#[derive(Deserialize)]
struct RawWorld {
    #[serde(default)]
    player:   Option<IdentityKey>,
    #[serde(default)]
    entities: BTreeMap<String, Value>,
}

pub struct SaveStore<F: FileStore = LocalFs> {
    config:     StoreConfig,
    fs:         F,
    entities:   TypeRegistry<Entity>,
    frames:     TypeRegistry<FrameState>,
    migrations: MigrationChain,
}

impl SaveStore<LocalFs> {
    /// Store over the local disk.
    pub fn open(config: StoreConfig) -> Self {
        Self::with_fs(config, LocalFs)
    }
}

impl<F: FileStore> SaveStore<F> {
    pub fn with_fs(config: StoreConfig, fs: F) -> Self {
        Self {
            config,
            fs,
            entities:   TypeRegistry::with_builtins(),
            frames:     TypeRegistry::with_builtins(),
            migrations: MigrationChain::standard(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn entity_registry_mut(&mut self) -> &mut TypeRegistry<Entity> {
        &mut self.entities
    }

    pub fn frame_registry_mut(&mut self) -> &mut TypeRegistry<FrameState> {
        &mut self.frames
    }

    pub fn migrations(&self) -> &MigrationChain {
        &self.migrations
    }

    pub fn slot_path(&self, slot: &str) -> PathBuf {
        self.config.save_dir.join(format!("{slot}{}", self.config.extension))
    }

    // ── Save ───────────────────────────────────────────────────

    pub fn save(&self, slot: &str, stack: &StateStack, world: &World) -> PersistResult<SaveReport> {
        validate_slot_name(slot)?;
        self.check_safe(stack)?;

        let now = Utc::now();
        let (envelope, dropped_fields) = build_envelope(slot, stack, world, now);
        let bytes = self.encode(&envelope)?;
        let path = self.slot_path(slot);
        let io_err = |operation: &'static str| move |source: std::io::Error| PersistError::Io {
            slot: slot.to_string(),
            operation,
            source,
        };

        let mut backup = None;
        let mut pruned = Vec::new();
        if self.config.backup_retention > 0 && self.fs.exists(&path) {
            let target = backup::create(&self.fs, &self.config, slot, &path, now)
                .map_err(io_err("back up"))?;
            backup = Some(target);
            match backup::prune(&self.fs, &self.config, slot) {
                Ok(removed) => pruned = removed,
                Err(e) => log::warn!("Could not prune backups of slot '{slot}': {e}"),
            }
        }

        self.fs.write_bytes(&path, &bytes).map_err(io_err("write"))?;
        log::info!(
            "Saved slot '{slot}' ({} frames, {} entities, {} bytes)",
            stack.len(),
            world.entities.len(),
            bytes.len()
        );

        Ok(SaveReport {
            path,
            bytes: bytes.len(),
            backup,
            pruned,
            dropped_fields,
        })
    }

    /// Any frame in an unsafe state blocks the save, not only the top one:
    /// an inventory screen opened mid-combat is still mid-combat.
    fn check_safe(&self, stack: &StateStack) -> PersistResult<()> {
        match stack.iter().rev().find(|f| self.config.is_unsafe_state(f.tag())) {
            Some(frame) => {
                log::info!("Save refused while in '{}'", frame.tag());
                Err(PersistError::UnsafeToSave { state: frame.tag().to_string() })
            }
            None => Ok(()),
        }
    }

    /// Serialize an envelope with the configured formatting.
    pub fn encode(&self, envelope: &SaveEnvelope) -> PersistResult<Vec<u8>> {
        let bytes = if self.config.pretty {
            serde_json::to_vec_pretty(envelope)?
        } else {
            serde_json::to_vec(envelope)?
        };
        Ok(bytes)
    }

    // ── Load ───────────────────────────────────────────────────

    pub fn load(&mut self, slot: &str) -> PersistResult<LoadedSession> {
        validate_slot_name(slot)?;
        let path = self.slot_path(slot);
        if !self.fs.exists(&path) {
            return Err(PersistError::SlotNotFound { slot: slot.to_string() });
        }
        let bytes = self.fs.read_bytes(&path).map_err(|source| PersistError::Io {
            slot: slot.to_string(),
            operation: "read",
            source,
        })?;
        let raw: Value = serde_json::from_slice(&bytes)?;
        let session = self.restore(raw, slot)?;
        log::info!(
            "Loaded slot '{slot}' ({} frames, {} entities, {} issues)",
            session.stack.len(),
            session.world.entities.len(),
            session.report.issues.len()
        );
        Ok(session)
    }

    /// Rebuild a session from an already-parsed save value. `slot` names
    /// bare bundles that carry no metadata of their own.
    pub fn restore(&mut self, raw: Value, slot: &str) -> PersistResult<LoadedSession> {
        let raw = envelope::normalize(raw, slot);
        envelope::validate(&raw)?;
        let (raw, migration) = self.migrations.migrate(raw)?;
        let raw: RawEnvelope = serde_json::from_value(raw).map_err(|e| PersistError::MalformedEnvelope {
            reason: e.to_string(),
        })?;

        let mut de = GraphDeserializer::new(&mut self.entities);
        let mut codec = StateStackCodec::new(&mut self.frames);

        // Stack first: it was written first, so full records of entities it
        // shares with the world are found here.
        let mut stack = codec.decode_values(&raw.stack, &mut de);

        for (key, value) in ordered_by_identity(&raw.world.entities) {
            let outcome = Record::deserialize(value)
                .map_err(|e| e.to_string())
                .and_then(|record| de.deserialize(&record).map_err(|e| e.to_string()));
            if let Err(reason) = outcome {
                log::warn!("World entry '{key}' dropped: {reason}");
                de.note(DecodeIssue::WorldEntryDropped { key: key.to_string(), reason });
            }
        }

        let player = match raw.world.player {
            Some(identity) => {
                let r = de
                    .lookup(identity)
                    .ok_or(PersistError::DanglingReference { identity })?;
                de.require_kind(r, EntityKind::Player)?;
                Some(r)
            }
            None => None,
        };

        let (entities, mut issues) = de.finish();
        let world = World { entities, player };
        let session_id = SessionId::new();
        let ctx = GameContext::new(session_id, &world);
        issues.extend(StateStackCodec::attach(&mut stack, &ctx));

        Ok(LoadedSession {
            metadata: raw.metadata,
            session_id,
            stack,
            world,
            report: LoadReport {
                migration: Some(migration),
                issues,
            },
        })
    }

    // ── Slots ──────────────────────────────────────────────────

    /// Every readable save, sorted by slot name.
    pub fn list_slots(&self) -> PersistResult<Vec<SlotInfo>> {
        let dir = &self.config.save_dir;
        let names = self.fs.list_dir(dir).map_err(|source| PersistError::Io {
            slot: dir.display().to_string(),
            operation: "list",
            source,
        })?;

        let mut slots: Vec<SlotInfo> = names
            .iter()
            .filter_map(|name| name.strip_suffix(self.config.extension.as_str()))
            .filter(|slot| validate_slot_name(slot).is_ok())
            .filter_map(|slot| match self.slot_info(slot) {
                Ok(info) => Some(info),
                Err(reason) => {
                    log::warn!("Skipping unreadable save '{slot}': {reason}");
                    None
                }
            })
            .collect();
        slots.sort_by(|a, b| a.slot.cmp(&b.slot));
        Ok(slots)
    }

    fn slot_info(&self, slot: &str) -> Result<SlotInfo, String> {
        let bytes = self.fs.read_bytes(&self.slot_path(slot)).map_err(|e| e.to_string())?;
        let raw: Value = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
        let raw = envelope::normalize(raw, slot);
        envelope::validate(&raw).map_err(|e| e.to_string())?;

        let metadata = &raw["metadata"];
        let schema_version = envelope::declared_version(&raw).unwrap_or_default().to_string();
        let created_at = metadata
            .get("created_at")
            .or_else(|| metadata.get("saved_at"))
            .and_then(|ts| envelope::timestamp_value(ts).as_str().map(str::to_string))
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc))
            .filter(|d| d.timestamp() != 0);

        Ok(SlotInfo {
            slot:           slot.to_string(),
            name:           metadata["name"].as_str().unwrap_or(slot).to_string(),
            created_at,
            compatible:     self.migrations.supports(&schema_version),
            schema_version,
        })
    }

    pub fn delete(&self, slot: &str) -> PersistResult<()> {
        validate_slot_name(slot)?;
        let path = self.slot_path(slot);
        if !self.fs.exists(&path) {
            return Err(PersistError::SlotNotFound { slot: slot.to_string() });
        }
        self.fs.remove(&path).map_err(|source| PersistError::Io {
            slot: slot.to_string(),
            operation: "delete",
            source,
        })?;
        log::info!("Deleted slot '{slot}'");
        Ok(())
    }

    /// Retained backups of `slot`, newest first.
    pub fn list_backups(&self, slot: &str) -> PersistResult<Vec<BackupInfo>> {
        validate_slot_name(slot)?;
        backup::list(&self.fs, &self.config, slot).map_err(|source| PersistError::Io {
            slot: slot.to_string(),
            operation: "list backups of",
            source,
        })
    }
}

/// Encode a session into an envelope stamped with the current schema
/// version. Pure: the same inputs give the same envelope.
///
/// The stack is written first, then every entity in the arena in index
/// order. One visited set spans both, so each entity is written in full
/// once, at its first occurrence.
pub fn build_envelope(
    slot: &str,
    stack: &StateStack,
    world: &World,
    created_at: DateTime<Utc>,
) -> (SaveEnvelope, Vec<DroppedField>) {
    let mut ser = GraphSerializer::new(&world.entities);
    let stack_records = StateStackCodec::encode(stack, &mut ser);

    let mut entities = BTreeMap::new();
    for (r, _) in world.entities.iter() {
        match ser.serialize(r) {
            Ok(record) => {
                entities.insert(r.index().to_string(), record);
            }
            Err(e) => log::warn!("Entity at slot {} left out of save: {e}", r.index()),
        }
    }

    let player = world
        .player
        .filter(|r| world.entities.get(*r).is_some())
        .map(|r| r.identity());

    let envelope = SaveEnvelope {
        metadata: SaveMetadata {
            name: slot.to_string(),
            created_at,
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
        },
        stack: stack_records,
        world: WorldBlock { player, entities },
    };
    (envelope, ser.dropped_fields().to_vec())
}
