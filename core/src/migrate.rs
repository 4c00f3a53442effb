//! Schema migration chain.
//!
//! RULE: steps form one contiguous chain ending at the current version.
//! Each step is a pure function over the raw JSON envelope and knows
//! nothing about the typed model; the chain, not the step, stamps the new
//! `schema_version` after a step succeeds.
//!
//! A save already at the current version passes through untouched, so
//! running the chain twice is a no-op the second time.

use crate::{
    envelope::{declared_version, timestamp_value, SchemaVersion, UNKNOWN_CREATED_AT},
    error::{PersistError, PersistResult},
};
use serde_json::{json, Map, Value};

pub type MigrateFn = fn(Value) -> Result<Value, String>;

pub struct MigrationStep {
    pub from:        SchemaVersion,
    pub to:          SchemaVersion,
    pub description: &'static str,
    pub migrate_fn:  MigrateFn,
}

/// What a load's migration pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub original_version:  String,
    pub final_version:     String,
    pub steps_applied:     usize,
    pub step_descriptions: Vec<String>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.steps_applied == 0
    }
}

pub struct MigrationChain {
    steps:   Vec<MigrationStep>,
    current: SchemaVersion,
}

impl MigrationChain {
    /// Panics if the steps do not form a contiguous chain to `current`.
    pub fn new(steps: Vec<MigrationStep>, current: SchemaVersion) -> Self {
        for pair in steps.windows(2) {
            assert_eq!(
                pair[0].to, pair[1].from,
                "migration chain gap between {} and {}",
                pair[0].to, pair[1].from
            );
        }
        if let Some(last) = steps.last() {
            assert_eq!(last.to, current, "migration chain must end at {current}");
        }
        Self { steps, current }
    }

    /// Every known step up to `CURRENT_SCHEMA_VERSION`.
    pub fn standard() -> Self {
        Self::new(
            vec![
                MigrationStep {
                    from:        SchemaVersion { major: 1, minor: 0, patch: 0 },
                    to:          SchemaVersion { major: 1, minor: 1, patch: 0 },
                    description: "world entities: list → map keyed by identity",
                    migrate_fn:  entities_list_to_map,
                },
                MigrationStep {
                    from:        SchemaVersion { major: 1, minor: 1, patch: 0 },
                    to:          SchemaVersion { major: 1, minor: 2, patch: 0 },
                    description: "metadata: saved_at → created_at (RFC 3339)",
                    migrate_fn:  saved_at_to_created_at,
                },
                MigrationStep {
                    from:        SchemaVersion { major: 1, minor: 2, patch: 0 },
                    to:          SchemaVersion { major: 1, minor: 3, patch: 0 },
                    description: "plain map fields wrapped as {\"map\": ...}",
                    migrate_fn:  wrap_plain_maps,
                },
            ],
            SchemaVersion::current(),
        )
    }

    pub fn current(&self) -> SchemaVersion {
        self.current
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether a save declaring `version` can be brought up to current.
    pub fn supports(&self, version: &str) -> bool {
        let Ok(mut v) = version.parse::<SchemaVersion>() else {
            return false;
        };
        while v != self.current {
            match self.steps.iter().find(|s| s.from == v) {
                Some(step) => v = step.to,
                None => return false,
            }
        }
        true
    }

    /// Upgrade a raw envelope to the current version.
    pub fn migrate(&self, mut raw: Value) -> PersistResult<(Value, MigrationReport)> {
        let declared = declared_version(&raw)
            .ok_or_else(|| PersistError::MalformedEnvelope {
                reason: "missing 'metadata.schema_version'".into(),
            })?
            .to_string();
        let unsupported = || PersistError::UnsupportedVersion {
            found:   declared.clone(),
            current: self.current.to_string(),
        };

        let mut version: SchemaVersion = declared.parse().map_err(|_| unsupported())?;
        let mut report = MigrationReport {
            original_version:  declared.clone(),
            final_version:     declared.clone(),
            steps_applied:     0,
            step_descriptions: Vec::new(),
        };

        while version != self.current {
            let step = self
                .steps
                .iter()
                .find(|s| s.from == version)
                .ok_or_else(unsupported)?;

            raw = (step.migrate_fn)(raw).map_err(|reason| PersistError::MalformedEnvelope {
                reason: format!("migration {} → {} failed: {reason}", step.from, step.to),
            })?;
            stamp_version(&mut raw, step.to)?;

            log::debug!("Migrated save {} → {}: {}", step.from, step.to, step.description);
            report.steps_applied += 1;
            report.step_descriptions.push(step.description.to_string());
            version = step.to;
        }

        report.final_version = version.to_string();
        Ok((raw, report))
    }
}

impl Default for MigrationChain {
    fn default() -> Self {
        Self::standard()
    }
}

fn stamp_version(raw: &mut Value, version: SchemaVersion) -> PersistResult<()> {
    let metadata = raw
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| PersistError::MalformedEnvelope {
            reason: "migration removed 'metadata'".into(),
        })?;
    metadata.insert("schema_version".into(), Value::String(version.to_string()));
    Ok(())
}

// ── Steps ──────────────────────────────────────────────────────

/// 1.0.0 kept world entities as a list of records. 1.1.0 keys them by
/// identity. Entries without an identity cannot be referenced and are
/// kept under `legacy-N` keys, which decode after every identity.
fn entities_list_to_map(mut raw: Value) -> Result<Value, String> {
    let world = raw
        .get_mut("world")
        .and_then(Value::as_object_mut)
        .ok_or("'world' is not an object")?;

    let list = match world.remove("entities") {
        None => Vec::new(),
        Some(Value::Array(list)) => list,
        Some(Value::Object(map)) => {
            // Already keyed; some 1.0.0 writers did this.
            world.insert("entities".into(), Value::Object(map));
            return Ok(raw);
        }
        Some(other) => return Err(format!("'world.entities' is {other}, expected a list")),
    };

    let mut map = Map::new();
    for (i, entry) in list.into_iter().enumerate() {
        let key = entry
            .get("id")
            .or_else(|| entry.get("ref"))
            .and_then(Value::as_u64)
            .map_or_else(|| format!("legacy-{i}"), |id| id.to_string());
        if map.insert(key.clone(), entry).is_some() {
            log::warn!("1.0.0 save lists identity {key} twice; keeping the later entry");
        }
    }
    world.insert("entities".into(), Value::Object(map));
    Ok(raw)
}

/// 1.1.0 stored `metadata.saved_at` (RFC 3339 or Unix seconds). 1.2.0
/// requires `metadata.created_at` in RFC 3339.
fn saved_at_to_created_at(mut raw: Value) -> Result<Value, String> {
    let metadata = raw
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or("'metadata' is not an object")?;

    let created_at = match metadata.remove("saved_at") {
        Some(ts) => timestamp_value(&ts),
        None => match metadata.get("created_at") {
            Some(existing) => timestamp_value(existing),
            None => Value::String(UNKNOWN_CREATED_AT.into()),
        },
    };
    metadata.insert("created_at".into(), created_at);
    Ok(raw)
}

/// Up to 1.2.0 a plain map field was written bare, and any object shaped
/// like a record was read as one. 1.3.0 wraps every plain map, so this
/// step applies the old reading once and wraps whatever was not a record.
fn wrap_plain_maps(mut raw: Value) -> Result<Value, String> {
    if let Some(stack) = raw.get_mut("stack").and_then(Value::as_array_mut) {
        stack.iter_mut().for_each(wrap_record_fields);
    }
    match raw.get_mut("world").and_then(|w| w.get_mut("entities")) {
        Some(Value::Object(entities)) => entities.values_mut().for_each(wrap_record_fields),
        Some(Value::Array(entities)) => entities.iter_mut().for_each(wrap_record_fields),
        _ => {}
    }
    Ok(raw)
}

fn wrap_record_fields(record: &mut Value) {
    if let Some(fields) = record.get_mut("fields").and_then(Value::as_object_mut) {
        fields.values_mut().for_each(wrap_field);
    }
}

fn wrap_field(value: &mut Value) {
    if let Value::Array(items) = value {
        items.iter_mut().for_each(wrap_field);
        return;
    }
    let Value::Object(object) = value else { return };
    if reads_as_record(object) {
        if let Some(Value::Object(fields)) = object.get_mut("fields") {
            fields.values_mut().for_each(wrap_field);
        }
        return;
    }
    object.values_mut().for_each(wrap_field);
    let inner = std::mem::take(object);
    *value = json!({"map": Value::Object(inner)});
}

/// The pre-1.3.0 record shapes: `{"ref": n}` or `{"type", "id"?, "fields"?}`.
fn reads_as_record(object: &Map<String, Value>) -> bool {
    if object.len() == 1 && object.get("ref").is_some_and(Value::is_u64) {
        return true;
    }
    object.get("type").is_some_and(Value::is_string)
        && object.keys().all(|k| matches!(k.as_str(), "type" | "id" | "fields"))
        && object.get("id").map_or(true, |id| id.is_u64() || id.is_null())
        && object.get("fields").map_or(true, Value::is_object)
}
