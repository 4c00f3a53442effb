//! The versioned top-level save container.
//!
//! Load pipeline over the raw JSON value, in this order:
//!   normalize → validate → migrate → typed `SaveEnvelope`
//!
//! `normalize` wraps bare state bundles (no `metadata` block) into the
//! standard shape; `validate` only checks the top-level fields every
//! version shares, so it can run before migration.

use crate::{
    error::{PersistError, PersistResult},
    record::Record,
    types::{IdentityKey, SlotName},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::{cmp::Ordering, collections::BTreeMap, fmt, str::FromStr};

pub const CURRENT_SCHEMA_VERSION: &str = "1.3.0";

/// Written by migrations and normalization when a save carries no time.
pub const UNKNOWN_CREATED_AT: &str = "1970-01-01T00:00:00Z";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveEnvelope {
    pub metadata: SaveMetadata,
    pub stack:    Vec<Record>,
    pub world:    WorldBlock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveMetadata {
    pub name:           SlotName,
    pub created_at:     DateTime<Utc>,
    pub schema_version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorldBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player:   Option<IdentityKey>,
    /// Keyed by identity. Decoded in ascending numeric key order, which is
    /// the order they were emitted in.
    #[serde(default)]
    pub entities: BTreeMap<String, Record>,
}

impl WorldBlock {
    /// Entries in emission order.
    pub fn ordered_entries(&self) -> Vec<(&str, &Record)> {
        ordered_by_identity(&self.entities)
    }
}

/// Sort world entries by numeric identity key, the order they were emitted
/// in. Keys that are not identities come last, in key order.
pub fn ordered_by_identity<V>(entries: &BTreeMap<String, V>) -> Vec<(&str, &V)> {
    let mut keyed: Vec<(Option<u64>, &str, &V)> = entries
        .iter()
        .map(|(k, v)| (k.parse::<u64>().ok(), k.as_str(), v))
        .collect();
    keyed.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None)    => Ordering::Less,
        (None, Some(_))    => Ordering::Greater,
        (None, None)       => a.1.cmp(b.1),
    });
    keyed.into_iter().map(|(_, k, v)| (k, v)).collect()
}

/// Dotted `major.minor.patch` schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub fn current() -> Self {
        Self { major: 1, minor: 3, patch: 0 }
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(format!("'{s}' is not major.minor.patch"));
        }
        let num = |p: &str| p.parse::<u32>().map_err(|_| format!("'{s}' has a non-numeric part"));
        Ok(Self {
            major: num(parts[0])?,
            minor: num(parts[1])?,
            patch: num(parts[2])?,
        })
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Read `metadata.schema_version` from a raw envelope.
pub fn declared_version(raw: &Value) -> Option<&str> {
    raw.get("metadata")?.get("schema_version")?.as_str()
}

/// Wrap a bare state bundle into the standard envelope shape.
///
/// A bundle is an object without `metadata` that has `stack` (or the
/// legacy `states`). Its `version`/`schema_version` becomes the envelope
/// version; a bundle that declares none is taken as current. Anything
/// else is returned unchanged for `validate` to judge.
pub fn normalize(raw: Value, slot: &str) -> Value {
    let Value::Object(mut bundle) = raw else {
        return raw;
    };
    if bundle.contains_key("metadata") {
        return Value::Object(bundle);
    }
    let stack = match bundle.remove("stack").or_else(|| bundle.remove("states")) {
        Some(stack) => stack,
        None => return Value::Object(bundle),
    };

    let version = bundle
        .remove("schema_version")
        .or_else(|| bundle.remove("version"))
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| CURRENT_SCHEMA_VERSION.to_string());

    let mut metadata = Map::new();
    metadata.insert("name".into(), Value::String(slot.to_string()));
    metadata.insert("schema_version".into(), Value::String(version.clone()));
    let created_at = bundle.remove("created_at").or_else(|| bundle.remove("saved_at"));
    match created_at {
        Some(ts) if version == CURRENT_SCHEMA_VERSION => {
            metadata.insert("created_at".into(), timestamp_value(&ts));
        }
        Some(ts) => {
            // Older versions keep the legacy key; the migration chain moves it.
            metadata.insert("saved_at".into(), ts);
        }
        None if version == CURRENT_SCHEMA_VERSION => {
            metadata.insert("created_at".into(), Value::String(UNKNOWN_CREATED_AT.into()));
        }
        None => {}
    }

    let world = match bundle.remove("world") {
        Some(world) => world,
        None => {
            let mut world = Map::new();
            world.insert("entities".into(), bundle.remove("entities").unwrap_or_else(|| json!({})));
            if let Some(player) = bundle.remove("player") {
                world.insert("player".into(), player);
            }
            Value::Object(world)
        }
    };

    log::info!("Normalized bare state bundle for slot '{slot}' (version {version})");
    json!({
        "metadata": Value::Object(metadata),
        "stack":    stack,
        "world":    world,
    })
}

/// Turn a legacy timestamp (RFC 3339 string or Unix seconds) into an
/// RFC 3339 string value.
pub(crate) fn timestamp_value(ts: &Value) -> Value {
    let parsed = match ts {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        _ => None,
    };
    Value::String(parsed.map_or_else(|| UNKNOWN_CREATED_AT.to_string(), |d| d.to_rfc3339()))
}

/// Check the top-level fields every schema version shares.
pub fn validate(raw: &Value) -> PersistResult<()> {
    let malformed = |reason: &str| PersistError::MalformedEnvelope { reason: reason.to_string() };

    let root = raw.as_object().ok_or_else(|| malformed("top level is not an object"))?;
    let metadata = root
        .get("metadata")
        .ok_or_else(|| malformed("missing 'metadata'"))?
        .as_object()
        .ok_or_else(|| malformed("'metadata' is not an object"))?;
    metadata
        .get("schema_version")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing 'metadata.schema_version'"))?;
    metadata
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing 'metadata.name'"))?;
    if !root.get("stack").is_some_and(Value::is_array) {
        return Err(malformed("missing or non-list 'stack'"));
    }
    if !root.get("world").is_some_and(Value::is_object) {
        return Err(malformed("missing or non-object 'world'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_versions_parse_and_order() {
        let a: SchemaVersion = "1.0.0".parse().unwrap();
        let b: SchemaVersion = "1.10.0".parse().unwrap();
        assert!(a < b);
        assert_eq!(SchemaVersion::current().to_string(), CURRENT_SCHEMA_VERSION);
        assert!("1.0".parse::<SchemaVersion>().is_err());
        assert!("one.two.three".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn world_entries_follow_numeric_identity_order() {
        let mut world = WorldBlock::default();
        for id in [10u64, 2, 1] {
            world.entities.insert(id.to_string(), Record::reference(IdentityKey(id)));
        }
        let keys: Vec<&str> = world.ordered_entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["1", "2", "10"]);
    }

    #[test]
    fn validate_names_the_missing_field() {
        let err = validate(&json!({"metadata": {"name": "a"}, "stack": [], "world": {}})).unwrap_err();
        assert!(err.to_string().contains("schema_version"), "{err}");

        let err = validate(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, PersistError::MalformedEnvelope { .. }));
    }

    #[test]
    fn unix_seconds_become_rfc3339() {
        let v = timestamp_value(&json!(86_400));
        assert_eq!(v, json!("1970-01-02T00:00:00+00:00"));
        assert_eq!(timestamp_value(&json!(true)), json!(UNKNOWN_CREATED_AT));
    }
}
