//! Graph deserializer: rebuilds entities from records into a fresh arena.
//!
//! The object table maps identity keys from the save to slots in the new
//! arena. A full record reserves its slot and enters the table BEFORE its
//! fields are read, mirroring the serializer, so a cyclic field resolves
//! to the slot that is still being built.
//!
//! Failure policy:
//!   - unknown type tag     → degraded `Unresolved` entity, issue recorded
//!   - malformed fields, or a dangling reference inside them
//!                          → the node's slot is degraded, issue recorded;
//!                            entities first written inside it still enter
//!                            the object table
//!   - a top-level reference before its full record → `DanglingReference`
//!     returned to the caller, not retried

use crate::{
    entity::{Entity, EntityKind, UnresolvedEntity},
    error::{PersistError, PersistResult},
    record::{primitive_fields, FieldValue, Fields, NodeRecord, Record},
    registry::TypeRegistry,
    types::{IdentityKey, TypeTag},
    world::{EntityArena, EntityRef},
};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

/// A node-level failure that was recovered during decode.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeIssue {
    /// No reconstructor for the tag; a degraded placeholder was used.
    UnknownType { tag: TypeTag },
    /// A known type whose fields did not fit.
    Malformed { tag: TypeTag, reason: String },
    /// A reference with no earlier full record.
    DanglingReference { identity: IdentityKey },
    /// A state frame was replaced by the safe default.
    FrameReplaced { index: usize, tag: Option<TypeTag>, reason: String },
    /// A world entry could not be rebuilt and was left out.
    WorldEntryDropped { key: String, reason: String },
}

impl DecodeIssue {
    pub fn from_error(error: &PersistError) -> Self {
        match error {
            PersistError::UnknownType { tag } => Self::UnknownType { tag: tag.clone() },
            PersistError::DanglingReference { identity } => {
                Self::DanglingReference { identity: *identity }
            }
            PersistError::MalformedRecord { tag, reason } => Self::Malformed {
                tag:    tag.clone(),
                reason: reason.clone(),
            },
            other => Self::Malformed {
                tag:    String::new(),
                reason: other.to_string(),
            },
        }
    }
}

impl fmt::Display for DecodeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType { tag } => write!(f, "unknown type '{tag}' kept as a placeholder"),
            Self::Malformed { tag, reason } => write!(f, "malformed '{tag}': {reason}"),
            Self::DanglingReference { identity } => write!(f, "dangling reference to {identity}"),
            Self::FrameReplaced { index, tag, reason } => write!(
                f,
                "frame {index} ('{}') replaced by main menu: {reason}",
                tag.as_deref().unwrap_or("?")
            ),
            Self::WorldEntryDropped { key, reason } => write!(f, "world entry '{key}' dropped: {reason}"),
        }
    }
}

pub struct GraphDeserializer<'r> {
    registry:     &'r mut TypeRegistry<Entity>,
    arena:        EntityArena,
    object_table: HashMap<IdentityKey, EntityRef>,
    issues:       Vec<DecodeIssue>,
}

impl<'r> GraphDeserializer<'r> {
    pub fn new(registry: &'r mut TypeRegistry<Entity>) -> Self {
        Self {
            registry,
            arena:        EntityArena::new(),
            object_table: HashMap::new(),
            issues:       Vec::new(),
        }
    }

    pub fn deserialize(&mut self, record: &Record) -> PersistResult<EntityRef> {
        match record {
            Record::Ref(r) => self
                .object_table
                .get(&r.identity)
                .copied()
                .ok_or(PersistError::DanglingReference { identity: r.identity }),
            Record::Node(node) => self.deserialize_node(node),
        }
    }

    /// Like `deserialize`, but the node is mandatory: anything other than
    /// an entity of `kind` is an error instead of a degraded placeholder.
    pub fn deserialize_required(
        &mut self,
        record: &Record,
        kind: EntityKind,
    ) -> PersistResult<EntityRef> {
        let r = self.deserialize(record)?;
        self.require_kind(r, kind)?;
        Ok(r)
    }

    /// Slot already rebuilt for an identity from the save.
    pub fn lookup(&self, identity: IdentityKey) -> Option<EntityRef> {
        self.object_table.get(&identity).copied()
    }

    pub fn require_kind(&self, r: EntityRef, kind: EntityKind) -> PersistResult<()> {
        match self.arena.get(r) {
            Some(e) if e.kind() == kind => Ok(()),
            Some(Entity::Unresolved(u)) => Err(PersistError::UnknownType { tag: u.type_tag.clone() }),
            Some(e) => Err(PersistError::malformed(
                kind.tag(),
                format!("expected a {} entity, found {}", kind.tag(), e.kind().tag()),
            )),
            None => Err(PersistError::malformed(kind.tag(), "entity slot is empty")),
        }
    }

    pub fn arena(&self) -> &EntityArena {
        &self.arena
    }

    pub fn note(&mut self, issue: DecodeIssue) {
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[DecodeIssue] {
        &self.issues
    }

    pub fn finish(self) -> (EntityArena, Vec<DecodeIssue>) {
        (self.arena, self.issues)
    }

    /// Rebuild every entity record nested anywhere in `fields`, keeping
    /// none of them. Used when the owner itself cannot be rebuilt, so that
    /// references to those entities later in the pass still resolve.
    /// Records whose identity is already in the table (a reconstructor got
    /// that far before failing) are not rebuilt twice.
    pub fn absorb_nested(&mut self, fields: &Fields) {
        for value in fields.values() {
            self.absorb_value(value);
        }
    }

    fn absorb_value(&mut self, value: &FieldValue) {
        match value {
            FieldValue::Record(record) => {
                let Record::Node(node) = record.as_ref() else { return };
                if node.id.is_some_and(|id| self.object_table.contains_key(&id)) {
                    return;
                }
                if let Err(e) = self.deserialize_node(node) {
                    log::warn!("Nested record could not be rebuilt: {e}");
                }
            }
            FieldValue::List(items) => items.iter().for_each(|v| self.absorb_value(v)),
            FieldValue::Map(map) => map.values().for_each(|v| self.absorb_value(v)),
            _ => {}
        }
    }

    fn deserialize_node(&mut self, node: &NodeRecord) -> PersistResult<EntityRef> {
        let slot = self.arena.reserve();
        if let Some(id) = node.id {
            if self.object_table.insert(id, slot).is_some() {
                log::warn!("Identity {id} has more than one full record; the later one wins");
            }
        }

        let reconstructor = match self.registry.resolve(&node.type_tag) {
            Ok(f) => f,
            Err(e) => {
                log::warn!(
                    "No reconstructor for '{}' (identity {:?}); keeping primitive fields only",
                    node.type_tag, node.id
                );
                self.issues.push(DecodeIssue::from_error(&e));
                self.arena.fill(slot, degraded(node));
                self.absorb_nested(&node.fields);
                return Ok(slot);
            }
        };

        let reader = FieldReader::new(&node.type_tag, &node.fields);
        match reconstructor(&reader, self) {
            Ok(entity) => {
                self.arena.fill(slot, entity);
                Ok(slot)
            }
            Err(e) => {
                log::warn!("Could not rebuild '{}' record: {e}", node.type_tag);
                self.issues.push(DecodeIssue::from_error(&e));
                self.arena.fill(slot, degraded(node));
                self.absorb_nested(&node.fields);
                Ok(slot)
            }
        }
    }
}

fn degraded(node: &NodeRecord) -> Entity {
    Entity::Unresolved(UnresolvedEntity {
        type_tag: node.type_tag.clone(),
        fields:   primitive_fields(&node.fields),
    })
}

/// Typed access to one record's fields, with errors naming the field.
pub struct FieldReader<'a> {
    tag:    &'a str,
    fields: &'a Fields,
}

impl<'a> FieldReader<'a> {
    pub fn new(tag: &'a str, fields: &'a Fields) -> Self {
        Self { tag, fields }
    }

    pub fn tag(&self) -> &str {
        self.tag
    }

    pub fn fields(&self) -> &'a Fields {
        self.fields
    }

    pub fn raw(&self, name: &str) -> Option<&'a FieldValue> {
        self.fields.get(name)
    }

    fn missing(&self, name: &str) -> PersistError {
        PersistError::malformed(self.tag, format!("missing field '{name}'"))
    }

    fn mistyped(&self, name: &str, expected: &str, found: &FieldValue) -> PersistError {
        PersistError::malformed(
            self.tag,
            format!("field '{name}' should be {expected}, found {}", found.kind()),
        )
    }

    pub fn text(&self, name: &str) -> PersistResult<String> {
        let v = self.raw(name).ok_or_else(|| self.missing(name))?;
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| self.mistyped(name, "a string", v))
    }

    pub fn text_or(&self, name: &str, default: &str) -> PersistResult<String> {
        match self.raw(name) {
            None | Some(FieldValue::Null) => Ok(default.to_string()),
            Some(_) => self.text(name),
        }
    }

    pub fn optional_text(&self, name: &str) -> PersistResult<Option<String>> {
        match self.raw(name) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(_) => self.text(name).map(Some),
        }
    }

    pub fn int<T: TryFrom<i64>>(&self, name: &str) -> PersistResult<T> {
        let v = self.raw(name).ok_or_else(|| self.missing(name))?;
        let i = v.as_i64().ok_or_else(|| self.mistyped(name, "an integer", v))?;
        T::try_from(i).map_err(|_| {
            PersistError::malformed(self.tag, format!("field '{name}' is out of range ({i})"))
        })
    }

    pub fn int_or<T: TryFrom<i64>>(&self, name: &str, default: T) -> PersistResult<T> {
        match self.raw(name) {
            None | Some(FieldValue::Null) => Ok(default),
            Some(_) => self.int(name),
        }
    }

    pub fn float_or(&self, name: &str, default: f64) -> PersistResult<f64> {
        match self.raw(name) {
            None | Some(FieldValue::Null) => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| self.mistyped(name, "a number", v)),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> PersistResult<bool> {
        match self.raw(name) {
            None | Some(FieldValue::Null) => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| self.mistyped(name, "a boolean", v)),
        }
    }

    pub fn text_list(&self, name: &str) -> PersistResult<Vec<String>> {
        match self.raw(name) {
            None | Some(FieldValue::Null) => Ok(Vec::new()),
            Some(FieldValue::List(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.mistyped(name, "a list of strings", v))
                })
                .collect(),
            Some(v) => Err(self.mistyped(name, "a list", v)),
        }
    }

    pub fn bool_map(&self, name: &str) -> PersistResult<BTreeMap<String, bool>> {
        match self.raw(name) {
            None | Some(FieldValue::Null) => Ok(BTreeMap::new()),
            Some(FieldValue::Map(map)) => map
                .iter()
                .map(|(k, v)| {
                    v.as_bool()
                        .map(|b| (k.clone(), b))
                        .ok_or_else(|| self.mistyped(name, "a map of booleans", v))
                })
                .collect(),
            Some(v) => Err(self.mistyped(name, "a map", v)),
        }
    }

    /// Primitive-valued map; composite entries are skipped.
    pub fn primitive_map(&self, name: &str) -> PersistResult<Fields> {
        match self.raw(name) {
            None | Some(FieldValue::Null) => Ok(Fields::new()),
            Some(FieldValue::Map(map)) => Ok(primitive_fields(map)),
            Some(v) => Err(self.mistyped(name, "a map", v)),
        }
    }

    pub fn entity(&self, de: &mut GraphDeserializer<'_>, name: &str) -> PersistResult<EntityRef> {
        self.optional_entity(de, name)?.ok_or_else(|| self.missing(name))
    }

    pub fn optional_entity(
        &self,
        de: &mut GraphDeserializer<'_>,
        name: &str,
    ) -> PersistResult<Option<EntityRef>> {
        match self.raw(name) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Record(record)) => de.deserialize(record).map(Some),
            Some(v) => Err(self.mistyped(name, "an entity record", v)),
        }
    }

    pub fn entity_list(
        &self,
        de: &mut GraphDeserializer<'_>,
        name: &str,
    ) -> PersistResult<Vec<EntityRef>> {
        match self.raw(name) {
            None | Some(FieldValue::Null) => Ok(Vec::new()),
            Some(FieldValue::List(items)) => items
                .iter()
                .map(|v| match v {
                    FieldValue::Record(record) => de.deserialize(record),
                    other => Err(self.mistyped(name, "a list of entity records", other)),
                })
                .collect(),
            Some(v) => Err(self.mistyped(name, "a list", v)),
        }
    }
}
