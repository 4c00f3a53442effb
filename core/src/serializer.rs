//! Graph serializer: walks entities into self-describing records.
//!
//! One `GraphSerializer` is one pass. Its visited set is shared by every
//! record emitted in that pass (the whole state stack plus the world), so
//! an entity reachable from two places is written in full exactly once
//! and every later occurrence is a `{"ref": id}` placeholder.
//!
//! RULE: the identity is marked visited BEFORE the entity's fields are
//! walked. A field pointing back at the entity being written therefore
//! sees it as visited and emits a reference instead of recursing.

use crate::{
    error::FieldError,
    record::{FieldValue, Fields, Record},
    types::IdentityKey,
    world::{EntityArena, EntityRef},
};
use std::collections::{BTreeMap, HashSet};

/// The serialization hook every persisted type implements.
pub trait Serializable {
    /// Stable tag the type registry resolves on load.
    fn type_tag(&self) -> &str;

    /// Emit this value's own fields. Entity-valued fields go through the
    /// writer so they participate in the pass's visited set.
    fn write_fields(&self, out: &mut FieldWriter<'_, '_>);
}

/// A field that could not be written and was left out of the record.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedField {
    pub owner: String,
    pub field: String,
    pub error: FieldError,
}

pub struct GraphSerializer<'w> {
    arena:   &'w EntityArena,
    visited: HashSet<IdentityKey>,
    dropped: Vec<DroppedField>,
}

impl<'w> GraphSerializer<'w> {
    pub fn new(arena: &'w EntityArena) -> Self {
        Self {
            arena,
            visited: HashSet::new(),
            dropped: Vec::new(),
        }
    }

    /// Serialize one entity, or a reference to it if this pass already
    /// emitted it.
    pub fn serialize(&mut self, root: EntityRef) -> Result<Record, FieldError> {
        let identity = root.identity();
        if self.visited.contains(&identity) {
            return Ok(Record::reference(identity));
        }
        let arena = self.arena;
        let entity = arena
            .get(root)
            .ok_or(FieldError::MissingEntity { index: root.index() })?;

        self.visited.insert(identity);
        let value = entity.as_serializable();
        let fields = self.collect_fields(value);
        Ok(Record::node(value.type_tag(), Some(identity), fields))
    }

    /// Serialize a value that has no identity of its own (a state frame,
    /// a nested component). Its entity fields still share the visited set.
    pub fn serialize_detached(&mut self, value: &dyn Serializable) -> Record {
        let fields = self.collect_fields(value);
        Record::node(value.type_tag(), None, fields)
    }

    pub fn is_visited(&self, r: EntityRef) -> bool {
        self.visited.contains(&r.identity())
    }

    pub fn dropped_fields(&self) -> &[DroppedField] {
        &self.dropped
    }

    fn collect_fields(&mut self, value: &dyn Serializable) -> Fields {
        let mut writer = FieldWriter {
            owner:  value.type_tag().to_string(),
            ser:    self,
            fields: Fields::new(),
        };
        value.write_fields(&mut writer);
        writer.fields
    }

    fn drop_field(&mut self, owner: &str, field: &str, error: FieldError) {
        log::warn!("Dropping field '{owner}.{field}' from save: {error}");
        self.dropped.push(DroppedField {
            owner: owner.to_string(),
            field: field.to_string(),
            error,
        });
    }
}

/// Collects the fields of one record while it is being written.
pub struct FieldWriter<'s, 'w> {
    owner:  String,
    ser:    &'s mut GraphSerializer<'w>,
    fields: Fields,
}

impl FieldWriter<'_, '_> {
    pub fn put(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Write the outcome of a per-field conversion. Failures are logged
    /// and the field is omitted; they never abort the record.
    pub fn try_put(&mut self, name: &str, value: Result<FieldValue, FieldError>) {
        match value {
            Ok(v) => {
                self.fields.insert(name.to_string(), v);
            }
            Err(e) => self.ser.drop_field(&self.owner, name, e),
        }
    }

    pub fn float(&mut self, name: &str, value: f64) {
        let v = if value.is_finite() {
            Ok(FieldValue::Float(value))
        } else {
            Err(FieldError::NonFinite(value))
        };
        self.try_put(name, v);
    }

    pub fn optional_text(&mut self, name: &str, value: Option<&str>) {
        self.put(name, value.map_or(FieldValue::Null, FieldValue::from));
    }

    pub fn text_list(&mut self, name: &str, values: &[String]) {
        let list = values.iter().map(|s| FieldValue::Text(s.clone())).collect();
        self.put(name, FieldValue::List(list));
    }

    pub fn bool_map(&mut self, name: &str, values: &BTreeMap<String, bool>) {
        let map = values
            .iter()
            .map(|(k, v)| (k.clone(), FieldValue::Bool(*v)))
            .collect();
        self.put(name, FieldValue::Map(map));
    }

    pub fn map(&mut self, name: &str, values: &Fields) {
        self.put(name, FieldValue::Map(values.clone()));
    }

    pub fn entity(&mut self, name: &str, target: EntityRef) {
        let value = self.ser.serialize(target).map(FieldValue::from);
        self.try_put(name, value);
    }

    pub fn optional_entity(&mut self, name: &str, target: Option<EntityRef>) {
        match target {
            Some(r) => self.entity(name, r),
            None => self.put(name, FieldValue::Null),
        }
    }

    /// Elements that fail are dropped individually; the list keeps the rest
    /// in their original order.
    pub fn entity_list(&mut self, name: &str, targets: &[EntityRef]) {
        let mut list = Vec::with_capacity(targets.len());
        for (i, r) in targets.iter().enumerate() {
            match self.ser.serialize(*r) {
                Ok(rec) => list.push(FieldValue::from(rec)),
                Err(e) => {
                    let field = format!("{name}[{i}]");
                    self.ser.drop_field(&self.owner, &field, e);
                }
            }
        }
        self.put(name, FieldValue::List(list));
    }

    /// Delegate a field to the value's own serialization hook.
    pub fn nested(&mut self, name: &str, value: &dyn Serializable) {
        let record = self.ser.serialize_detached(value);
        self.put(name, FieldValue::from(record));
    }
}
