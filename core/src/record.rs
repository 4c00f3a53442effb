//! The self-describing serialized form of one entity or state frame.
//!
//! JSON shapes:
//!   full record:   {"type": "npc", "id": 3, "fields": {...}}
//!   reference:     {"ref": 3}
//!   plain map:     {"map": {...}}
//!
//! Plain maps are always wrapped, so user keys such as `type` or `ref`
//! can never be read back as a record.
//!
//! A reference is only valid after the full record with the same id has
//! been emitted earlier in the same pass.

use crate::types::{IdentityKey, TypeTag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Fields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Ref(RefRecord),
    Node(NodeRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefRecord {
    #[serde(rename = "ref")]
    pub identity: IdentityKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeRecord {
    #[serde(rename = "type")]
    pub type_tag: TypeTag,
    /// Entities carry an identity; state frames do not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id:       Option<IdentityKey>,
    #[serde(default)]
    pub fields:   Fields,
}

impl Record {
    pub fn reference(identity: IdentityKey) -> Self {
        Record::Ref(RefRecord { identity })
    }

    pub fn node(type_tag: impl Into<TypeTag>, id: Option<IdentityKey>, fields: Fields) -> Self {
        Record::Node(NodeRecord { type_tag: type_tag.into(), id, fields })
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Record::Ref(_))
    }

    pub fn type_tag(&self) -> Option<&str> {
        match self {
            Record::Node(n) => Some(&n.type_tag),
            Record::Ref(_)  => None,
        }
    }

    pub fn identity(&self) -> Option<IdentityKey> {
        match self {
            Record::Node(n) => n.id,
            Record::Ref(r)  => Some(r.identity),
        }
    }
}

/// One serialized field value.
///
/// Variant order matters for untagged decoding: integers are tried
/// before floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
    Record(Box<Record>),
    #[serde(with = "wrapped_map")]
    Map(Fields),
}

mod wrapped_map {
    use super::Fields;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct Out<'a> {
        map: &'a Fields,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct In {
        map: Fields,
    }

    pub fn serialize<S: Serializer>(fields: &Fields, serializer: S) -> Result<S::Ok, S::Error> {
        Out { map: fields }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fields, D::Error> {
        In::deserialize(deserializer).map(|wrapped| wrapped.map)
    }
}

impl FieldValue {
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            FieldValue::Null
                | FieldValue::Bool(_)
                | FieldValue::Int(_)
                | FieldValue::Float(_)
                | FieldValue::Text(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats; a float field written as `3` reads back.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(i)   => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null      => "null",
            FieldValue::Bool(_)   => "bool",
            FieldValue::Int(_)    => "integer",
            FieldValue::Float(_)  => "float",
            FieldValue::Text(_)   => "string",
            FieldValue::List(_)   => "list",
            FieldValue::Record(_) => "record",
            FieldValue::Map(_)    => "map",
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self { FieldValue::Bool(v) }
}
impl From<i64> for FieldValue {
    fn from(v: i64) -> Self { FieldValue::Int(v) }
}
impl From<i32> for FieldValue {
    fn from(v: i32) -> Self { FieldValue::Int(v.into()) }
}
impl From<u32> for FieldValue {
    fn from(v: u32) -> Self { FieldValue::Int(v.into()) }
}
impl From<&str> for FieldValue {
    fn from(v: &str) -> Self { FieldValue::Text(v.to_string()) }
}
impl From<String> for FieldValue {
    fn from(v: String) -> Self { FieldValue::Text(v) }
}
impl From<Record> for FieldValue {
    fn from(v: Record) -> Self { FieldValue::Record(Box::new(v)) }
}

/// Keep only the primitive fields. Used to build degraded placeholders.
pub fn primitive_fields(fields: &Fields) -> Fields {
    fields
        .iter()
        .filter(|(_, v)| v.is_primitive())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
