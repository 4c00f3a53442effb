//! Type registry: maps type tags to reconstruction functions.
//!
//! Exact registrations win. When a tag has no registration, `resolve`
//! falls back to the compile-time catalogue of built-in kinds for that
//! family (entities or state frames), matching loosely so that tags
//! written as type names ("DialogueState", "MapArea") still find their
//! kind. A fallback hit is registered under the requested tag.

use crate::{
    deserializer::{FieldReader, GraphDeserializer},
    error::{PersistError, PersistResult},
    types::TypeTag,
};
use std::collections::HashMap;

/// Rebuilds one value from its record fields.
pub type Reconstructor<T> = fn(&FieldReader<'_>, &mut GraphDeserializer<'_>) -> PersistResult<T>;

/// The closed set of kinds a family knows about at compile time.
pub trait BuiltinCatalog: Sized + 'static {
    fn builtins() -> Vec<(&'static str, Reconstructor<Self>)>;
}

pub struct TypeRegistry<T> {
    entries: HashMap<TypeTag, Reconstructor<T>>,
}

impl<T: BuiltinCatalog> TypeRegistry<T> {
    /// An empty registry. Built-in kinds are still found through the
    /// fallback in `resolve`.
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (tag, f) in T::builtins() {
            registry.register(tag, f);
        }
        registry
    }

    /// Last writer wins.
    pub fn register(&mut self, tag: &str, reconstructor: Reconstructor<T>) {
        if self.entries.insert(tag.to_string(), reconstructor).is_some() {
            log::debug!("Type tag '{tag}' re-registered");
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&mut self, tag: &str) -> PersistResult<Reconstructor<T>> {
        if let Some(f) = self.entries.get(tag) {
            return Ok(*f);
        }
        let wanted = normalize_tag(tag);
        let found = T::builtins()
            .into_iter()
            .find(|(builtin, _)| normalize_tag(builtin) == wanted);
        match found {
            Some((builtin, f)) => {
                log::info!("Type tag '{tag}' resolved to built-in '{builtin}' and registered");
                self.entries.insert(tag.to_string(), f);
                Ok(f)
            }
            None => Err(PersistError::UnknownType { tag: tag.to_string() }),
        }
    }
}

impl<T: BuiltinCatalog> Default for TypeRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase, drop separators, drop a trailing "state".
fn normalize_tag(tag: &str) -> String {
    let flat: String = tag
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' ' | '.'))
        .flat_map(char::to_lowercase)
        .collect();
    match flat.strip_suffix("state") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_tag;

    #[test]
    fn normalization_matches_type_names_to_tags() {
        assert_eq!(normalize_tag("DialogueState"), normalize_tag("dialogue"));
        assert_eq!(normalize_tag("MainMenu"), normalize_tag("main_menu"));
        assert_eq!(normalize_tag("map-area"), normalize_tag("map_area"));
        assert_eq!(normalize_tag("state"), "state");
        assert_ne!(normalize_tag("GhostState"), normalize_tag("dialogue"));
    }
}
