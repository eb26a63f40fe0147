//! The investigation graph: deduplicated entities and typed relationships.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::{normalize_key_part, Entity, EntityId, EntityType, Metadata};
use crate::error::{PanoError, Result};
use crate::graph::relationship::{EdgeKey, Relationship, RelationshipId};
use crate::registry::PluginRegistry;
use crate::schema::{Properties, PropertyValue};

/// Metadata key under which merge conflicts are recorded.
pub const CONFLICTS_KEY: &str = "conflicts";

/// A value that disagreed with the stored one during a merge. The stored value wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictNote {
    pub field: String,
    pub existing: serde_json::Value,
    pub incoming: serde_json::Value,
    #[serde(default)]
    pub source: String,
}

/// What an upsert did to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Enriched,
    Unchanged,
}

/// Validated candidate, ready to be applied without further checks.
pub(crate) struct Prepared {
    entity_type: Arc<EntityType>,
    properties: Properties,
    source: String,
    key: Option<String>,
}

type KeyIndex = HashMap<(String, String), EntityId>;

/// Entities and relationships of one investigation.
///
/// Every entity conforms to its registered type, no two entities of one type
/// share an equality key, and every relationship references live entities.
/// Entity and relationship listings follow insertion order.
#[derive(Debug)]
pub struct InvestigationGraph {
    registry: Arc<PluginRegistry>,
    entities: IndexMap<EntityId, Entity>,
    keys: KeyIndex,
    relationships: IndexMap<RelationshipId, Relationship>,
    edges: HashMap<EdgeKey, RelationshipId>,
    incident: HashMap<EntityId, IndexSet<RelationshipId>>,
}

impl InvestigationGraph {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            entities: IndexMap::new(),
            keys: HashMap::new(),
            relationships: IndexMap::new(),
            edges: HashMap::new(),
            incident: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Add an entity, or enrich the existing entity with the same equality key.
    pub fn add_entity(&mut self, entity_type: &str, properties: Properties) -> Result<Entity> {
        self.add_entity_with_source(entity_type, properties, "")
    }

    pub fn add_entity_with_source(
        &mut self,
        entity_type: &str,
        properties: Properties,
        source: &str,
    ) -> Result<Entity> {
        self.upsert_entity(entity_type, properties, source)
            .map(|(entity, _)| entity)
    }

    /// Like [`add_entity_with_source`](Self::add_entity_with_source), also reporting
    /// whether the entity was created or merged.
    pub fn upsert_entity(
        &mut self,
        entity_type: &str,
        properties: Properties,
        source: &str,
    ) -> Result<(Entity, Upsert)> {
        let prepared = self.prepare(entity_type, properties, source)?;
        let (id, outcome) = self.upsert(prepared, None);
        let entity = self
            .entities
            .get(&id)
            .cloned()
            .ok_or_else(|| PanoError::UnknownEntity(id.to_string()))?;
        Ok((entity, outcome))
    }

    pub(crate) fn prepare(
        &self,
        entity_type: &str,
        properties: Properties,
        source: &str,
    ) -> Result<Prepared> {
        let entity_type = self.lookup_type(entity_type)?;
        let properties = entity_type.normalize(properties)?;
        let mut keyed = properties.clone();
        entity_type.schema().apply_defaults(&mut keyed);
        let key = entity_type.key_for(&keyed);
        Ok(Prepared {
            entity_type,
            properties,
            source: source.to_string(),
            key,
        })
    }

    /// Apply a prepared candidate. `id` pins the identifier of a newly created entity.
    pub(crate) fn upsert(&mut self, prepared: Prepared, id: Option<EntityId>) -> (EntityId, Upsert) {
        if let Some(key) = &prepared.key {
            let index_key = (prepared.entity_type.name().to_string(), key.clone());
            if let Some(existing) = self.keys.get(&index_key).cloned() {
                let outcome = self.enrich(&existing, prepared);
                return (existing, outcome);
            }
        }

        let Prepared {
            entity_type,
            mut properties,
            source,
            ..
        } = prepared;
        entity_type.schema().apply_defaults(&mut properties);
        let id = id.unwrap_or_default();
        let entity = Entity::from_validated(id.clone(), &entity_type, properties, source, Metadata::new());
        if let Some(key) = entity.equality_key() {
            self.keys
                .insert((entity_type.name().to_string(), key.to_string()), id.clone());
        }
        log::debug!("Added {} entity '{}' ({})", entity_type.name(), entity.label(), id);
        self.entities.insert(id.clone(), entity);
        (id, Upsert::Created)
    }

    /// Fill empty fields of an existing entity; disagreeing values become conflict notes.
    ///
    /// Filled fields that would give the entity a key owned by another entity are
    /// not stored either; they are recorded as conflict notes as well.
    fn enrich(&mut self, id: &EntityId, prepared: Prepared) -> Upsert {
        let Some(entity) = self.entities.get(id) else {
            return Upsert::Unchanged;
        };
        let current = entity.properties().clone();
        let adopt_source = entity.source().is_empty() && !prepared.source.is_empty();
        let old_key = entity.equality_key().map(str::to_string);

        let entity_type = prepared.entity_type;
        let source = prepared.source;
        let mut raw = current.clone();
        let mut filled = Vec::new();
        let mut notes = Vec::new();

        for (field, incoming) in prepared.properties {
            match raw.get(&field) {
                Some(existing) if !existing.is_null() => {
                    if *existing != incoming && !same_key_part(&entity_type, &field, existing, &incoming) {
                        notes.push(ConflictNote {
                            field,
                            existing: existing.into(),
                            incoming: (&incoming).into(),
                            source: source.clone(),
                        });
                    }
                }
                _ => {
                    if !incoming.is_null() {
                        filled.push((field.clone(), incoming.clone()));
                    }
                    raw.insert(field, incoming);
                }
            }
        }

        let mut merged = rederive_or_keep(&entity_type, id, &raw);
        if self.key_taken(&entity_type, id, &merged) {
            for (field, _) in filled.iter().filter(|(f, _)| entity_type.is_key_field(f)) {
                restore_field(&mut raw, &current, field);
            }
            merged = rederive_or_keep(&entity_type, id, &raw);
            let mut rejected: Vec<&(String, PropertyValue)> = filled
                .iter()
                .filter(|(f, _)| entity_type.is_key_field(f))
                .collect();
            if self.key_taken(&entity_type, id, &merged) {
                merged = current.clone();
                rejected = filled.iter().collect();
            }
            for (field, value) in rejected {
                notes.push(ConflictNote {
                    field: field.clone(),
                    existing: serde_json::Value::Null,
                    incoming: value.into(),
                    source: source.clone(),
                });
            }
        }

        let changed = merged != current || adopt_source || !notes.is_empty();
        if !changed {
            return Upsert::Unchanged;
        }

        let Some(entity) = self.entities.get_mut(id) else {
            return Upsert::Unchanged;
        };
        entity.replace_properties(&entity_type, merged);
        if adopt_source {
            entity.set_source(source);
        }
        for note in notes {
            log::warn!(
                "Conflicting value for {}.{} on {}: keeping {}, ignoring {} from '{}'",
                entity_type.name(),
                note.field,
                id,
                note.existing,
                note.incoming,
                note.source
            );
            push_conflict(entity.metadata_mut(), note);
        }
        self.reindex(id, old_key);
        Upsert::Enriched
    }

    /// Whether `properties` would give `id` an equality key owned by another entity.
    fn key_taken(&self, entity_type: &EntityType, id: &EntityId, properties: &Properties) -> bool {
        entity_type.key_for(properties).is_some_and(|key| {
            self.keys
                .get(&(entity_type.name().to_string(), key))
                .is_some_and(|owner| owner != id)
        })
    }

    /// Point the key index at an entity's recomputed key. Callers check the new key
    /// is free first; a key owned by another entity is left with its owner.
    fn reindex(&mut self, id: &EntityId, old_key: Option<String>) {
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        let type_name = entity.entity_type().to_string();
        let new_key = entity.equality_key().map(str::to_string);
        if new_key == old_key {
            return;
        }
        if let Some(key) = &new_key {
            let taken = self
                .keys
                .get(&(type_name.clone(), key.clone()))
                .is_some_and(|owner| owner != id);
            if taken {
                entity.set_key(old_key);
                return;
            }
        }
        if let Some(key) = old_key {
            self.keys.remove(&(type_name.clone(), key));
        }
        if let Some(key) = new_key {
            self.keys.insert((type_name, key), id.clone());
        }
    }

    /// Set a single property after validating it; `Null` clears the field.
    pub fn set_property(
        &mut self,
        id: &EntityId,
        field: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<Entity> {
        let entity = self
            .entities
            .get(id)
            .ok_or_else(|| PanoError::UnknownEntity(id.to_string()))?;
        let entity_type = self.lookup_type(entity.entity_type())?;
        let value = entity_type.schema().validate_value(field, value.into())?;

        let mut next = entity.properties().clone();
        if value.is_null() {
            next.remove(field);
        } else {
            next.insert(field.to_string(), value);
        }
        let next = entity_type.rederive(&next)?;

        if let Some(key) = entity_type.key_for(&next) {
            let owner = self.keys.get(&(entity_type.name().to_string(), key.clone()));
            if owner.is_some_and(|owner| owner != id) {
                return Err(PanoError::DuplicateKey {
                    entity_type: entity_type.name().to_string(),
                    key,
                });
            }
        }

        let old_key = entity.equality_key().map(str::to_string);
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| PanoError::UnknownEntity(id.to_string()))?;
        entity.replace_properties(&entity_type, next);
        self.reindex(id, old_key);
        self.entities
            .get(id)
            .cloned()
            .ok_or_else(|| PanoError::UnknownEntity(id.to_string()))
    }

    /// Set an opaque metadata entry (not validated).
    pub fn set_metadata(&mut self, id: &EntityId, key: &str, value: serde_json::Value) -> Result<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| PanoError::UnknownEntity(id.to_string()))?;
        entity.metadata_mut().insert(key.to_string(), value);
        Ok(())
    }

    pub fn set_relationship_metadata(
        &mut self,
        id: &RelationshipId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let rel = self
            .relationships
            .get_mut(id)
            .ok_or_else(|| PanoError::UnknownEntity(format!("relationship {id}")))?;
        rel.metadata.insert(key.to_string(), value);
        Ok(())
    }

    /// Add a directed relationship. Identical (source, target, kind) triples are
    /// stored once; the existing relationship is returned.
    pub fn add_relationship(
        &mut self,
        source: &EntityId,
        target: &EntityId,
        kind: &str,
    ) -> Result<Relationship> {
        self.add_relationship_with(source, target, kind, true, Metadata::new())
    }

    pub fn add_relationship_with(
        &mut self,
        source: &EntityId,
        target: &EntityId,
        kind: &str,
        directed: bool,
        metadata: Metadata,
    ) -> Result<Relationship> {
        self.check_link(source, target, kind)?;
        let (id, _) = self.link(source, target, kind, directed, metadata, None);
        self.relationships
            .get(&id)
            .cloned()
            .ok_or_else(|| PanoError::UnknownEntity(id.to_string()))
    }

    pub(crate) fn check_link(&self, source: &EntityId, target: &EntityId, kind: &str) -> Result<()> {
        if kind.trim().is_empty() {
            return Err(PanoError::schema("Relationship", "kind", "must not be empty"));
        }
        for id in [source, target] {
            if !self.entities.contains_key(id) {
                return Err(PanoError::UnknownEntity(id.to_string()));
            }
        }
        Ok(())
    }

    /// Insert an edge between checked endpoints. Returns the id and whether it is new.
    pub(crate) fn link(
        &mut self,
        source: &EntityId,
        target: &EntityId,
        kind: &str,
        directed: bool,
        metadata: Metadata,
        id: Option<RelationshipId>,
    ) -> (RelationshipId, bool) {
        let edge = EdgeKey::new(source, target, kind, directed);
        if let Some(existing) = self.edges.get(&edge).cloned() {
            if let Some(rel) = self.relationships.get_mut(&existing) {
                for (k, v) in metadata {
                    rel.metadata.entry(k).or_insert(v);
                }
            }
            return (existing, false);
        }

        let rel = Relationship {
            id: id.unwrap_or_default(),
            source_id: source.clone(),
            target_id: target.clone(),
            kind: kind.to_string(),
            directed,
            metadata,
        };
        let rel_id = rel.id.clone();
        self.edges.insert(EdgeKey::of(&rel), rel_id.clone());
        self.incident
            .entry(source.clone())
            .or_default()
            .insert(rel_id.clone());
        self.incident
            .entry(target.clone())
            .or_default()
            .insert(rel_id.clone());
        log::debug!("Linked {} --{}--> {}", source, kind, target);
        self.relationships.insert(rel_id.clone(), rel);
        (rel_id, true)
    }

    /// Remove an entity and every relationship touching it. Unknown ids are a no-op.
    pub fn remove_entity(&mut self, id: &EntityId) -> Option<Entity> {
        let entity = self.entities.shift_remove(id)?;
        if let Some(key) = entity.equality_key() {
            let index_key = (entity.entity_type().to_string(), key.to_string());
            if self.keys.get(&index_key) == Some(id) {
                self.keys.remove(&index_key);
            }
        }
        if let Some(rel_ids) = self.incident.remove(id) {
            for rel_id in rel_ids {
                self.detach(&rel_id);
            }
        }
        log::debug!("Removed entity {}", id);
        Some(entity)
    }

    pub fn remove_relationship(&mut self, id: &RelationshipId) -> Option<Relationship> {
        self.detach(id)
    }

    fn detach(&mut self, id: &RelationshipId) -> Option<Relationship> {
        let rel = self.relationships.shift_remove(id)?;
        self.edges.remove(&EdgeKey::of(&rel));
        for end in [&rel.source_id, &rel.target_id] {
            if let Some(set) = self.incident.get_mut(end) {
                set.shift_remove(id);
            }
        }
        Some(rel)
    }

    /// Entities adjacent to `id` in either direction, optionally restricted to one kind.
    pub fn neighbors(&self, id: &EntityId, kind: Option<&str>) -> Vec<&Entity> {
        let Some(rel_ids) = self.incident.get(id) else {
            return Vec::new();
        };
        let adjacent: IndexSet<&EntityId> = rel_ids
            .iter()
            .filter_map(|rid| self.relationships.get(rid))
            .filter(|rel| kind.map_or(true, |k| rel.kind == k))
            .filter_map(|rel| rel.other_end(id))
            .collect();
        adjacent
            .into_iter()
            .filter_map(|nid| self.entities.get(nid))
            .collect()
    }

    /// All entities in insertion order, optionally of one type.
    pub fn all_entities(&self, entity_type: Option<&str>) -> Vec<&Entity> {
        self.entities
            .values()
            .filter(|e| entity_type.map_or(true, |t| e.entity_type() == t))
            .collect()
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Look up an entity by type and equality key (normalized before matching).
    pub fn find_by_key(&self, entity_type: &str, key: &str) -> Option<&Entity> {
        self.keys
            .get(&(entity_type.to_string(), normalize_key_part(key)))
            .and_then(|id| self.entities.get(id))
    }

    pub fn relationship(&self, id: &RelationshipId) -> Option<&Relationship> {
        self.relationships.get(id)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    /// Relationships touching `id`, in insertion order.
    pub fn relationships_of(&self, id: &EntityId) -> Vec<&Relationship> {
        self.incident
            .get(id)
            .map(|rel_ids| {
                rel_ids
                    .iter()
                    .filter_map(|rid| self.relationships.get(rid))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Conflict notes recorded against an entity.
    pub fn conflicts(&self, id: &EntityId) -> Vec<ConflictNote> {
        self.entities
            .get(id)
            .and_then(|e| e.metadata().get(CONFLICTS_KEY))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity counts per type, ordered by first appearance.
    pub fn counts_by_type(&self) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        for entity in self.entities.values() {
            *counts.entry(entity.entity_type().to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.keys.clear();
        self.relationships.clear();
        self.edges.clear();
        self.incident.clear();
    }

    pub(crate) fn lookup_type(&self, name: &str) -> Result<Arc<EntityType>> {
        self.registry
            .entity_type(name)
            .cloned()
            .ok_or_else(|| PanoError::UnknownEntityType(name.to_string()))
    }
}

fn rederive_or_keep(entity_type: &EntityType, id: &EntityId, properties: &Properties) -> Properties {
    match entity_type.rederive(properties) {
        Ok(rederived) => rederived,
        Err(e) => {
            log::warn!("Re-deriving fields of {} failed: {}", id, e);
            properties.clone()
        }
    }
}

/// Put back the stored value of `field`, or drop it when it was never set.
fn restore_field(properties: &mut Properties, stored: &Properties, field: &str) {
    match stored.get(field) {
        Some(value) => {
            properties.insert(field.to_string(), value.clone());
        }
        None => {
            properties.remove(field);
        }
    }
}

/// Key fields that normalize to the same key part are not a conflict.
fn same_key_part(entity_type: &EntityType, field: &str, a: &PropertyValue, b: &PropertyValue) -> bool {
    entity_type.is_key_field(field)
        && normalize_key_part(&a.to_string()) == normalize_key_part(&b.to_string())
}

fn push_conflict(metadata: &mut Metadata, note: ConflictNote) {
    let value = serde_json::to_value(&note).unwrap_or(serde_json::Value::Null);
    match metadata.get_mut(CONFLICTS_KEY) {
        Some(serde_json::Value::Array(notes)) => notes.push(value),
        _ => {
            metadata.insert(CONFLICTS_KEY.to_string(), serde_json::Value::Array(vec![value]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> InvestigationGraph {
        InvestigationGraph::new(Arc::new(PluginRegistry::with_builtins().unwrap()))
    }

    fn props(pairs: &[(&str, PropertyValue)]) -> Properties {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_add_entity_sets_label_and_key() {
        let mut g = graph();
        let e = g
            .add_entity("Email", props(&[("address", "Jane@Example.org".into())]))
            .unwrap();
        assert_eq!(e.label(), "Jane@Example.org");
        assert_eq!(e.equality_key(), Some("jane@example.org"));
        assert_eq!(g.entity_count(), 1);
        assert!(g.find_by_key("Email", "JANE@example.org").is_some());
    }

    #[test]
    fn test_unknown_type_and_invalid_value_leave_graph_unchanged() {
        let mut g = graph();
        let err = g.add_entity("Spaceship", Properties::new()).unwrap_err();
        assert!(matches!(err, PanoError::UnknownEntityType(_)));
        let err = g
            .add_entity("Email", props(&[("address", "not-an-email".into())]))
            .unwrap_err();
        assert!(err.is_schema_error());
        assert!(g.is_empty());
    }

    #[test]
    fn test_duplicate_key_enriches_existing() {
        let mut g = graph();
        let first = g
            .add_entity("Person", props(&[("full_name", "Ada Lovelace".into())]))
            .unwrap();
        let (second, outcome) = g
            .upsert_entity(
                "Person",
                props(&[
                    ("full_name", "ada lovelace".into()),
                    ("occupation", "Mathematician".into()),
                ]),
                "import",
            )
            .unwrap();
        assert_eq!(outcome, Upsert::Enriched);
        assert_eq!(first.id(), second.id());
        assert_eq!(g.entity_count(), 1);
        assert_eq!(second.property_str("occupation"), "Mathematician");
        assert_eq!(second.property_str("full_name"), "Ada Lovelace");
        assert_eq!(second.source(), "import");
        assert!(g.conflicts(first.id()).is_empty());
    }

    #[test]
    fn test_conflicting_value_is_recorded_not_overwritten() {
        let mut g = graph();
        let first = g
            .add_entity(
                "Person",
                props(&[("full_name", "Ada".into()), ("age", 36.into())]),
            )
            .unwrap();
        g.add_entity_with_source(
            "Person",
            props(&[("full_name", "Ada".into()), ("age", 37.into())]),
            "census",
        )
        .unwrap();
        let stored = g.entity(first.id()).unwrap();
        assert_eq!(stored.property("age"), Some(&PropertyValue::Integer(36)));
        let notes = g.conflicts(first.id());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].field, "age");
        assert_eq!(notes[0].incoming, serde_json::json!(37));
        assert_eq!(notes[0].source, "census");
    }

    #[test]
    fn test_re_adding_same_values_is_unchanged() {
        let mut g = graph();
        let p = props(&[("text", "hello".into())]);
        g.add_entity("Text", p.clone()).unwrap();
        let (_, outcome) = g.upsert_entity("Text", p, "").unwrap();
        assert_eq!(outcome, Upsert::Unchanged);
    }

    #[test]
    fn test_entities_without_key_never_merge() {
        let mut g = graph();
        g.add_entity("Evidence", props(&[("name", "Photo".into())])).unwrap();
        g.add_entity("Evidence", props(&[("name", "Photo".into())])).unwrap();
        assert_eq!(g.all_entities(Some("Evidence")).len(), 2);
    }

    #[test]
    fn test_relationship_dedup_and_unknown_endpoint() {
        let mut g = graph();
        let a = g.add_entity("Text", props(&[("text", "a".into())])).unwrap();
        let b = g.add_entity("Text", props(&[("text", "b".into())])).unwrap();
        let r1 = g.add_relationship(a.id(), b.id(), "mentions").unwrap();
        let r2 = g.add_relationship(a.id(), b.id(), "mentions").unwrap();
        assert_eq!(r1.id, r2.id);
        assert_eq!(g.relationship_count(), 1);
        g.add_relationship(b.id(), a.id(), "mentions").unwrap();
        assert_eq!(g.relationship_count(), 2);

        let err = g
            .add_relationship(a.id(), &EntityId::from("missing"), "mentions")
            .unwrap_err();
        assert!(matches!(err, PanoError::UnknownEntity(_)));
        assert_eq!(g.relationship_count(), 2);
    }

    #[test]
    fn test_remove_entity_cascades_and_is_idempotent() {
        let mut g = graph();
        let a = g.add_entity("Text", props(&[("text", "a".into())])).unwrap();
        let b = g.add_entity("Text", props(&[("text", "b".into())])).unwrap();
        let c = g.add_entity("Text", props(&[("text", "c".into())])).unwrap();
        g.add_relationship(a.id(), b.id(), "x").unwrap();
        g.add_relationship(c.id(), a.id(), "y").unwrap();
        g.add_relationship(b.id(), c.id(), "z").unwrap();

        assert!(g.remove_entity(a.id()).is_some());
        assert_eq!(g.relationship_count(), 1);
        assert!(g.relationships().all(|r| !r.touches(a.id())));
        assert!(g.find_by_key("Text", "a").is_none());
        assert!(g.remove_entity(a.id()).is_none());

        // Key is free again after removal.
        let again = g.add_entity("Text", props(&[("text", "a".into())])).unwrap();
        assert_ne!(again.id(), a.id());
    }

    #[test]
    fn test_neighbors_with_kind_filter() {
        let mut g = graph();
        let hub = g.add_entity("Person", props(&[("full_name", "Hub".into())])).unwrap();
        let e = g
            .add_entity("Email", props(&[("address", "hub@x.io".into())]))
            .unwrap();
        let p = g
            .add_entity("Phone", props(&[("number", "5550100".into())]))
            .unwrap();
        g.add_relationship(hub.id(), e.id(), "uses").unwrap();
        g.add_relationship(p.id(), hub.id(), "belongs_to").unwrap();

        assert_eq!(g.neighbors(hub.id(), None).len(), 2);
        let uses = g.neighbors(hub.id(), Some("uses"));
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].id(), e.id());
        assert!(g.neighbors(&EntityId::from("nope"), None).is_empty());
    }

    #[test]
    fn test_set_property_revalidates_and_rekeys() {
        let mut g = graph();
        let a = g.add_entity("Company", props(&[("name", "Acme".into())])).unwrap();
        let b = g.add_entity("Company", props(&[("name", "Globex".into())])).unwrap();

        let err = g.set_property(a.id(), "name", "GLOBEX").unwrap_err();
        assert!(matches!(err, PanoError::DuplicateKey { .. }));

        let renamed = g.set_property(a.id(), "name", "Initech").unwrap();
        assert_eq!(renamed.label(), "Initech");
        assert!(g.find_by_key("Company", "acme").is_none());
        assert_eq!(g.find_by_key("Company", "initech").unwrap().id(), a.id());
        assert_eq!(g.find_by_key("Company", "globex").unwrap().id(), b.id());

        let err = g.set_property(a.id(), "founded", 1999).unwrap_err();
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_all_entities_preserves_insertion_order() {
        let mut g = graph();
        for name in ["c", "a", "b"] {
            g.add_entity("Text", props(&[("text", name.into())])).unwrap();
        }
        let order: Vec<&str> = g
            .all_entities(None)
            .iter()
            .map(|e| e.property_str("text"))
            .collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }
}
