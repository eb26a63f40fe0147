//! Typed edges between entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::entity::{EntityId, Metadata};

/// Unique relationship identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(String);

impl RelationshipId {
    pub fn new() -> Self {
        RelationshipId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RelationshipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelationshipId {
    fn from(s: &str) -> Self {
        RelationshipId(s.to_string())
    }
}

/// A single edge in the investigation graph (source --kind--> target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique identifier (UUID v4 unless restored from a document).
    pub id: RelationshipId,
    pub source_id: EntityId,
    pub target_id: EntityId,
    /// Relationship semantics, e.g. `associated_with`.
    pub kind: String,
    /// Undirected edges are matched in both directions.
    #[serde(default = "default_directed")]
    pub directed: bool,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_directed() -> bool {
    true
}

impl Relationship {
    /// True if `id` is either endpoint.
    pub fn touches(&self, id: &EntityId) -> bool {
        &self.source_id == id || &self.target_id == id
    }

    /// The endpoint opposite `id`, if `id` is an endpoint.
    pub fn other_end(&self, id: &EntityId) -> Option<&EntityId> {
        if &self.source_id == id {
            Some(&self.target_id)
        } else if &self.target_id == id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

/// Dedup key for a relationship; undirected edges use a canonical endpoint order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct EdgeKey {
    a: EntityId,
    b: EntityId,
    kind: String,
    directed: bool,
}

impl EdgeKey {
    pub(crate) fn new(source: &EntityId, target: &EntityId, kind: &str, directed: bool) -> Self {
        let (a, b) = if !directed && target < source {
            (target.clone(), source.clone())
        } else {
            (source.clone(), target.clone())
        };
        Self {
            a,
            b,
            kind: kind.to_string(),
            directed,
        }
    }

    pub(crate) fn of(rel: &Relationship) -> Self {
        Self::new(&rel.source_id, &rel.target_id, &rel.kind, rel.directed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undirected_key_is_symmetric() {
        let a = EntityId::from("a");
        let b = EntityId::from("b");
        assert_eq!(EdgeKey::new(&a, &b, "knows", false), EdgeKey::new(&b, &a, "knows", false));
        assert_ne!(EdgeKey::new(&a, &b, "knows", true), EdgeKey::new(&b, &a, "knows", true));
    }

    #[test]
    fn test_other_end() {
        let rel = Relationship {
            id: RelationshipId::new(),
            source_id: "a".into(),
            target_id: "b".into(),
            kind: "owns".into(),
            directed: true,
            metadata: Metadata::new(),
        };
        assert_eq!(rel.other_end(&"a".into()), Some(&EntityId::from("b")));
        assert_eq!(rel.other_end(&"c".into()), None);
        assert!(rel.touches(&"b".into()));
    }

    #[test]
    fn test_directed_defaults_true_on_deserialize() {
        let json = r#"{"id":"r1","source_id":"a","target_id":"b","kind":"owns"}"#;
        let rel: Relationship = serde_json::from_str(json).unwrap();
        assert!(rel.directed);
        assert!(rel.metadata.is_empty());
    }
}
