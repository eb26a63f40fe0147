//! Investigation graph module: entity store, relationships, merge, traversal,
//! and persistence.
//!
//! The graph is owned by one [`SharedGraph`] handle per investigation. Writes
//! take the lock for a single non-suspending critical section, so readers
//! never observe a half-applied merge.

mod investigation;
mod merge;
mod persist;
mod relationship;
mod traversal;

pub use investigation::{ConflictNote, InvestigationGraph, Upsert, CONFLICTS_KEY};
pub use merge::{EntityCandidate, Endpoint, MergeBatch, MergeSummary, RelationshipRequest};
pub use persist::{EntityRecord, GraphDocument, RelationshipRecord, FORMAT_VERSION};
pub use relationship::{Relationship, RelationshipId};
pub use traversal::{shortest_path, traverse};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

use crate::entity::{Entity, EntityId};

/// Cloneable handle to one investigation graph.
#[derive(Debug, Clone)]
pub struct SharedGraph {
    inner: Arc<RwLock<InvestigationGraph>>,
}

impl SharedGraph {
    pub fn new(graph: InvestigationGraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    /// Never hold the guard across an `.await`.
    pub fn read(&self) -> RwLockReadGuard<'_, InvestigationGraph> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, InvestigationGraph> {
        self.inner.write()
    }

    pub fn reader(&self) -> GraphReader {
        GraphReader {
            graph: self.clone(),
        }
    }
}

/// Read-only view handed to transforms. Every call returns owned snapshots.
#[derive(Debug, Clone)]
pub struct GraphReader {
    graph: SharedGraph,
}

impl GraphReader {
    pub fn entity(&self, id: &EntityId) -> Option<Entity> {
        self.graph.read().entity(id).cloned()
    }

    pub fn neighbors(&self, id: &EntityId, kind: Option<&str>) -> Vec<Entity> {
        self.graph
            .read()
            .neighbors(id, kind)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn all_entities(&self, entity_type: Option<&str>) -> Vec<Entity> {
        self.graph
            .read()
            .all_entities(entity_type)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn find_by_key(&self, entity_type: &str, key: &str) -> Option<Entity> {
        self.graph.read().find_by_key(entity_type, key).cloned()
    }

    /// Run `f` against the graph under the read lock.
    pub fn with<R>(&self, f: impl FnOnce(&InvestigationGraph) -> R) -> R {
        f(&self.graph.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PluginRegistry;
    use crate::schema::Properties;

    #[test]
    fn test_reader_sees_writes() {
        let shared = SharedGraph::new(InvestigationGraph::new(Arc::new(
            PluginRegistry::with_builtins().unwrap(),
        )));
        let reader = shared.reader();
        assert!(reader.all_entities(None).is_empty());

        let mut props = Properties::new();
        props.insert("name".into(), "Acme".into());
        let id = shared.write().add_entity("Company", props).unwrap().id().clone();

        assert_eq!(reader.entity(&id).unwrap().label(), "Acme");
        assert!(reader.find_by_key("Company", "ACME").is_some());
        assert_eq!(reader.with(|g| g.entity_count()), 1);
    }
}
