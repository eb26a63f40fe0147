//! JSON graph documents: save and restore whole investigations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::entity::{EntityId, Metadata};
use crate::error::{PanoError, Result};
use crate::graph::relationship::RelationshipId;
use crate::graph::InvestigationGraph;
use crate::registry::PluginRegistry;
use crate::schema::Properties;

/// Current graph document format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub properties: Properties,
    /// Informational only; recomputed on load.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: RelationshipId,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub kind: String,
    #[serde(default = "default_directed")]
    pub directed: bool,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_directed() -> bool {
    true
}

/// Serialized form of an [`InvestigationGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub relationships: Vec<RelationshipRecord>,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

impl InvestigationGraph {
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            version: FORMAT_VERSION,
            entities: self
                .all_entities(None)
                .into_iter()
                .map(|e| EntityRecord {
                    id: e.id().clone(),
                    entity_type: e.entity_type().to_string(),
                    properties: e.properties().clone(),
                    label: e.label().to_string(),
                    source: e.source().to_string(),
                    metadata: e.metadata().clone(),
                })
                .collect(),
            relationships: self
                .relationships()
                .map(|r| RelationshipRecord {
                    id: r.id.clone(),
                    source_id: r.source_id.clone(),
                    target_id: r.target_id.clone(),
                    kind: r.kind.clone(),
                    directed: r.directed,
                    metadata: r.metadata.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild a graph, re-validating every record against `registry`.
    ///
    /// Records whose equality keys collide are merged the same way
    /// `add_entity` merges, and relationships pointing at a merged record are
    /// redirected to the surviving entity. Any invalid record fails the load.
    pub fn from_document(registry: Arc<PluginRegistry>, document: GraphDocument) -> Result<Self> {
        if document.version > FORMAT_VERSION {
            return Err(PanoError::InvalidDocument(format!(
                "unsupported format version {} (newest supported is {})",
                document.version, FORMAT_VERSION
            )));
        }

        let mut graph = InvestigationGraph::new(registry);
        let mut remap: HashMap<EntityId, EntityId> = HashMap::new();

        for record in document.entities {
            if remap.contains_key(&record.id) {
                return Err(PanoError::InvalidDocument(format!(
                    "duplicate entity id {}",
                    record.id
                )));
            }
            let prepared = graph.prepare(&record.entity_type, record.properties, &record.source)?;
            let (id, _) = graph.upsert(prepared, Some(record.id.clone()));
            for (key, value) in record.metadata {
                graph.set_metadata(&id, &key, value)?;
            }
            remap.insert(record.id, id);
        }

        for record in document.relationships {
            let source = remap
                .get(&record.source_id)
                .cloned()
                .ok_or_else(|| PanoError::UnknownEntity(record.source_id.to_string()))?;
            let target = remap
                .get(&record.target_id)
                .cloned()
                .ok_or_else(|| PanoError::UnknownEntity(record.target_id.to_string()))?;
            graph.check_link(&source, &target, &record.kind)?;
            graph.link(
                &source,
                &target,
                &record.kind,
                record.directed,
                record.metadata,
                Some(record.id),
            );
        }

        log::info!(
            "Restored graph: {} entities, {} relationships",
            graph.entity_count(),
            graph.relationship_count()
        );
        Ok(graph)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    pub fn from_json(registry: Arc<PluginRegistry>, json: &str) -> Result<Self> {
        let document: GraphDocument = serde_json::from_str(json)?;
        Self::from_document(registry, document)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        log::info!("Saved graph to {}", path.display());
        Ok(())
    }

    pub fn load_from_file(registry: Arc<PluginRegistry>, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(registry, &content)
    }
}
