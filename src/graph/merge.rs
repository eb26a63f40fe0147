//! Atomic batch merge of transform output into the graph.

use std::collections::HashSet;

use crate::entity::{Entity, EntityId, Metadata};
use crate::error::{PanoError, Result};
use crate::graph::investigation::{InvestigationGraph, Upsert};
use crate::schema::{Properties, PropertyValue};

/// An entity proposed for insertion; deduplicated against the graph on merge.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCandidate {
    pub entity_type: String,
    pub properties: Properties,
    /// Overrides the batch source when set.
    pub source: Option<String>,
}

impl EntityCandidate {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            properties: Properties::new(),
            source: None,
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(field.into(), value.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// One end of a requested relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// The entity the transform ran on.
    Input,
    /// The n-th candidate of the same batch.
    Output(usize),
    /// An entity already in the graph.
    Existing(EntityId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRequest {
    pub source: Endpoint,
    pub target: Endpoint,
    pub kind: String,
    pub directed: bool,
    pub metadata: Metadata,
}

impl RelationshipRequest {
    pub fn new(source: Endpoint, target: Endpoint, kind: impl Into<String>) -> Self {
        Self {
            source,
            target,
            kind: kind.into(),
            directed: true,
            metadata: Metadata::new(),
        }
    }

    pub fn undirected(mut self) -> Self {
        self.directed = false;
        self
    }
}

/// Everything one transform run wants to add.
#[derive(Debug, Clone)]
pub struct MergeBatch {
    pub input: EntityId,
    pub entities: Vec<EntityCandidate>,
    pub relationships: Vec<RelationshipRequest>,
    /// Kind of the default input→output edge for outputs no request links.
    pub link_kind: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Default)]
pub struct MergeSummary {
    /// Resulting entities in output order, one per distinct id.
    pub entities: Vec<Entity>,
    pub created: usize,
    pub enriched: usize,
    pub relationships_added: usize,
}

impl InvestigationGraph {
    /// Validate the whole batch, then apply it. On error nothing is written.
    pub fn merge(&mut self, batch: MergeBatch) -> Result<MergeSummary> {
        if !self.contains(&batch.input) {
            return Err(PanoError::UnknownEntity(batch.input.to_string()));
        }

        let mut prepared = Vec::with_capacity(batch.entities.len());
        for candidate in batch.entities {
            let source = candidate.source.as_deref().unwrap_or(&batch.source);
            prepared.push(self.prepare(&candidate.entity_type, candidate.properties, source)?);
        }
        for request in &batch.relationships {
            if request.kind.trim().is_empty() {
                return Err(PanoError::schema("Relationship", "kind", "must not be empty"));
            }
            for end in [&request.source, &request.target] {
                self.check_endpoint(end, prepared.len())?;
            }
        }

        let mut summary = MergeSummary::default();
        let mut ids = Vec::with_capacity(prepared.len());
        for candidate in prepared {
            let (id, outcome) = self.upsert(candidate, None);
            match outcome {
                Upsert::Created => summary.created += 1,
                Upsert::Enriched => summary.enriched += 1,
                Upsert::Unchanged => {}
            }
            ids.push(id);
        }

        let mut linked = HashSet::new();
        for request in batch.relationships {
            for end in [&request.source, &request.target] {
                if let Endpoint::Output(i) = end {
                    linked.insert(*i);
                }
            }
            let source = resolve(&request.source, &batch.input, &ids);
            let target = resolve(&request.target, &batch.input, &ids);
            let (_, created) = self.link(
                &source,
                &target,
                &request.kind,
                request.directed,
                request.metadata,
                None,
            );
            summary.relationships_added += usize::from(created);
        }

        if let Some(kind) = &batch.link_kind {
            for (i, id) in ids.iter().enumerate() {
                if linked.contains(&i) || *id == batch.input {
                    continue;
                }
                let (_, created) = self.link(&batch.input, id, kind, true, Metadata::new(), None);
                summary.relationships_added += usize::from(created);
            }
        }

        let mut seen = HashSet::new();
        summary.entities = ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .filter_map(|id| self.entity(id).cloned())
            .collect();
        Ok(summary)
    }

    fn check_endpoint(&self, end: &Endpoint, outputs: usize) -> Result<()> {
        match end {
            Endpoint::Input => Ok(()),
            Endpoint::Output(i) if *i < outputs => Ok(()),
            Endpoint::Output(i) => Err(PanoError::UnknownEntity(format!("output #{i}"))),
            Endpoint::Existing(id) if self.contains(id) => Ok(()),
            Endpoint::Existing(id) => Err(PanoError::UnknownEntity(id.to_string())),
        }
    }
}

fn resolve(end: &Endpoint, input: &EntityId, outputs: &[EntityId]) -> EntityId {
    match end {
        Endpoint::Input => input.clone(),
        Endpoint::Output(i) => outputs[*i].clone(),
        Endpoint::Existing(id) => id.clone(),
    }
}
