//! Transforms: pluggable operations that turn one entity into new or
//! enriched entities.
//!
//! A transform never touches the graph directly. It reads through a
//! [`GraphReader`] and returns a [`TransformOutput`]; the engine merges that
//! output in one atomic step.

pub mod builtin;

pub use builtin::builtin_transforms;
pub use crate::graph::{EntityCandidate, Endpoint, RelationshipRequest};

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::entity::Entity;
use crate::graph::GraphReader;
use crate::status::{OperationId, StatusReporter};

/// Relationship kind used to link an input to outputs it did not link itself.
pub const DEFAULT_LINK_KIND: &str = "associated_with";

/// Static description of a transform, held by the registry.
#[derive(Debug, Clone)]
pub struct TransformDescriptor {
    pub name: String,
    pub description: String,
    pub input_types: Vec<String>,
    pub output_types: Vec<String>,
    /// Only network-bound transforms are rate limited.
    pub network_bound: bool,
    pub cooldown: Option<Duration>,
    pub timeout: Option<Duration>,
    /// `None` disables the automatic input→output link.
    pub link_kind: Option<String>,
}

impl TransformDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_types: Vec::new(),
            output_types: Vec::new(),
            network_bound: false,
            cooldown: None,
            timeout: None,
            link_kind: Some(DEFAULT_LINK_KIND.to_string()),
        }
    }

    pub fn inputs(mut self, types: &[&str]) -> Self {
        self.input_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn outputs(mut self, types: &[&str]) -> Self {
        self.output_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn network_bound(mut self) -> Self {
        self.network_bound = true;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn link_kind(mut self, kind: Option<&str>) -> Self {
        self.link_kind = kind.map(str::to_string);
        self
    }

    pub fn accepts(&self, entity_type: &str) -> bool {
        self.input_types.iter().any(|t| t == entity_type)
    }

    pub fn produces(&self, entity_type: &str) -> bool {
        self.output_types.iter().any(|t| t == entity_type)
    }
}

/// What a run hands back to the engine.
#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    pub entities: Vec<EntityCandidate>,
    pub relationships: Vec<RelationshipRequest>,
}

impl TransformOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate and return its index for use in [`Endpoint::Output`].
    pub fn push(&mut self, candidate: EntityCandidate) -> usize {
        self.entities.push(candidate);
        self.entities.len() - 1
    }

    pub fn entity(mut self, candidate: EntityCandidate) -> Self {
        self.entities.push(candidate);
        self
    }

    pub fn link(mut self, source: Endpoint, target: Endpoint, kind: impl Into<String>) -> Self {
        self.relationships
            .push(RelationshipRequest::new(source, target, kind));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Everything a run may look at.
#[derive(Debug, Clone)]
pub struct TransformContext {
    entity: Entity,
    graph: GraphReader,
    cancel: CancellationToken,
    status: StatusReporter,
    operation: OperationId,
}

impl TransformContext {
    pub fn new(
        entity: Entity,
        graph: GraphReader,
        cancel: CancellationToken,
        status: StatusReporter,
        operation: OperationId,
    ) -> Self {
        Self {
            entity,
            graph,
            cancel,
            status,
            operation,
        }
    }

    /// Snapshot of the input entity taken when the run was scheduled.
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn graph(&self) -> &GraphReader {
        &self.graph
    }

    /// Await this alongside I/O to stop early on cancellation.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn progress(&self, text: &str) {
        self.status.update(self.operation, text);
    }
}

/// A pluggable operation over one entity.
///
/// `run` may suspend on I/O but must not spawn background work of its own;
/// the engine owns scheduling, concurrency, timeouts, and cancellation.
#[async_trait]
pub trait Transform: Send + Sync {
    fn descriptor(&self) -> &TransformDescriptor;

    async fn run(&self, ctx: TransformContext) -> anyhow::Result<TransformOutput>;
}
