//! Helpers: read-only analysis tools over an investigation graph.

use anyhow::Context;
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::entity::EntityId;
use crate::graph::{shortest_path, InvestigationGraph};

/// An analysis tool that reads the graph but never mutates it.
pub trait Helper: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn analyze(&self, graph: &InvestigationGraph, params: &Value) -> anyhow::Result<Value>;
}

pub fn builtin_helpers() -> Vec<Arc<dyn Helper>> {
    vec![Arc::new(ConnectionFinder), Arc::new(GraphSummary)]
}

/// Shortest undirected path between two entities.
///
/// Parameters: `{"from": "<entity id>", "to": "<entity id>"}`. The result
/// holds `found` and, when found, the `path` as `{id, type, label}` steps.
pub struct ConnectionFinder;

fn entity_param(params: &Value, name: &str) -> anyhow::Result<EntityId> {
    let id = params
        .get(name)
        .and_then(Value::as_str)
        .with_context(|| format!("missing string parameter '{name}'"))?;
    Ok(EntityId::from(id))
}

impl Helper for ConnectionFinder {
    fn name(&self) -> &str {
        "Connection Finder"
    }

    fn description(&self) -> &str {
        "Finds the shortest chain of relationships between two entities"
    }

    fn analyze(&self, graph: &InvestigationGraph, params: &Value) -> anyhow::Result<Value> {
        let from = entity_param(params, "from")?;
        let to = entity_param(params, "to")?;
        for id in [&from, &to] {
            if !graph.contains(id) {
                anyhow::bail!("unknown entity {id}");
            }
        }

        let Some(path) = shortest_path(graph, &from, &to) else {
            return Ok(json!({ "found": false }));
        };
        let steps: Vec<Value> = path
            .iter()
            .filter_map(|id| graph.entity(id))
            .map(|e| json!({ "id": e.id(), "type": e.entity_type(), "label": e.label() }))
            .collect();
        Ok(json!({ "found": true, "hops": steps.len().saturating_sub(1), "path": steps }))
    }
}

/// Entity counts per type and relationship counts per kind.
pub struct GraphSummary;

impl Helper for GraphSummary {
    fn name(&self) -> &str {
        "Graph Summary"
    }

    fn description(&self) -> &str {
        "Counts entities by type and relationships by kind"
    }

    fn analyze(&self, graph: &InvestigationGraph, _params: &Value) -> anyhow::Result<Value> {
        let mut kinds: IndexMap<String, usize> = IndexMap::new();
        for rel in graph.relationships() {
            *kinds.entry(rel.kind.clone()).or_insert(0) += 1;
        }
        Ok(json!({
            "entities": graph.entity_count(),
            "relationships": graph.relationship_count(),
            "entity_types": graph.counts_by_type(),
            "relationship_kinds": kinds,
        }))
    }
}
