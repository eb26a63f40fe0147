//! BFS traversal over the investigation graph.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::entity::EntityId;
use crate::graph::{InvestigationGraph, Relationship};

/// Traverse the graph from `start` using BFS, following directed edges forward
/// and undirected edges both ways.
/// Returns all relationships discovered within `max_depth` hops.
pub fn traverse(
    graph: &InvestigationGraph,
    start: &EntityId,
    kinds: Option<&[&str]>,
    max_depth: usize,
) -> Vec<Relationship> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    let mut result = Vec::new();

    queue.push_back((start.clone(), 0));
    visited.insert(start.clone());

    while let Some((entity, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }

        for rel in graph.relationships_of(&entity) {
            if let Some(kinds) = kinds {
                if !kinds.contains(&rel.kind.as_str()) {
                    continue;
                }
            }
            let next = if rel.source_id == entity {
                &rel.target_id
            } else if !rel.directed {
                &rel.source_id
            } else {
                continue;
            };
            if !visited.contains(next) {
                visited.insert(next.clone());
                queue.push_back((next.clone(), depth + 1));
                result.push(rel.clone());
            }
        }
    }

    result
}

/// Shortest chain of entity ids from `from` to `to`, ignoring edge direction.
pub fn shortest_path(
    graph: &InvestigationGraph,
    from: &EntityId,
    to: &EntityId,
) -> Option<Vec<EntityId>> {
    if !graph.contains(from) || !graph.contains(to) {
        return None;
    }
    if from == to {
        return Some(vec![from.clone()]);
    }

    let mut parents: HashMap<EntityId, EntityId> = HashMap::new();
    let mut queue = VecDeque::from([from.clone()]);
    let mut visited = HashSet::from([from.clone()]);

    while let Some(entity) = queue.pop_front() {
        for rel in graph.relationships_of(&entity) {
            let Some(next) = rel.other_end(&entity) else {
                continue;
            };
            if !visited.insert(next.clone()) {
                continue;
            }
            parents.insert(next.clone(), entity.clone());
            if next == to {
                let mut path = vec![to.clone()];
                let mut cursor = to;
                while let Some(parent) = parents.get(cursor) {
                    path.push(parent.clone());
                    cursor = parent;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next.clone());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PluginRegistry;
    use crate::schema::Properties;
    use std::sync::Arc;

    // a -> b -> c, a -> d, c -> a
    fn setup_graph() -> (InvestigationGraph, Vec<EntityId>) {
        let mut g = InvestigationGraph::new(Arc::new(PluginRegistry::with_builtins().unwrap()));
        let ids: Vec<EntityId> = ["a", "b", "c", "d"]
            .iter()
            .map(|t| {
                let mut props = Properties::new();
                props.insert("text".into(), (*t).into());
                g.add_entity("Text", props).unwrap().id().clone()
            })
            .collect();
        g.add_relationship(&ids[0], &ids[1], "routes_to").unwrap();
        g.add_relationship(&ids[1], &ids[2], "routes_to").unwrap();
        g.add_relationship(&ids[0], &ids[3], "mentions").unwrap();
        g.add_relationship(&ids[2], &ids[0], "routes_to").unwrap();
        (g, ids)
    }

    #[test]
    fn test_traverse_single_hop() {
        let (g, ids) = setup_graph();
        let relations = traverse(&g, &ids[0], None, 1);
        assert_eq!(relations.len(), 2); // a->b, a->d
        let targets: Vec<_> = relations.iter().map(|r| &r.target_id).collect();
        assert!(targets.contains(&&ids[1]));
        assert!(targets.contains(&&ids[3]));
    }

    #[test]
    fn test_traverse_multi_hop() {
        let (g, ids) = setup_graph();
        let relations = traverse(&g, &ids[0], None, 3);
        assert_eq!(relations.len(), 3); // a->b, a->d, b->c
    }

    #[test]
    fn test_traverse_depth_limit() {
        let (g, ids) = setup_graph();
        assert!(traverse(&g, &ids[0], None, 0).is_empty());
    }

    #[test]
    fn test_traverse_kind_filter() {
        let (g, ids) = setup_graph();
        let relations = traverse(&g, &ids[0], Some(&["routes_to"]), 5);
        assert_eq!(relations.len(), 2);
        assert!(relations.iter().all(|r| r.kind == "routes_to"));
    }

    #[test]
    fn test_traverse_cycle_no_infinite_loop() {
        let (g, ids) = setup_graph();
        // c -> a closes a cycle; a is already visited.
        let relations = traverse(&g, &ids[1], None, 10);
        assert_eq!(relations.len(), 3); // b->c, c->a, a->d
    }

    #[test]
    fn test_traverse_unknown_start() {
        let (g, _) = setup_graph();
        assert!(traverse(&g, &EntityId::from("nope"), None, 2).is_empty());
    }

    #[test]
    fn test_shortest_path_ignores_direction() {
        let (g, ids) = setup_graph();
        let path = shortest_path(&g, &ids[3], &ids[2]).unwrap();
        assert_eq!(path, vec![ids[3].clone(), ids[0].clone(), ids[2].clone()]);
        assert_eq!(shortest_path(&g, &ids[1], &ids[1]), Some(vec![ids[1].clone()]));
    }

    #[test]
    fn test_shortest_path_disconnected() {
        let (mut g, ids) = setup_graph();
        let mut props = Properties::new();
        props.insert("text".into(), "island".into());
        let island = g.add_entity("Text", props).unwrap();
        assert!(shortest_path(&g, &ids[0], island.id()).is_none());
    }
}
