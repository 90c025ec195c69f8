use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::index::NoteIndex;
use crate::NotePath;

/// Stable node identity: the lowercased, extensionless relative path.
pub(crate) fn node_id(path: &NotePath) -> String {
    path.as_noext_lossy().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    /// Browsable path, e.g. `/notes/a`.
    pub path: String,
    /// In-degree + out-degree over materialized edges. Every resolved,
    /// non-self edge adds one to both endpoints; repeated references to the
    /// same target each count.
    pub connections: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

/// Immutable projection of the note graph at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// The subgraph induced by one note and its direct neighbors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub current: String,
}

pub(crate) fn build_snapshot(index: &NoteIndex) -> GraphSnapshot {
    let mut edges = Vec::new();
    let mut connections: HashMap<String, usize> = HashMap::new();

    for (source, record) in index.notes_iter() {
        let source_id = node_id(source);
        for res in &record.resolutions {
            let Some(target) = res.note() else {
                // Static targets and dangling references produce no edge.
                continue;
            };
            if target == source || index.note(target).is_none() {
                continue;
            }
            let target_id = node_id(target);
            *connections.entry(source_id.clone()).or_default() += 1;
            *connections.entry(target_id.clone()).or_default() += 1;
            edges.push(GraphEdge {
                source: source_id.clone(),
                target: target_id,
            });
        }
    }

    let nodes = index
        .notes_iter()
        .map(|(path, _)| {
            let id = node_id(path);
            let connections = connections.get(&id).copied().unwrap_or(0);
            GraphNode {
                id,
                label: path.stem().to_string(),
                path: format!("/{}", path.as_noext_lossy()),
                connections,
            }
        })
        .collect();

    GraphSnapshot { nodes, edges }
}

pub(crate) fn build_local(snapshot: &GraphSnapshot, path: &NotePath) -> Option<LocalGraph> {
    let current = node_id(path);
    if !snapshot.nodes.iter().any(|n| n.id == current) {
        return None;
    }

    let mut connected: HashSet<&str> = HashSet::new();
    connected.insert(&current);
    for edge in &snapshot.edges {
        if edge.source == current {
            connected.insert(&edge.target);
        } else if edge.target == current {
            connected.insert(&edge.source);
        }
    }

    let nodes = snapshot
        .nodes
        .iter()
        .filter(|n| connected.contains(n.id.as_str()))
        .cloned()
        .collect();
    let edges = snapshot
        .edges
        .iter()
        .filter(|e| connected.contains(e.source.as_str()) && connected.contains(e.target.as_str()))
        .cloned()
        .collect();

    Some(LocalGraph {
        nodes,
        edges,
        current,
    })
}
