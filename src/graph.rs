//! Graph data normalizer
//!
//! Turns a `RelationshipGraph` into flat vertex/edge records for a graph
//! widget. Each record's data map is the element's property bag with the core
//! fields written over it, so `id`, `label`, `size`, `color` (nodes) and `id`,
//! `source`, `target`, `weight` (edges) always hold the real values.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::error::{AnalysisError, Result};
use crate::types::{PropertyValue, Properties, RelationshipGraph};
use crate::wallets::short_address;

/// Joins source and target into an edge key; never part of a wallet address
pub const EDGE_KEY_SEPARATOR: &str = "->";

/// Deterministic key of the logical edge `source -> target`
pub fn edge_key(source: &str, target: &str) -> String {
    format!("{}{}{}", source, EDGE_KEY_SEPARATOR, target)
}

/// Graph vertex ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedNode {
    pub id: String,
    pub label: String,
    pub size: f64,
    pub color: String,
    /// Properties merged with the core fields
    pub data: BTreeMap<String, PropertyValue>,
}

/// Graph edge ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEdge {
    /// `source->target`, see [`edge_key`]
    pub key: String,
    pub source: String,
    pub target: String,
    pub weight: f64,
    /// Properties merged with the core fields
    pub data: BTreeMap<String, PropertyValue>,
}

/// Output of [`normalize`]; nodes and edges keep their input order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedGraph {
    pub nodes: Vec<NormalizedNode>,
    pub edges: Vec<NormalizedEdge>,
}

impl NormalizedGraph {
    /// Node with the given id
    pub fn node(&self, id: &str) -> Option<&NormalizedNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// First edge from `source` to `target`
    pub fn edge(&self, source: &str, target: &str) -> Option<&NormalizedEdge> {
        let key = edge_key(source, target);
        self.edges.iter().find(|e| e.key == key)
    }

    /// Keep only the first edge for each key. Returns how many were removed.
    pub fn dedup_edges(&mut self) -> usize {
        let before = self.edges.len();
        let mut seen = HashSet::new();
        self.edges.retain(|e| seen.insert(e.key.clone()));
        before - self.edges.len()
    }

    /// Element list in the `{nodes: [{data}], edges: [{data}]}` shape
    pub fn to_elements(&self) -> serde_json::Value {
        let wrap = |data: &BTreeMap<String, PropertyValue>| serde_json::json!({ "data": data });
        serde_json::json!({
            "nodes": self.nodes.iter().map(|n| wrap(&n.data)).collect::<Vec<_>>(),
            "edges": self.edges.iter().map(|e| wrap(&e.data)).collect::<Vec<_>>(),
        })
    }
}

fn merge(properties: &Properties, core: [(&str, PropertyValue); 4]) -> BTreeMap<String, PropertyValue> {
    let mut data = properties.clone();
    for (key, value) in core {
        data.insert(key.to_string(), value);
    }
    data
}

/// Normalize a relationship graph.
///
/// Fails with `DataIntegrity` if a node id repeats, an edge references an
/// unknown node, or an edge key equals a node id.
pub fn normalize(graph: &RelationshipGraph) -> Result<NormalizedGraph> {
    let mut node_ids = HashSet::with_capacity(graph.nodes.len());
    let mut nodes = Vec::with_capacity(graph.nodes.len());

    for node in &graph.nodes {
        if !node_ids.insert(node.id.as_str()) {
            return Err(AnalysisError::DataIntegrity(format!(
                "node id {} appears more than once",
                node.id
            )));
        }
        let label = if node.label.is_empty() {
            short_address(&node.id)
        } else {
            node.label.clone()
        };
        let data = merge(
            &node.properties,
            [
                ("id", node.id.clone().into()),
                ("label", label.clone().into()),
                ("size", node.size.into()),
                ("color", node.color.clone().into()),
            ],
        );
        nodes.push(NormalizedNode {
            id: node.id.clone(),
            label,
            size: node.size,
            color: node.color.clone(),
            data,
        });
    }

    let mut edges = Vec::with_capacity(graph.edges.len());
    for edge in &graph.edges {
        for endpoint in [&edge.source, &edge.target] {
            if !node_ids.contains(endpoint.as_str()) {
                return Err(AnalysisError::DataIntegrity(format!(
                    "edge {} references unknown node {}",
                    edge_key(&edge.source, &edge.target),
                    endpoint
                )));
            }
        }
        let key = edge_key(&edge.source, &edge.target);
        if node_ids.contains(key.as_str()) {
            return Err(AnalysisError::DataIntegrity(format!(
                "edge key {} collides with a node id",
                key
            )));
        }
        let data = merge(
            &edge.properties,
            [
                ("id", key.clone().into()),
                ("source", edge.source.clone().into()),
                ("target", edge.target.clone().into()),
                ("weight", edge.weight.into()),
            ],
        );
        edges.push(NormalizedEdge {
            key,
            source: edge.source.clone(),
            target: edge.target.clone(),
            weight: edge.weight,
            data,
        });
    }

    Ok(NormalizedGraph { nodes, edges })
}
