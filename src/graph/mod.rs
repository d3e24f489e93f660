//! Knowledge graph model and radial layout.
//!
//! A graph is rebuilt wholesale for every answered query: one core node at
//! the origin and one concept node per related concept, evenly spaced on a
//! circle around it. Coordinates are relative to the core; renderers add
//! their own centre offset.

pub mod svg;

use std::collections::HashSet;
use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::knowledge::RelatedConcept;

pub const CORE_NODE_ID: &str = "core";
pub const CORE_DESCRIPTION: &str = "Main research topic";
pub const DEFAULT_RADIUS: f64 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Core,
    Concept,
    Detail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub x: f64,
    pub y: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEdge {
    pub source: String,
    pub target: String,
    /// How the target relates to the source (`"Component of"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<KnowledgeNode>,
    pub edges: Vec<KnowledgeEdge>,
}

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),
    #[error("edge {from} -> {to} references unknown node")]
    DanglingEdge { from: String, to: String },
}

/// `n` points evenly spaced on a circle of `radius` around the origin,
/// starting at angle 0 and advancing by `2π / n`.
pub fn circle_positions(n: usize, radius: f64) -> Vec<(f64, f64)> {
    if n == 0 {
        return Vec::new();
    }
    let step = TAU / n as f64;
    (0..n)
        .map(|i| {
            let angle = i as f64 * step;
            (angle.cos() * radius, angle.sin() * radius)
        })
        .collect()
}

/// Id of the `index`-th concept node.
pub fn concept_node_id(index: usize) -> String {
    format!("node-{index}")
}

impl GraphData {
    /// Build the radial graph for `topic` and its related concepts.
    pub fn radial(topic: &str, concepts: &[RelatedConcept], radius: f64) -> Self {
        let mut nodes = Vec::with_capacity(concepts.len() + 1);
        let mut edges = Vec::with_capacity(concepts.len());

        nodes.push(KnowledgeNode {
            id: CORE_NODE_ID.to_string(),
            label: topic.to_string(),
            kind: NodeKind::Core,
            x: 0.0,
            y: 0.0,
            description: CORE_DESCRIPTION.to_string(),
        });

        for (index, (concept, (x, y))) in concepts
            .iter()
            .zip(circle_positions(concepts.len(), radius))
            .enumerate()
        {
            let id = concept_node_id(index);
            nodes.push(KnowledgeNode {
                id: id.clone(),
                label: concept.topic.clone(),
                kind: NodeKind::Concept,
                x,
                y,
                description: concept.description.clone(),
            });
            edges.push(KnowledgeEdge {
                source: CORE_NODE_ID.to_string(),
                target: id,
                relation: Some(concept.connection_type.clone()).filter(|r| !r.trim().is_empty()),
            });
        }

        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&KnowledgeNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn core(&self) -> Option<&KnowledgeNode> {
        self.nodes.iter().find(|n| n.kind == NodeKind::Core)
    }

    /// Nodes directly linked from `id`.
    pub fn neighbors<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a KnowledgeNode> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.source == id)
            .filter_map(move |e| self.node(&e.target))
    }

    /// Check node ids are unique and every edge endpoint names a node.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }
        for edge in &self.edges {
            if !ids.contains(edge.source.as_str()) || !ids.contains(edge.target.as_str()) {
                return Err(GraphError::DanglingEdge {
                    from: edge.source.clone(),
                    to: edge.target.clone(),
                });
            }
        }
        Ok(())
    }
}
