// SPDX-License-Identifier: MIT OR Apache-2.0
//! Serialized graph documents.
//!
//! A document records each node's type, presentation data, input defaults
//! and properties, and each edge as a pair of (node id, port name)
//! endpoints. Port and edge ids are derived, so they are rebuilt on load.
//!
//! JSON is the primary encoding; RON is accepted as well.

use crate::graph::Graph;
use crate::node::{NodeFactory, NodeId, Position};
use crate::port::{PortId, PortValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Current document format version
pub const FORMAT_VERSION: &str = "1.0.0";

/// A saved node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    /// Node ID
    pub id: NodeId,
    /// Type tag passed to the node factory
    #[serde(rename = "type")]
    pub node_type: String,
    /// Display label
    pub label: String,
    /// Canvas position
    pub position: Position,
    /// Input default values by port name
    #[serde(default)]
    pub inputs: IndexMap<String, PortValue>,
    /// Property values by name
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, PortValue>,
    /// Width override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_width: Option<f32>,
    /// Height override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_height: Option<f32>,
}

/// A saved edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    /// Edge ID at save time (informational)
    pub id: String,
    /// Source node
    pub source_node_id: NodeId,
    /// Output port on the source node
    pub source_port_name: String,
    /// Target node
    pub target_node_id: NodeId,
    /// Input port on the target node
    pub target_port_name: String,
}

/// A whole saved graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Format version
    pub version: String,
    /// Saved nodes
    pub nodes: Vec<NodeRecord>,
    /// Saved edges
    pub edges: Vec<EdgeRecord>,
}

/// Outcome of restoring a document into a graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Nodes created
    pub nodes_loaded: usize,
    /// Edges created
    pub edges_loaded: usize,
    /// Nodes whose type the factory did not know, with that type
    pub skipped_nodes: Vec<(NodeId, String)>,
    /// Edges whose endpoints could not be resolved or connected
    pub skipped_edges: usize,
}

impl LoadReport {
    /// Whether everything in the document was restored
    pub fn is_complete(&self) -> bool {
        self.skipped_nodes.is_empty() && self.skipped_edges == 0
    }
}

impl GraphDocument {
    /// Capture a graph.
    ///
    /// Only input defaults of non-object port types are written, and only
    /// when the value itself is serializable.
    pub fn from_graph(graph: &Graph) -> Self {
        let nodes = graph
            .nodes()
            .map(|node| {
                let base = node.base();
                let inputs = base
                    .inputs()
                    .filter(|port| !port.port_type.is_object_like())
                    .filter_map(|port| {
                        let value = port.default_value.as_ref()?;
                        value
                            .is_serializable()
                            .then(|| (port.name().to_string(), value.clone()))
                    })
                    .collect();
                let properties = base
                    .properties()
                    .map(|p| (p.name.clone(), p.value.clone()))
                    .collect();

                NodeRecord {
                    id: base.id,
                    node_type: base.node_type().to_string(),
                    label: base.label.clone(),
                    position: base.position,
                    inputs,
                    properties,
                    custom_width: base.custom_width,
                    custom_height: base.custom_height,
                }
            })
            .collect();

        let edges = graph
            .edges()
            .map(|edge| EdgeRecord {
                id: edge.id().to_string(),
                source_node_id: edge.source_node(),
                source_port_name: edge.source().name.clone(),
                target_node_id: edge.target_node(),
                target_port_name: edge.target().name.clone(),
            })
            .collect();

        Self {
            version: FORMAT_VERSION.to_string(),
            nodes,
            edges,
        }
    }

    /// Replace the contents of `graph` with this document.
    ///
    /// Nodes of unknown type and edges with unresolvable endpoints are
    /// skipped; a version mismatch is only logged. Never fails.
    pub fn restore<F>(&self, graph: &mut Graph, factory: &F) -> LoadReport
    where
        F: NodeFactory + ?Sized,
    {
        if self.version != FORMAT_VERSION {
            tracing::warn!(
                found = %self.version,
                expected = FORMAT_VERSION,
                "Graph document version mismatch"
            );
        }

        graph.clear();
        let mut report = LoadReport::default();

        for record in &self.nodes {
            let Some(mut node) = factory.create_node(&record.node_type, record.id) else {
                tracing::warn!(
                    node = %record.id,
                    node_type = %record.node_type,
                    "Unknown node type, skipping node"
                );
                report
                    .skipped_nodes
                    .push((record.id, record.node_type.clone()));
                continue;
            };

            let base = node.base_mut();
            base.label = record.label.clone();
            base.position = record.position;
            base.custom_width = record.custom_width;
            base.custom_height = record.custom_height;
            for (name, value) in &record.properties {
                if let Err(err) = base.set_property(name, value.clone()) {
                    tracing::warn!(node = %record.id, "Skipping saved property: {err}");
                }
            }
            for (name, value) in &record.inputs {
                let value = match base.input(name) {
                    Some(port) => value.clone().conform(port.port_type),
                    None => value.clone(),
                };
                if let Err(err) = base.set_input_default(name, value) {
                    tracing::warn!(node = %record.id, "Skipping saved input: {err}");
                }
            }

            graph.add_node(node);
            report.nodes_loaded += 1;
        }

        for record in &self.edges {
            let source = PortId::output(record.source_node_id, record.source_port_name.as_str());
            let target = PortId::input(record.target_node_id, record.target_port_name.as_str());
            if graph.port_type(&source).is_none() || graph.port_type(&target).is_none() {
                tracing::debug!(edge = %record.id, "Skipping edge with unresolved endpoint");
                report.skipped_edges += 1;
                continue;
            }

            // Keep earlier edges so multi-connection inputs come back whole
            match graph.try_connect(&source, &target, true) {
                Ok(_) => report.edges_loaded += 1,
                Err(err) => {
                    tracing::debug!(edge = %record.id, "Skipping edge: {err}");
                    report.skipped_edges += 1;
                }
            }
        }

        tracing::info!(
            nodes = report.nodes_loaded,
            edges = report.edges_loaded,
            skipped_nodes = report.skipped_nodes.len(),
            skipped_edges = report.skipped_edges,
            "Graph document loaded"
        );
        report
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON
    pub fn from_json(s: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Serialize to RON format
    pub fn to_ron(&self) -> Result<String, DocumentError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Deserialize from RON format
    pub fn from_ron(s: &str) -> Result<Self, DocumentError> {
        Ok(ron::from_str(s)?)
    }
}

/// Errors encoding or decoding document text
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Invalid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid RON
    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    /// RON serialization failed
    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),
}
