// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edge definitions for the graph.

use crate::graph::{ConnectionError, Graph};
use crate::node::NodeId;
use crate::port::{Port, PortDirection, PortId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an edge, derived from its endpoint port ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId {
    /// Source (output) port
    pub source: PortId,
    /// Target (input) port
    pub target: PortId,
}

impl EdgeId {
    /// Derive the id for an edge between two ports
    pub fn new(source: PortId, target: PortId) -> Self {
        Self { source, target }
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}

/// A directed, type-checked link from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    id: EdgeId,
}

impl Edge {
    /// Create an edge between two ports.
    ///
    /// Fails if the source is not an output or the port types are
    /// incompatible. Does not register itself on either port.
    pub fn new(source: &Port, target: &Port) -> Result<Self, ConnectionError> {
        if source.direction() != PortDirection::Output
            || target.direction() != PortDirection::Input
        {
            return Err(ConnectionError::Direction {
                from: source.id.clone(),
                to: target.id.clone(),
            });
        }

        if !source.can_connect_to(target) {
            return Err(ConnectionError::Incompatible {
                from: source.port_type,
                to: target.port_type,
            });
        }

        Ok(Self {
            id: EdgeId::new(source.id.clone(), target.id.clone()),
        })
    }

    /// Edge ID
    pub fn id(&self) -> &EdgeId {
        &self.id
    }

    /// Source (output) port
    pub fn source(&self) -> &PortId {
        &self.id.source
    }

    /// Target (input) port
    pub fn target(&self) -> &PortId {
        &self.id.target
    }

    /// Source node ID
    pub fn source_node(&self) -> NodeId {
        self.id.source.node
    }

    /// Target node ID
    pub fn target_node(&self) -> NodeId {
        self.id.target.node
    }

    /// Check if this edge involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.source_node() == node_id || self.target_node() == node_id
    }

    /// Check if this edge involves a specific port
    pub fn involves_port(&self, port_id: &PortId) -> bool {
        self.id.source == *port_id || self.id.target == *port_id
    }

    /// Copy the source port's value into the target port.
    ///
    /// No coercion happens; `Object` handles are shared, everything else is
    /// copied. Returns `false` if either endpoint is missing or currently
    /// borrowed by a running computation.
    pub fn propagate(&self, graph: &Graph) -> bool {
        let value = {
            let Some(source) = graph.node(self.source_node()) else {
                return false;
            };
            match source.base().output(&self.id.source.name) {
                Some(port) => port.value.clone(),
                None => return false,
            }
        };

        let Some(mut target) = graph.borrow_node_mut(self.target_node()) else {
            return false;
        };
        match target.base_mut().input_mut(&self.id.target.name) {
            Some(port) => {
                port.receive(&self.id, value);
                true
            }
            None => false,
        }
    }
}
