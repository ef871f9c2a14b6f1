// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and edges.
//!
//! The graph owns every node and edge. Nodes sit in `RefCell`s so a running
//! computation can be handed a shared view of the graph while it mutates
//! itself; structural edits go through `&mut Graph` and never contend.

use crate::edge::{Edge, EdgeId};
use crate::node::{Node, NodeId};
use crate::port::{Port, PortDirection, PortId, PortType, PortValue};
use indexmap::IndexMap;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::fmt;

/// What changed in a graph, delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphChange {
    /// A node was added
    NodeAdded(NodeId),
    /// A node and its edges were removed
    NodeRemoved(NodeId),
    /// An edge was created
    EdgeAdded(EdgeId),
    /// An edge was removed
    EdgeRemoved(EdgeId),
    /// Every node and edge was removed
    Cleared,
    /// Node-internal state changed without a structural edit
    Touched,
}

/// Handle returned by [`Graph::on_change`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&GraphChange)>;

/// A node graph
pub struct Graph {
    /// Graph name
    pub name: String,
    /// Nodes in the graph
    nodes: IndexMap<NodeId, RefCell<Box<dyn Node>>>,
    /// Edges between nodes
    edges: IndexMap<EdgeId, Edge>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Add a node to the graph, then run its `init` hook.
    ///
    /// A node already present under the same id is removed first.
    pub fn add_node(&mut self, node: Box<dyn Node>) -> NodeId {
        let id = node.id();
        if self.nodes.contains_key(&id) {
            tracing::warn!(node = %id, "Replacing node with duplicate id");
            self.remove_node(id);
        }

        let cell = self.nodes.entry(id).or_insert(RefCell::new(node));
        cell.get_mut().init();
        tracing::debug!(node = %id, "Node added");
        self.notify(GraphChange::NodeAdded(id));
        id
    }

    /// Remove a node and its edges, running its `dispose` hook
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Box<dyn Node>> {
        if !self.nodes.contains_key(&node_id) {
            return None;
        }

        let incident: Vec<EdgeId> = self
            .edges_for_node(node_id)
            .map(|e| e.id().clone())
            .collect();
        for edge_id in &incident {
            self.remove_edge(edge_id);
        }

        let mut node = self.nodes.shift_remove(&node_id)?.into_inner();
        node.dispose();
        tracing::debug!(node = %node_id, edges = incident.len(), "Node removed");
        self.notify(GraphChange::NodeRemoved(node_id));
        Some(node)
    }

    /// Get a node by ID.
    ///
    /// Returns `None` for a node whose computation is currently running.
    pub fn node(&self, node_id: NodeId) -> Option<Ref<'_, Box<dyn Node>>> {
        self.nodes.get(&node_id)?.try_borrow().ok()
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut dyn Node> {
        let node: &mut dyn Node = self.nodes.get_mut(&node_id)?.get_mut().as_mut();
        Some(node)
    }

    pub(crate) fn borrow_node_mut(&self, node_id: NodeId) -> Option<RefMut<'_, Box<dyn Node>>> {
        self.nodes.get(&node_id)?.try_borrow_mut().ok()
    }

    /// Get all nodes that are not currently being evaluated
    pub fn nodes(&self) -> impl Iterator<Item = Ref<'_, Box<dyn Node>>> {
        self.nodes.values().filter_map(|n| n.try_borrow().ok())
    }

    /// Whether a node with this ID exists
    pub fn contains_node(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Current value of a node's output port
    pub fn output_value(&self, node_id: NodeId, name: &str) -> Option<PortValue> {
        self.node(node_id)?.base().output_value(name).cloned()
    }

    /// Type of the port with this ID, if it exists
    pub fn port_type(&self, port_id: &PortId) -> Option<PortType> {
        self.node(port_id.node)?
            .base()
            .port(port_id)
            .map(|p| p.port_type)
    }

    /// Look up a port by ID
    pub fn find_port<'a>(&'a self, port_id: &PortId) -> Option<Ref<'a, Port>> {
        let node = self.node(port_id.node)?;
        Ref::filter_map(node, |node| node.base().port(port_id)).ok()
    }

    /// Connect two ports, returning `None` if the connection is rejected.
    ///
    /// Unless `keep_existing` is set, any edge already ending at `target`
    /// is removed first so an input keeps a single source. Rejections are
    /// logged; see [`Graph::try_connect`] for the reason.
    pub fn connect(
        &mut self,
        source: &PortId,
        target: &PortId,
        keep_existing: bool,
    ) -> Option<EdgeId> {
        match self.try_connect(source, target, keep_existing) {
            Ok(id) => Some(id),
            Err(err @ ConnectionError::Duplicate(_)) => {
                tracing::debug!("{err}");
                None
            }
            Err(err) => {
                tracing::warn!(%source, %target, "Connection rejected: {err}");
                None
            }
        }
    }

    /// Connect two ports, reporting why a connection was rejected
    pub fn try_connect(
        &mut self,
        source: &PortId,
        target: &PortId,
        keep_existing: bool,
    ) -> Result<EdgeId, ConnectionError> {
        let id = EdgeId::new(source.clone(), target.clone());
        if self.edges.contains_key(&id) {
            return Err(ConnectionError::Duplicate(id));
        }

        let edge = {
            let source_node = self
                .nodes
                .get(&source.node)
                .ok_or(ConnectionError::NodeNotFound(source.node))?
                .borrow();
            let target_node = self
                .nodes
                .get(&target.node)
                .ok_or(ConnectionError::NodeNotFound(target.node))?
                .borrow();
            let source_port = source_node
                .base()
                .port(source)
                .ok_or_else(|| ConnectionError::PortNotFound(source.clone()))?;
            let target_port = target_node
                .base()
                .port(target)
                .ok_or_else(|| ConnectionError::PortNotFound(target.clone()))?;
            Edge::new(source_port, target_port)?
        };

        if target.direction == PortDirection::Input && !keep_existing {
            let existing: Vec<EdgeId> = self
                .edges
                .keys()
                .filter(|e| e.target == *target)
                .cloned()
                .collect();
            for edge_id in &existing {
                self.remove_edge(edge_id);
            }
        }

        if let Some(port) = self.port_mut(source) {
            port.attach(id.clone());
        }
        if let Some(node) = self.node_mut(target.node) {
            if let Some(port) = node.base_mut().port_mut(target) {
                port.attach(id.clone());
            }
            node.mark_dirty();
        }
        self.edges.insert(id.clone(), edge);

        tracing::debug!(edge = %id, "Edge added");
        self.notify(GraphChange::EdgeAdded(id.clone()));
        Ok(id)
    }

    fn port_mut(&mut self, port_id: &PortId) -> Option<&mut Port> {
        self.nodes
            .get_mut(&port_id.node)?
            .get_mut()
            .base_mut()
            .port_mut(port_id)
    }

    /// Remove an edge, marking its target node dirty
    pub fn remove_edge(&mut self, edge_id: &EdgeId) -> Option<Edge> {
        let edge = self.edges.shift_remove(edge_id)?;

        if let Some(port) = self.port_mut(edge.source()) {
            port.detach(edge_id);
        }
        if let Some(node) = self.node_mut(edge.target_node()) {
            if let Some(port) = node.base_mut().port_mut(edge.target()) {
                port.detach(edge_id);
            }
            node.mark_dirty();
        }

        tracing::debug!(edge = %edge_id, "Edge removed");
        self.notify(GraphChange::EdgeRemoved(edge_id.clone()));
        Some(edge)
    }

    /// Get an edge by ID
    pub fn edge(&self, edge_id: &EdgeId) -> Option<&Edge> {
        self.edges.get(edge_id)
    }

    /// Get all edges in creation order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The first edge ending at an input port
    pub fn edge_to_port(&self, port_id: &PortId) -> Option<&Edge> {
        self.edges.values().find(|e| e.target() == port_id)
    }

    /// All edges ending at an input port, in creation order
    pub fn edges_to_port<'a>(&'a self, port_id: &'a PortId) -> impl Iterator<Item = &'a Edge> {
        self.edges.values().filter(move |e| e.target() == port_id)
    }

    /// All edges leaving an output port
    pub fn edges_from_port<'a>(&'a self, port_id: &'a PortId) -> impl Iterator<Item = &'a Edge> {
        self.edges.values().filter(move |e| e.source() == port_id)
    }

    /// Get edges involving a node
    pub fn edges_for_node(&self, node_id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.values().filter(move |e| e.involves_node(node_id))
    }

    /// Nodes fed by this node's outputs (may repeat)
    pub fn successors(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.edges
            .values()
            .filter(move |e| e.source_node() == node_id)
            .map(Edge::target_node)
    }

    /// Copy a value across an edge; see [`Edge::propagate`]
    pub fn propagate(&self, edge_id: &EdgeId) -> bool {
        self.edges
            .get(edge_id)
            .is_some_and(|edge| edge.propagate(self))
    }

    /// Get nodes in topological order (for evaluation).
    ///
    /// Kahn's algorithm, seeded in node insertion order so the result is
    /// deterministic.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, CycleError> {
        let mut in_degree: IndexMap<NodeId, usize> =
            self.nodes.keys().map(|id| (*id, 0)).collect();
        let mut successors: IndexMap<NodeId, Vec<NodeId>> = IndexMap::new();

        for edge in self.edges.values() {
            if let Some(degree) = in_degree.get_mut(&edge.target_node()) {
                *degree += 1;
            }
            successors
                .entry(edge.source_node())
                .or_default()
                .push(edge.target_node());
        }

        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node_id) = queue.pop_front() {
            order.push(node_id);
            for next in successors.get(&node_id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let unresolved = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id)
                .collect();
            return Err(CycleError { unresolved });
        }
        Ok(order)
    }

    /// Subscribe to graph changes
    pub fn on_change(&mut self, listener: impl FnMut(&GraphChange) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a subscriber; returns `false` if it was not registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Notify subscribers of a change that did not alter the structure
    pub fn trigger_change(&mut self) {
        self.notify(GraphChange::Touched);
    }

    fn notify(&mut self, change: GraphChange) {
        for (_, listener) in &mut self.listeners {
            listener(&change);
        }
    }

    /// Dispose and remove every node and edge
    pub fn clear(&mut self) {
        for cell in self.nodes.values_mut() {
            cell.get_mut().dispose();
        }
        self.nodes.clear();
        self.edges.clear();
        tracing::debug!(graph = %self.name, "Graph cleared");
        self.notify(GraphChange::Cleared);
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Error when creating a connection
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(PortId),

    /// The same source and target are already linked
    #[error("Edge already exists: {0}")]
    Duplicate(EdgeId),

    /// Incompatible port types
    #[error("Incompatible port types: {from:?} -> {to:?}")]
    Incompatible {
        /// Source port type
        from: PortType,
        /// Target port type
        to: PortType,
    },

    /// Edge must run from an output to an input
    #[error("Edge must run from an output to an input: {from} -> {to}")]
    Direction {
        /// Source port
        from: PortId,
        /// Target port
        to: PortId,
    },
}

/// Error when graph contains a cycle
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Graph contains a cycle ({} node(s) unresolved)", .unresolved.len())]
pub struct CycleError {
    /// Nodes that could not be ordered
    pub unresolved: Vec<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvaluationContext, EvaluationError};
    use crate::node::NodeBase;
    use crate::port::PortSchema;
    use std::rc::Rc;

    type HookLog = Rc<RefCell<Vec<(&'static str, NodeId)>>>;

    struct Tracked {
        base: NodeBase,
        hooks: HookLog,
    }

    impl Node for Tracked {
        fn base(&self) -> &NodeBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut NodeBase {
            &mut self.base
        }

        fn evaluate(&mut self, _ctx: &mut EvaluationContext<'_>) -> Result<(), EvaluationError> {
            Ok(())
        }

        fn init(&mut self) {
            self.hooks.borrow_mut().push(("init", self.base.id));
        }

        fn dispose(&mut self) {
            self.hooks.borrow_mut().push(("dispose", self.base.id));
        }
    }

    fn tracked(id: NodeId, hooks: &HookLog) -> Box<dyn Node> {
        let mut base = NodeBase::new(id, "tracked", "Tracked");
        base.add_input(PortSchema::new("in", PortType::Number));
        base.add_input(PortSchema::new("flag", PortType::Boolean));
        base.add_input(PortSchema::new("target", PortType::Object));
        base.add_output(PortSchema::new("out", PortType::Number));
        base.add_output(PortSchema::new("camera", PortType::Camera));
        Box::new(Tracked {
            base,
            hooks: Rc::clone(hooks),
        })
    }

    fn graph_with(count: usize) -> (Graph, Vec<NodeId>, HookLog) {
        let hooks = Rc::new(RefCell::new(Vec::new()));
        let mut graph = Graph::new("Test");
        let ids = (0..count).map(|_| graph.add_node(tracked(NodeId::new(), &hooks))).collect();
        (graph, ids, hooks)
    }

    fn out(node: NodeId) -> PortId {
        PortId::output(node, "out")
    }

    fn input(node: NodeId) -> PortId {
        PortId::input(node, "in")
    }

    #[test]
    fn test_connect_replaces_single_input() {
        let (mut graph, ids, _) = graph_with(3);
        let first = graph.connect(&out(ids[0]), &input(ids[2]), false).unwrap();
        let second = graph.connect(&out(ids[1]), &input(ids[2]), false).unwrap();

        assert_eq!(graph.edge_count(), 1);
        assert!(graph.edge(&first).is_none());
        assert!(graph.edge(&second).is_some());
        let target = graph.node(ids[2]).unwrap();
        assert_eq!(target.base().input("in").unwrap().connections(), &[second]);
        drop(target);
        let source = graph.node(ids[0]).unwrap();
        assert!(!source.base().output("out").unwrap().is_connected());
    }

    #[test]
    fn test_keep_existing_allows_multiple_sources() {
        let (mut graph, ids, _) = graph_with(3);
        let a = graph.connect(&out(ids[0]), &input(ids[2]), true).unwrap();
        let b = graph.connect(&out(ids[1]), &input(ids[2]), true).unwrap();

        assert_eq!(graph.edges_to_port(&input(ids[2])).count(), 2);
        assert_eq!(graph.find_port(&input(ids[2])).unwrap().connections().len(), 2);
        assert!(graph.find_port(&PortId::input(ids[2], "missing")).is_none());
        assert_eq!(graph.edge_to_port(&input(ids[2])).unwrap().id(), &a);
        let target = graph.node(ids[2]).unwrap();
        assert_eq!(target.base().input("in").unwrap().connections(), &[a, b]);
    }

    #[test]
    fn test_rejected_connections_leave_graph_unchanged() {
        let (mut graph, ids, _) = graph_with(2);
        let existing = graph.connect(&out(ids[0]), &input(ids[1]), false).unwrap();

        assert_eq!(
            graph.try_connect(&out(ids[0]), &PortId::input(ids[1], "flag"), false),
            Err(ConnectionError::Incompatible {
                from: PortType::Number,
                to: PortType::Boolean,
            })
        );
        assert!(matches!(
            graph.try_connect(&input(ids[0]), &input(ids[1]), false),
            Err(ConnectionError::Direction { .. })
        ));
        assert!(matches!(
            graph.try_connect(&PortId::output(ids[0], "nope"), &input(ids[1]), false),
            Err(ConnectionError::PortNotFound(_))
        ));
        let stranger = NodeId::new();
        assert_eq!(
            graph.try_connect(&out(stranger), &input(ids[1]), false),
            Err(ConnectionError::NodeNotFound(stranger))
        );
        assert_eq!(
            graph.try_connect(&out(ids[0]), &input(ids[1]), false),
            Err(ConnectionError::Duplicate(existing.clone()))
        );

        assert_eq!(graph.edge_count(), 1);
        assert!(graph.edge(&existing).is_some());
    }

    #[test]
    fn test_rejected_replacement_keeps_existing_input_edge() {
        let (mut graph, ids, _) = graph_with(3);
        let existing = graph.connect(&out(ids[0]), &input(ids[2]), false).unwrap();

        // Camera output cannot feed a Number input; the occupied input is not cleared
        let rejected = graph.connect(&PortId::output(ids[1], "camera"), &input(ids[2]), false);
        assert!(rejected.is_none());
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge_to_port(&input(ids[2])).unwrap().id(), &existing);
        let target = graph.node(ids[2]).unwrap();
        assert_eq!(target.base().input("in").unwrap().connections(), &[existing]);
    }

    #[test]
    fn test_output_fans_out_to_many_inputs() {
        let (mut graph, ids, _) = graph_with(3);
        let to_first = graph.connect(&out(ids[0]), &input(ids[1]), false).unwrap();
        let to_second = graph.connect(&out(ids[0]), &input(ids[2]), false).unwrap();

        let source_port = out(ids[0]);
        let outgoing: Vec<&EdgeId> = graph.edges_from_port(&source_port).map(Edge::id).collect();
        assert_eq!(outgoing, vec![&to_first, &to_second]);
        assert_eq!(graph.edges_from_port(&out(ids[1])).count(), 0);
        assert_eq!(graph.successors(ids[0]).collect::<Vec<_>>(), vec![ids[1], ids[2]]);
        let source = graph.node(ids[0]).unwrap();
        assert_eq!(source.base().output("out").unwrap().connections().len(), 2);
    }

    #[test]
    fn test_object_family_connects() {
        let (mut graph, ids, _) = graph_with(2);
        let edge = graph.connect(
            &PortId::output(ids[0], "camera"),
            &PortId::input(ids[1], "target"),
            false,
        );
        assert!(edge.is_some());
    }

    #[test]
    fn test_connect_marks_target_dirty() {
        let (mut graph, ids, _) = graph_with(2);
        graph.node_mut(ids[1]).unwrap().base_mut().mark_clean();
        let edge = graph.connect(&out(ids[0]), &input(ids[1]), false).unwrap();
        assert!(graph.node(ids[1]).unwrap().is_dirty());

        graph.node_mut(ids[1]).unwrap().base_mut().mark_clean();
        graph.remove_edge(&edge);
        assert!(graph.node(ids[1]).unwrap().is_dirty());
    }

    #[test]
    fn test_remove_node_cascades_edges() {
        let (mut graph, ids, hooks) = graph_with(3);
        graph.connect(&out(ids[0]), &input(ids[1]), false).unwrap();
        graph.connect(&out(ids[1]), &input(ids[2]), false).unwrap();

        let removed = graph.remove_node(ids[1]);
        assert!(removed.is_some());
        assert!(!graph.contains_node(ids[1]));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(hooks.borrow().last(), Some(&("dispose", ids[1])));
        assert!(!graph
            .node(ids[0])
            .unwrap()
            .base()
            .output("out")
            .unwrap()
            .is_connected());
        assert!(graph.remove_node(ids[1]).is_none());
    }

    #[test]
    fn test_topological_order_and_cycle() {
        let (mut graph, ids, _) = graph_with(3);
        graph.connect(&out(ids[2]), &input(ids[1]), false).unwrap();
        graph.connect(&out(ids[1]), &input(ids[0]), false).unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec![ids[2], ids[1], ids[0]]);

        graph.connect(&out(ids[0]), &input(ids[2]), false).unwrap();
        let err = graph.topological_order().unwrap_err();
        assert_eq!(err.unresolved.len(), 3);
    }

    #[test]
    fn test_listeners_receive_changes() {
        let (mut graph, ids, _) = graph_with(2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = graph.on_change(move |change| sink.borrow_mut().push(change.clone()));

        let edge = graph.connect(&out(ids[0]), &input(ids[1]), false).unwrap();
        graph.trigger_change();
        graph.remove_node(ids[0]);

        assert_eq!(
            *seen.borrow(),
            vec![
                GraphChange::EdgeAdded(edge.clone()),
                GraphChange::Touched,
                GraphChange::EdgeRemoved(edge),
                GraphChange::NodeRemoved(ids[0]),
            ]
        );

        assert!(graph.unsubscribe(sub));
        assert!(!graph.unsubscribe(sub));
        graph.trigger_change();
        assert_eq!(seen.borrow().len(), 4);
    }

    #[test]
    fn test_clear_disposes_everything() {
        let (mut graph, ids, hooks) = graph_with(2);
        graph.connect(&out(ids[0]), &input(ids[1]), false).unwrap();
        graph.clear();

        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(hooks.borrow().iter().filter(|(hook, _)| *hook == "dispose").count(), 2);
    }

    #[test]
    fn test_duplicate_id_replaces_node() {
        let (mut graph, ids, hooks) = graph_with(1);
        graph.add_node(tracked(ids[0], &hooks));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(
            *hooks.borrow(),
            vec![("init", ids[0]), ("dispose", ids[0]), ("init", ids[0])]
        );
    }
}
