// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph evaluation and execution.
//!
//! # Algorithm
//!
//! 1. Order every node topologically (Kahn's algorithm).
//! 2. If the order is short, the graph has a cycle: abort the whole pass
//!    without touching any dirty flag or cached output.
//! 3. Walk the order; for each dirty node, pull every incoming edge's value
//!    into its input ports, run its computation and mark it clean on success.
//!    A failing node is logged and the pass continues.
//! 4. Clean nodes are skipped entirely.

use crate::config::{EvaluatorConfig, FailurePolicy};
use crate::edge::EdgeId;
use crate::graph::Graph;
use crate::node::{NodeError, NodeId};
use crate::port::PortType;
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};

/// Consumer-defined values shared with every node computation
#[derive(Default)]
pub struct Resources {
    values: HashMap<String, Box<dyn Any>>,
}

impl Resources {
    /// Create an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the previous one under the same key
    pub fn insert<T: Any>(&mut self, key: impl Into<String>, value: T) -> Option<Box<dyn Any>> {
        self.values.insert(key.into(), Box::new(value))
    }

    /// Borrow a value if present with type `T`
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key)?.downcast_ref()
    }

    /// Mutably borrow a value if present with type `T`
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key)?.downcast_mut()
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<Box<dyn Any>> {
        self.values.remove(key)
    }

    /// Whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

/// Context handed to every node computation
pub struct EvaluationContext<'a> {
    graph: Option<&'a Graph>,
    resources: &'a mut Resources,
}

impl<'a> EvaluationContext<'a> {
    /// Context for a pass over `graph`
    pub fn new(graph: &'a Graph, resources: &'a mut Resources) -> Self {
        Self {
            graph: Some(graph),
            resources,
        }
    }

    /// Context with no owning graph
    pub fn detached(resources: &'a mut Resources) -> Self {
        Self {
            graph: None,
            resources,
        }
    }

    /// The graph being evaluated.
    ///
    /// The node currently running is not reachable through it.
    pub fn graph(&self) -> Option<&'a Graph> {
        self.graph
    }

    /// Borrow a shared value
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.resources.get(key)
    }

    /// Mutably borrow a shared value
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.resources.get_mut(key)
    }

    /// Store a shared value
    pub fn insert<T: Any>(&mut self, key: impl Into<String>, value: T) -> Option<Box<dyn Any>> {
        self.resources.insert(key, value)
    }

    /// Remove a shared value
    pub fn remove(&mut self, key: &str) -> Option<Box<dyn Any>> {
        self.resources.remove(key)
    }
}

/// How a pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// Every node was visited
    Completed,
    /// The graph has a cycle; nothing was evaluated
    CycleDetected {
        /// Nodes that could not be ordered
        unresolved: Vec<NodeId>,
    },
}

/// A node computation that returned an error
#[derive(Debug)]
pub struct NodeFailure {
    /// Failing node
    pub node: NodeId,
    /// Its type tag
    pub node_type: String,
    /// What went wrong
    pub error: EvaluationError,
}

/// Summary of one evaluation pass
#[derive(Debug)]
pub struct EvaluationReport {
    /// How the pass ended
    pub outcome: EvaluationOutcome,
    /// Topological order used (empty on cycle)
    pub order: Vec<NodeId>,
    /// Nodes whose computation ran successfully, in order
    pub evaluated: Vec<NodeId>,
    /// Nodes skipped because they were clean
    pub skipped: Vec<NodeId>,
    /// Nodes whose computation failed
    pub failures: Vec<NodeFailure>,
}

impl EvaluationReport {
    fn new(outcome: EvaluationOutcome, order: Vec<NodeId>) -> Self {
        Self {
            outcome,
            order,
            evaluated: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Whether the pass was aborted on a cycle
    pub fn has_cycle(&self) -> bool {
        matches!(self.outcome, EvaluationOutcome::CycleDetected { .. })
    }

    /// Whether the pass completed without node failures
    pub fn is_success(&self) -> bool {
        !self.has_cycle() && self.failures.is_empty()
    }
}

/// Orders and runs node computations
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    /// Create an evaluator
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Run every dirty node once, upstream before downstream.
    ///
    /// Never panics or fails: cycles and node errors are logged and
    /// recorded in the returned report.
    pub fn evaluate(&self, graph: &Graph, resources: &mut Resources) -> EvaluationReport {
        let order = match graph.topological_order() {
            Ok(order) => order,
            Err(err) => {
                tracing::warn!(graph = %graph.name, "Evaluation aborted: {err}");
                return EvaluationReport::new(
                    EvaluationOutcome::CycleDetected {
                        unresolved: err.unresolved,
                    },
                    Vec::new(),
                );
            }
        };

        let mut report = EvaluationReport::new(EvaluationOutcome::Completed, order.clone());
        let mut ctx = EvaluationContext::new(graph, resources);

        for node_id in order {
            let incoming: Vec<EdgeId> = {
                let Some(node) = graph.node(node_id) else {
                    continue;
                };
                if !node.is_dirty() {
                    report.skipped.push(node_id);
                    continue;
                }
                let edges = node
                    .base()
                    .inputs()
                    .flat_map(|port| port.connections().iter().cloned())
                    .collect();
                edges
            };

            for edge_id in &incoming {
                graph.propagate(edge_id);
            }

            let Some(mut node) = graph.borrow_node_mut(node_id) else {
                continue;
            };
            match node.evaluate(&mut ctx) {
                Ok(()) => {
                    node.base_mut().mark_clean();
                    tracing::debug!(node = %node_id, node_type = node.node_type(), "Node evaluated");
                    report.evaluated.push(node_id);
                }
                Err(error) => {
                    tracing::error!(
                        node = %node_id,
                        node_type = node.node_type(),
                        "Node evaluation failed: {error}"
                    );
                    if self.config.failure_policy == FailurePolicy::MarkClean {
                        node.base_mut().mark_clean();
                    }
                    report.failures.push(NodeFailure {
                        node: node_id,
                        node_type: node.node_type().to_string(),
                        error,
                    });
                }
            }
        }

        tracing::debug!(
            graph = %graph.name,
            evaluated = report.evaluated.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "Evaluation pass finished"
        );
        report
    }

    /// Mark a node and everything reachable downstream of it dirty.
    ///
    /// Breadth-first; each node is visited once, so cycles terminate.
    /// Returns the nodes marked, in visit order.
    pub fn mark_downstream_dirty(&self, graph: &mut Graph, node_id: NodeId) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([node_id]);
        let mut marked = Vec::new();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = graph.node_mut(id) else {
                continue;
            };
            node.mark_dirty();
            marked.push(id);
            queue.extend(graph.successors(id).filter(|next| !visited.contains(next)));
        }

        marked
    }
}

/// Error during evaluation
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// Missing required input
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// Input held a value of the wrong type
    #[error("Type mismatch on {port}: expected {expected:?}")]
    TypeMismatch {
        /// Port name
        port: String,
        /// Expected type
        expected: PortType,
    },

    /// Port or property access failed
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Custom error
    #[error("{0}")]
    Custom(String),
}
