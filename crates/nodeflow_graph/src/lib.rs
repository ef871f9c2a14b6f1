// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dataflow graph engine for `NodeFlow`.
//!
//! Nodes expose typed input and output ports, edges carry values from an
//! output to one or more inputs, and the evaluator recomputes dirty nodes in
//! dependency order.
//!
//! ## Architecture
//!
//! - [`port`]: port types, values and per-edge delivery
//! - [`edge`]: type-checked links and value propagation
//! - [`node`]: the [`Node`] trait, shared node state, properties and array broadcasting
//! - [`graph`]: ownership of nodes and edges, topological ordering, change notification
//! - [`evaluator`]: incremental evaluation passes
//! - [`document`]: JSON/RON persistence
//! - [`config`]: evaluator settings

pub mod config;
pub mod document;
pub mod edge;
pub mod evaluator;
pub mod graph;
pub mod node;
pub mod port;

pub use config::{EvaluatorConfig, FailurePolicy};
pub use document::{GraphDocument, LoadReport};
pub use edge::{Edge, EdgeId};
pub use evaluator::{EvaluationContext, EvaluationError, EvaluationReport, Evaluator, Resources};
pub use graph::{ConnectionError, Graph, GraphChange};
pub use node::{process_arrays, Node, NodeBase, NodeFactory, NodeId, NodeProperty, NodeRegistry, NodeType};
pub use port::{PortDirection, PortId, PortSchema, PortType, PortValue};
