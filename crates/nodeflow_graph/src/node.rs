// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph framework.
//!
//! Concrete node kinds implement [`Node`]: they own a [`NodeBase`] carrying
//! ports, properties, the dirty flag and the output cache, and provide a
//! single `evaluate` computation.

use crate::evaluator::{EvaluationContext, EvaluationError};
use crate::port::{Port, PortDirection, PortId, PortSchema, PortType, PortValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Position in the editor canvas
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: f32,
    /// Vertical coordinate
    pub y: f32,
}

impl Position {
    /// Create a position
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Errors raised by node port and property access
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeError {
    /// No input port with this name
    #[error("Unknown input port: {0}")]
    UnknownInput(String),

    /// No output port with this name
    #[error("Unknown output port: {0}")]
    UnknownOutput(String),

    /// No property with this name
    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    /// Value has the wrong type for the property
    #[error("Property {name} expects a {expected} value")]
    PropertyType {
        /// Property name
        name: String,
        /// Expected kind
        expected: &'static str,
    },

    /// Value is not one of the property's options
    #[error("Property {name} has no option {value:?}")]
    UnknownOption {
        /// Property name
        name: String,
        /// Rejected value
        value: String,
    },
}

/// Shape of a property's value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    /// Numeric value with optional range and step
    Number {
        /// Lower bound
        min: Option<f64>,
        /// Upper bound
        max: Option<f64>,
        /// UI step
        step: Option<f64>,
    },
    /// Boolean toggle
    Boolean,
    /// Free text
    Text,
    /// RGBA color
    Color,
    /// One of a fixed list of options
    Choice(Vec<String>),
}

/// Typed configuration value on a node, distinct from its ports
#[derive(Debug, Clone, PartialEq)]
pub struct NodeProperty {
    /// Property name
    pub name: String,
    /// Display label
    pub label: String,
    /// Value shape
    pub kind: PropertyKind,
    /// Current value
    pub value: PortValue,
}

impl NodeProperty {
    fn new(name: impl Into<String>, kind: PropertyKind, value: PortValue) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            kind,
            value,
        }
    }

    /// Numeric property
    pub fn number(name: impl Into<String>, value: f64) -> Self {
        let kind = PropertyKind::Number {
            min: None,
            max: None,
            step: None,
        };
        Self::new(name, kind, PortValue::Number(value))
    }

    /// Boolean property
    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::new(name, PropertyKind::Boolean, PortValue::Bool(value))
    }

    /// Text property
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Text, PortValue::Text(value.into()))
    }

    /// Color property
    pub fn color(name: impl Into<String>, value: [f32; 4]) -> Self {
        Self::new(name, PropertyKind::Color, PortValue::Color(value))
    }

    /// Enumerated property; `selected` should be one of `options`
    pub fn choice<S: Into<String>>(
        name: impl Into<String>,
        options: impl IntoIterator<Item = S>,
        selected: impl Into<String>,
    ) -> Self {
        let options = options.into_iter().map(Into::into).collect();
        Self::new(
            name,
            PropertyKind::Choice(options),
            PortValue::Text(selected.into()),
        )
    }

    /// Set the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Constrain a numeric property
    pub fn with_range(mut self, lo: f64, hi: f64, step: Option<f64>) -> Self {
        if let PropertyKind::Number { min, max, step: s } = &mut self.kind {
            *min = Some(lo);
            *max = Some(hi);
            *s = step;
        }
        self
    }

    /// Validate `value` against this property's kind, clamping numbers to range
    fn coerce(&self, value: PortValue) -> Result<PortValue, NodeError> {
        let value = match self.kind {
            PropertyKind::Color => value.conform(PortType::Color),
            _ => value,
        };
        let mismatch = |expected| NodeError::PropertyType {
            name: self.name.clone(),
            expected,
        };
        match (&self.kind, value) {
            (PropertyKind::Number { min, max, .. }, PortValue::Number(mut n)) => {
                if let Some(lo) = min {
                    n = n.max(*lo);
                }
                if let Some(hi) = max {
                    n = n.min(*hi);
                }
                Ok(PortValue::Number(n))
            }
            (PropertyKind::Number { .. }, _) => Err(mismatch("number")),
            (PropertyKind::Boolean, v @ PortValue::Bool(_)) => Ok(v),
            (PropertyKind::Boolean, _) => Err(mismatch("boolean")),
            (PropertyKind::Text, v @ PortValue::Text(_)) => Ok(v),
            (PropertyKind::Text, _) => Err(mismatch("text")),
            (PropertyKind::Color, v @ PortValue::Color(_)) => Ok(v),
            (PropertyKind::Color, _) => Err(mismatch("color")),
            (PropertyKind::Choice(options), PortValue::Text(s)) => {
                if options.iter().any(|o| *o == s) {
                    Ok(PortValue::Text(s))
                } else {
                    Err(NodeError::UnknownOption {
                        name: self.name.clone(),
                        value: s,
                    })
                }
            }
            (PropertyKind::Choice(_), _) => Err(mismatch("text")),
        }
    }
}

/// State shared by every node kind
#[derive(Debug, Clone)]
pub struct NodeBase {
    /// Unique instance ID
    pub id: NodeId,
    node_type: String,
    /// Display label
    pub label: String,
    /// Position in the graph UI
    pub position: Position,
    /// Width override set by the user
    pub custom_width: Option<f32>,
    /// Height override set by the user
    pub custom_height: Option<f32>,
    inputs: IndexMap<String, Port>,
    outputs: IndexMap<String, Port>,
    properties: IndexMap<String, NodeProperty>,
    dirty: bool,
    output_cache: HashMap<String, PortValue>,
}

impl NodeBase {
    /// Create an empty, dirty node of the given type
    pub fn new(id: NodeId, node_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id,
            node_type: node_type.into(),
            label: label.into(),
            position: Position::default(),
            custom_width: None,
            custom_height: None,
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            properties: IndexMap::new(),
            dirty: true,
            output_cache: HashMap::new(),
        }
    }

    /// Type tag used for serialization and factory lookup
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// Register an input port
    pub fn add_input(&mut self, schema: PortSchema) -> PortId {
        let port = Port::new(self.id, PortDirection::Input, schema);
        let id = port.id.clone();
        self.inputs.insert(id.name.clone(), port);
        id
    }

    /// Register an output port
    pub fn add_output(&mut self, schema: PortSchema) -> PortId {
        let port = Port::new(self.id, PortDirection::Output, schema);
        let id = port.id.clone();
        self.outputs.insert(id.name.clone(), port);
        id
    }

    /// Get an input port by name
    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.get(name)
    }

    /// Get a mutable input port by name
    pub fn input_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.inputs.get_mut(name)
    }

    /// Get an output port by name
    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.get(name)
    }

    /// Get a mutable output port by name
    pub fn output_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.outputs.get_mut(name)
    }

    /// Input ports in declaration order
    pub fn inputs(&self) -> impl Iterator<Item = &Port> {
        self.inputs.values()
    }

    /// Output ports in declaration order
    pub fn outputs(&self) -> impl Iterator<Item = &Port> {
        self.outputs.values()
    }

    /// Get a port by ID
    pub fn port(&self, port_id: &PortId) -> Option<&Port> {
        if port_id.node != self.id {
            return None;
        }
        match port_id.direction {
            PortDirection::Input => self.input(&port_id.name),
            PortDirection::Output => self.output(&port_id.name),
        }
    }

    /// Get a mutable port by ID
    pub fn port_mut(&mut self, port_id: &PortId) -> Option<&mut Port> {
        if port_id.node != self.id {
            return None;
        }
        match port_id.direction {
            PortDirection::Input => self.input_mut(&port_id.name),
            PortDirection::Output => self.output_mut(&port_id.name),
        }
    }

    /// Register a property
    pub fn add_property(&mut self, property: NodeProperty) {
        self.properties.insert(property.name.clone(), property);
    }

    /// Current value of a property
    pub fn property(&self, name: &str) -> Option<&PortValue> {
        self.properties.get(name).map(|p| &p.value)
    }

    /// Properties in declaration order
    pub fn properties(&self) -> impl Iterator<Item = &NodeProperty> {
        self.properties.values()
    }

    /// Change a property and mark the node dirty
    pub fn set_property(&mut self, name: &str, value: PortValue) -> Result<(), NodeError> {
        let property = self
            .properties
            .get_mut(name)
            .ok_or_else(|| NodeError::UnknownProperty(name.to_string()))?;
        property.value = property.coerce(value)?;
        self.dirty = true;
        Ok(())
    }

    /// Current value of an input.
    ///
    /// On a port with several incoming edges this is the value delivered by
    /// the first edge in registration order.
    pub fn input_value(&self, name: &str) -> Option<&PortValue> {
        self.inputs.get(name).and_then(Port::first_value)
    }

    /// Every value delivered to an input, in edge registration order.
    ///
    /// An unconnected port yields its own value, if it has one.
    pub fn input_values(&self, name: &str) -> Vec<Option<&PortValue>> {
        self.inputs
            .get(name)
            .map(Port::delivered_values)
            .unwrap_or_default()
    }

    /// Assign an input value directly (e.g. from a UI control) and mark dirty
    pub fn set_input(&mut self, name: &str, value: PortValue) -> Result<(), NodeError> {
        let port = self
            .inputs
            .get_mut(name)
            .ok_or_else(|| NodeError::UnknownInput(name.to_string()))?;
        port.value = Some(value);
        self.dirty = true;
        Ok(())
    }

    /// Replace an input's default, reset the port to it and mark dirty
    pub fn set_input_default(&mut self, name: &str, value: PortValue) -> Result<(), NodeError> {
        let port = self
            .inputs
            .get_mut(name)
            .ok_or_else(|| NodeError::UnknownInput(name.to_string()))?;
        port.default_value = Some(value);
        port.reset();
        self.dirty = true;
        Ok(())
    }

    /// Restore every input to its default
    pub fn reset_inputs(&mut self) {
        self.inputs.values_mut().for_each(Port::reset);
    }

    /// Write an output port and its cache entry
    pub fn set_output_value(&mut self, name: &str, value: PortValue) -> Result<(), NodeError> {
        let port = self
            .outputs
            .get_mut(name)
            .ok_or_else(|| NodeError::UnknownOutput(name.to_string()))?;
        port.value = Some(value.clone());
        self.output_cache.insert(name.to_string(), value);
        Ok(())
    }

    /// Current value of an output port
    pub fn output_value(&self, name: &str) -> Option<&PortValue> {
        self.outputs.get(name).and_then(|p| p.value.as_ref())
    }

    /// Flag the node for recomputation
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Flag the node as up to date
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Whether the node needs recomputation
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Store a computed output value
    pub fn cache_output(&mut self, name: impl Into<String>, value: PortValue) {
        self.output_cache.insert(name.into(), value);
    }

    /// Last computed value for an output
    pub fn cached_output(&self, name: &str) -> Option<&PortValue> {
        self.output_cache.get(name)
    }

    /// Drop every cached output
    pub fn clear_cache(&mut self) {
        self.output_cache.clear();
    }
}

/// A unit of computation in the graph
pub trait Node {
    /// Shared node state
    fn base(&self) -> &NodeBase;

    /// Mutable shared node state
    fn base_mut(&mut self) -> &mut NodeBase;

    /// Read inputs, write outputs.
    ///
    /// Must not change graph structure.
    fn evaluate(&mut self, ctx: &mut EvaluationContext<'_>) -> Result<(), EvaluationError>;

    /// Called once when the node is added to a graph
    fn init(&mut self) {}

    /// Called once when the node leaves the graph; release external resources here
    fn dispose(&mut self) {}

    /// Node ID
    fn id(&self) -> NodeId {
        self.base().id
    }

    /// Node type tag
    fn node_type(&self) -> &str {
        self.base().node_type()
    }

    /// Whether the node needs recomputation
    fn is_dirty(&self) -> bool {
        self.base().is_dirty()
    }

    /// Flag the node for recomputation
    fn mark_dirty(&mut self) {
        self.base_mut().mark_dirty();
    }
}

impl fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id())
            .field("type", &self.node_type())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// One broadcast row: the value each named input contributes at an index
#[derive(Debug)]
pub struct ArrayRow<'a, V> {
    entries: Vec<(&'a str, Option<&'a V>)>,
}

impl<'a, V> ArrayRow<'a, V> {
    /// Value of the named input at this index; `None` for empty or unknown inputs
    pub fn get(&self, name: &str) -> Option<&'a V> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, v)| *v)
    }
}

/// Combine arrays of unequal length element-wise.
///
/// Produces `max(lengths, 1)` entries. Shorter arrays are reused cyclically
/// (`array[i % len]`) and an empty array contributes nothing at any index.
pub fn process_arrays<'a, V, T>(
    inputs: &[(&'a str, &'a [V])],
    mut per_index: impl FnMut(&ArrayRow<'a, V>, usize) -> T,
) -> Vec<T> {
    let count = inputs
        .iter()
        .map(|(_, values)| values.len())
        .max()
        .unwrap_or(0)
        .max(1);

    (0..count)
        .map(|index| {
            let row = ArrayRow {
                entries: inputs
                    .iter()
                    .map(|(name, values)| {
                        let value = if values.is_empty() {
                            None
                        } else {
                            values.get(index % values.len())
                        };
                        (*name, value)
                    })
                    .collect(),
            };
            per_index(&row, index)
        })
        .collect()
}

/// Creates nodes by type tag, e.g. while loading a document
pub trait NodeFactory {
    /// Instantiate a node of `node_type` with the given id, or `None` if unknown
    fn create_node(&self, node_type: &str, id: NodeId) -> Option<Box<dyn Node>>;
}

impl<F> NodeFactory for F
where
    F: Fn(&str, NodeId) -> Option<Box<dyn Node>>,
{
    fn create_node(&self, node_type: &str, id: NodeId) -> Option<Box<dyn Node>> {
        self(node_type, id)
    }
}

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Input nodes (constants, parameters)
    Input,
    /// Math operations
    Math,
}

/// Constructor for a registered node type
pub type NodeConstructor = fn(NodeId) -> Box<dyn Node>;

/// Node type definition
#[derive(Debug, Clone)]
pub struct NodeType {
    /// Unique type identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Builds a fresh instance
    pub constructor: NodeConstructor,
}

/// Registry of available node types
#[derive(Default)]
pub struct NodeRegistry {
    /// Registered node types by ID
    types: IndexMap<String, NodeType>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type
    pub fn register(&mut self, node_type: NodeType) {
        self.types.insert(node_type.id.clone(), node_type);
    }

    /// Get a node type by ID
    pub fn get(&self, id: &str) -> Option<&NodeType> {
        self.types.get(id)
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    /// Get types by category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeType> {
        self.types.values().filter(move |t| t.category == category)
    }
}

impl NodeFactory for NodeRegistry {
    fn create_node(&self, node_type: &str, id: NodeId) -> Option<Box<dyn Node>> {
        self.get(node_type).map(|t| (t.constructor)(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough {
        base: NodeBase,
    }

    impl Passthrough {
        fn new(id: NodeId) -> Box<dyn Node> {
            let mut base = NodeBase::new(id, "passthrough", "Passthrough");
            base.add_input(PortSchema::new("in", PortType::Any).with_default(1.0));
            base.add_output(PortSchema::new("out", PortType::Any));
            base.add_property(NodeProperty::number("gain", 1.0).with_range(0.0, 10.0, None));
            base.add_property(NodeProperty::choice("mode", ["add", "mul"], "add"));
            Box::new(Self { base })
        }
    }

    impl Node for Passthrough {
        fn base(&self) -> &NodeBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut NodeBase {
            &mut self.base
        }

        fn evaluate(&mut self, _ctx: &mut EvaluationContext<'_>) -> Result<(), EvaluationError> {
            let value = self.base.input_value("in").cloned();
            if let Some(value) = value {
                self.base.set_output_value("out", value)?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_new_node_is_dirty() {
        let node = Passthrough::new(NodeId::new());
        assert!(node.is_dirty());
        assert_eq!(node.node_type(), "passthrough");
        assert_eq!(node.base().input_value("in"), Some(&PortValue::Number(1.0)));
    }

    #[test]
    fn test_set_property_marks_dirty_and_validates() {
        let mut node = Passthrough::new(NodeId::new());
        node.base_mut().mark_clean();

        node.base_mut()
            .set_property("gain", PortValue::Number(42.0))
            .unwrap();
        assert!(node.is_dirty());
        assert_eq!(node.base().property("gain"), Some(&PortValue::Number(10.0)));

        assert_eq!(
            node.base_mut().set_property("mode", PortValue::from("div")),
            Err(NodeError::UnknownOption {
                name: "mode".to_string(),
                value: "div".to_string(),
            })
        );
        assert!(matches!(
            node.base_mut().set_property("gain", PortValue::Bool(true)),
            Err(NodeError::PropertyType { .. })
        ));
        assert!(matches!(
            node.base_mut().set_property("missing", PortValue::Number(0.0)),
            Err(NodeError::UnknownProperty(_))
        ));
    }

    #[test]
    fn test_color_property_accepts_number_list() {
        let mut base = NodeBase::new(NodeId::new(), "tint", "Tint");
        base.add_property(NodeProperty::color("tint", [1.0, 1.0, 1.0, 1.0]));

        let list = PortValue::List(vec![0.5.into(), 0.0.into(), 0.25.into(), 1.0.into()]);
        base.set_property("tint", list).unwrap();
        assert_eq!(
            base.property("tint"),
            Some(&PortValue::Color([0.5, 0.0, 0.25, 1.0]))
        );
        assert!(matches!(
            base.set_property("tint", PortValue::List(vec![0.5.into()])),
            Err(NodeError::PropertyType { .. })
        ));
    }

    #[test]
    fn test_output_value_updates_cache() {
        let mut node = Passthrough::new(NodeId::new());
        let base = node.base_mut();
        base.set_output_value("out", PortValue::Number(3.0)).unwrap();
        assert_eq!(base.output_value("out"), Some(&PortValue::Number(3.0)));
        assert_eq!(base.cached_output("out"), Some(&PortValue::Number(3.0)));

        base.cache_output("preview", PortValue::Number(1.0));
        assert_eq!(base.cached_output("preview"), Some(&PortValue::Number(1.0)));
        assert_eq!(base.output_value("preview"), None);

        base.clear_cache();
        assert_eq!(base.cached_output("out"), None);
        assert!(base.set_output_value("nope", PortValue::Number(0.0)).is_err());
    }

    #[test]
    fn test_input_default_and_reset() {
        let mut node = Passthrough::new(NodeId::new());
        let base = node.base_mut();
        base.set_input("in", PortValue::Number(9.0)).unwrap();
        base.reset_inputs();
        assert_eq!(base.input_value("in"), Some(&PortValue::Number(1.0)));

        base.set_input_default("in", PortValue::Number(4.0)).unwrap();
        assert_eq!(base.input_value("in"), Some(&PortValue::Number(4.0)));
        assert_eq!(base.input_values("in"), vec![Some(&PortValue::Number(4.0))]);
    }

    #[test]
    fn test_process_arrays_broadcasts_cyclically() {
        let x = [1.0, 2.0, 3.0];
        let y = [10.0, 20.0];
        let result = process_arrays(&[("x", &x[..]), ("y", &y[..])], |row, _| {
            row.get("x").unwrap() + row.get("y").unwrap()
        });
        assert_eq!(result, vec![11.0, 22.0, 13.0]);
    }

    #[test]
    fn test_process_arrays_empty_inputs() {
        let empty: [f64; 0] = [];
        let x = [5.0, 6.0];
        let rows = process_arrays(&[("x", &x[..]), ("e", &empty[..])], |row, i| {
            (i, row.get("x").copied(), row.get("e").copied())
        });
        assert_eq!(rows, vec![(0, Some(5.0), None), (1, Some(6.0), None)]);

        let single = process_arrays(&[("e", &empty[..])], |row, _| row.get("e").is_none());
        assert_eq!(single, vec![true]);
    }

    #[test]
    fn test_registry_creates_nodes() {
        let mut registry = NodeRegistry::new();
        registry.register(NodeType {
            id: "passthrough".to_string(),
            name: "Passthrough".to_string(),
            category: NodeCategory::Math,
            description: "Copies its input".to_string(),
            constructor: Passthrough::new,
        });

        let id = NodeId::new();
        let node = registry.create_node("passthrough", id).unwrap();
        assert_eq!(node.id(), id);
        assert!(registry.create_node("unknown", id).is_none());
        assert_eq!(registry.types_in_category(NodeCategory::Math).count(), 1);
    }
}
