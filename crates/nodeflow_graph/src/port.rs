// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.
//!
//! A port is a typed, named value slot owned by a node. Its identity is
//! derived from the owning node, its direction and its name, so it stays
//! stable across saves and reloads.

use crate::edge::EdgeId;
use crate::node::NodeId;
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

impl PortDirection {
    /// Short tag used in derived port ids
    pub fn tag(self) -> &'static str {
        match self {
            Self::Input => "in",
            Self::Output => "out",
        }
    }
}

/// Unique identifier for a port, derived from node id, direction and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId {
    /// Owning node
    pub node: NodeId,
    /// Port direction
    pub direction: PortDirection,
    /// Port name
    pub name: String,
}

impl PortId {
    /// Create a port id
    pub fn new(node: NodeId, direction: PortDirection, name: impl Into<String>) -> Self {
        Self {
            node,
            direction,
            name: name.into(),
        }
    }

    /// Id of the named input port on `node`
    pub fn input(node: NodeId, name: impl Into<String>) -> Self {
        Self::new(node, PortDirection::Input, name)
    }

    /// Id of the named output port on `node`
    pub fn output(node: NodeId, name: impl Into<String>) -> Self {
        Self::new(node, PortDirection::Output, name)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.node, self.direction.tag(), self.name)
    }
}

/// Data type that can flow through ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    /// Numeric value
    Number,
    /// Boolean value
    Boolean,
    /// Text value
    Text,
    /// 3D vector
    Vector3,
    /// Color (RGBA)
    Color,
    /// Matrix 4x4
    Matrix,
    /// Texture handle
    Texture,
    /// Geometry handle
    Geometry,
    /// Material handle
    Material,
    /// Generic 3D object
    Object,
    /// Scene
    Scene,
    /// Camera
    Camera,
    /// Light
    Light,
    /// 2D point
    Point2,
    /// Any type (for generic nodes)
    Any,
}

impl PortType {
    /// Types that share the generic 3D object hierarchy
    pub fn is_object_family(&self) -> bool {
        matches!(self, Self::Object | Self::Scene | Self::Camera | Self::Light)
    }

    /// Types whose values are opaque handles and never serialized
    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            Self::Texture
                | Self::Geometry
                | Self::Material
                | Self::Object
                | Self::Scene
                | Self::Camera
                | Self::Light
        )
    }

    /// Check if this type can connect to another type
    pub fn can_connect_to(&self, other: &PortType) -> bool {
        // Any type can connect to anything
        if matches!(self, Self::Any) || matches!(other, Self::Any) {
            return true;
        }

        // Same types can always connect
        if self == other {
            return true;
        }

        // Concrete objects upcast to Object, and Object downcasts to them
        (*self == Self::Object && other.is_object_family())
            || (*other == Self::Object && self.is_object_family())
    }
}

/// Shared handle to a value owned by an external collaborator
/// (textures, geometries, scene objects).
#[derive(Clone)]
pub struct ObjectRef {
    kind: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ObjectRef {
    /// Wrap a value in a shared handle
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            kind: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    /// Borrow the wrapped value if it has type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Whether two handles point at the same allocation
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef<{}>", self.kind)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Value that can be stored in a port.
///
/// Serialized untagged: numbers, booleans and strings as themselves, fixed
/// arrays and lists as sequences. Sequences always read back as `List`; see
/// [`PortValue::conform`].
#[derive(Debug, Clone, PartialEq)]
pub enum PortValue {
    /// Number
    Number(f64),
    /// Boolean
    Bool(bool),
    /// Text
    Text(String),
    /// 3D vector
    Vector3([f64; 3]),
    /// Color
    Color([f32; 4]),
    /// Column-major 4x4 matrix
    Matrix([f64; 16]),
    /// 2D point
    Point2([f64; 2]),
    /// Ordered list of values
    List(Vec<PortValue>),
    /// Opaque shared handle; cloning shares it
    Object(ObjectRef),
}

impl PortValue {
    /// Numeric payload, if any
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean payload, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Text payload, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// List payload, if any
    pub fn as_list(&self) -> Option<&[PortValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Reinterpret a number list as the fixed-size value `port_type` holds.
    ///
    /// Anything that does not fit (other types, wrong length, non-numeric
    /// items) is returned unchanged.
    pub fn conform(self, port_type: PortType) -> Self {
        let Self::List(items) = &self else {
            return self;
        };
        let Some(numbers) = items.iter().map(Self::as_number).collect::<Option<Vec<f64>>>() else {
            return self;
        };
        match port_type {
            PortType::Vector3 => numbers.try_into().map(Self::Vector3).unwrap_or(self),
            PortType::Point2 => numbers.try_into().map(Self::Point2).unwrap_or(self),
            PortType::Matrix => numbers.try_into().map(Self::Matrix).unwrap_or(self),
            PortType::Color => numbers
                .iter()
                .map(|n| *n as f32)
                .collect::<Vec<f32>>()
                .try_into()
                .map(Self::Color)
                .unwrap_or(self),
            _ => self,
        }
    }

    /// Whether this value can be written to a graph document
    pub fn is_serializable(&self) -> bool {
        match self {
            Self::Object(_) => false,
            Self::List(items) => items.iter().all(Self::is_serializable),
            _ => true,
        }
    }
}

impl Serialize for PortValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Vector3(v) => serializer.collect_seq(v),
            Self::Color(c) => serializer.collect_seq(c),
            Self::Matrix(m) => serializer.collect_seq(m),
            Self::Point2(p) => serializer.collect_seq(p),
            Self::List(items) => serializer.collect_seq(items),
            Self::Object(object) => Err(ser::Error::custom(format!(
                "{object:?} cannot be serialized"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for PortValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PortValueVisitor)
    }
}

struct PortValueVisitor;

impl<'de> de::Visitor<'de> for PortValueVisitor {
    type Value = PortValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number, boolean, string or list")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<PortValue, E> {
        Ok(PortValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<PortValue, E> {
        Ok(PortValue::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<PortValue, E> {
        Ok(PortValue::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<PortValue, E> {
        Ok(PortValue::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<PortValue, E> {
        Ok(PortValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<PortValue, E> {
        Ok(PortValue::Text(v))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<PortValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(PortValue::List(items))
    }
}

impl From<f64> for PortValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for PortValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for PortValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Port declaration used while constructing a node
#[derive(Debug, Clone)]
pub struct PortSchema {
    /// Port name
    pub name: String,
    /// Data type
    pub port_type: PortType,
    /// Default value
    pub default_value: Option<PortValue>,
}

impl PortSchema {
    /// Declare a port without a default
    pub fn new(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            port_type,
            default_value: None,
        }
    }

    /// Set the default value
    pub fn with_default(mut self, value: impl Into<PortValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// A port on a node
#[derive(Debug, Clone)]
pub struct Port {
    /// Derived port ID
    pub id: PortId,
    /// Data type
    pub port_type: PortType,
    /// Current value
    pub value: Option<PortValue>,
    /// Default value
    pub default_value: Option<PortValue>,
    /// Incident edges in registration order
    connections: Vec<EdgeId>,
    /// Values delivered per incoming edge
    received: HashMap<EdgeId, Option<PortValue>>,
}

impl Port {
    /// Create a port for `node` from its schema; the value starts at the default
    pub fn new(node: NodeId, direction: PortDirection, schema: PortSchema) -> Self {
        Self {
            id: PortId::new(node, direction, schema.name),
            port_type: schema.port_type,
            value: schema.default_value.clone(),
            default_value: schema.default_value,
            connections: Vec::new(),
            received: HashMap::new(),
        }
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// Port direction
    pub fn direction(&self) -> PortDirection {
        self.id.direction
    }

    /// Check if a connection to another port is valid
    pub fn can_connect_to(&self, other: &Port) -> bool {
        // Must be opposite directions
        if self.direction() == other.direction() {
            return false;
        }

        self.port_type.can_connect_to(&other.port_type)
    }

    /// Restore the default value
    pub fn reset(&mut self) {
        self.value = self.default_value.clone();
    }

    /// Incident edges in registration order
    pub fn connections(&self) -> &[EdgeId] {
        &self.connections
    }

    /// Whether any edge is attached
    pub fn is_connected(&self) -> bool {
        !self.connections.is_empty()
    }

    pub(crate) fn attach(&mut self, edge: EdgeId) {
        if !self.connections.contains(&edge) {
            self.connections.push(edge);
        }
    }

    pub(crate) fn detach(&mut self, edge: &EdgeId) {
        self.connections.retain(|e| e != edge);
        self.received.remove(edge);
    }

    /// Store a value that arrived over `edge`
    pub(crate) fn receive(&mut self, edge: &EdgeId, value: Option<PortValue>) {
        if self.connections.len() > 1 {
            self.received.insert(edge.clone(), value.clone());
        }
        self.value = value;
    }

    /// Value delivered over the first registered edge, falling back to the current value
    pub fn first_value(&self) -> Option<&PortValue> {
        if self.connections.len() > 1 {
            return self
                .received
                .get(&self.connections[0])
                .and_then(Option::as_ref);
        }
        self.value.as_ref()
    }

    /// Every value delivered to this port, in edge registration order
    pub fn delivered_values(&self) -> Vec<Option<&PortValue>> {
        match self.connections.len() {
            0 => self.value.iter().map(Some).collect(),
            1 => vec![self.value.as_ref()],
            _ => self
                .connections
                .iter()
                .map(|edge| self.received.get(edge).and_then(Option::as_ref))
                .collect(),
        }
    }
}
