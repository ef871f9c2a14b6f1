// SPDX-License-Identifier: MIT OR Apache-2.0
//! Demonstration node library: numeric constants and arithmetic.

use nodeflow_graph::node::NodeCategory;
use nodeflow_graph::{
    process_arrays, EvaluationContext, EvaluationError, Node, NodeBase, NodeId, NodeProperty,
    NodeRegistry, NodeType, PortSchema, PortType, PortValue,
};

/// Create the registry with every demo node type
pub fn create_math_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();

    // ========================================================================
    // Input Nodes
    // ========================================================================

    registry.register(NodeType {
        id: "constant".to_string(),
        name: "Constant".to_string(),
        category: NodeCategory::Input,
        description: "Emits its value property".to_string(),
        constructor: Constant::create,
    });

    // ========================================================================
    // Math Nodes
    // ========================================================================

    registry.register(NodeType {
        id: "add".to_string(),
        name: "Add".to_string(),
        category: NodeCategory::Math,
        description: "A + B".to_string(),
        constructor: Arithmetic::add,
    });

    registry.register(NodeType {
        id: "multiply".to_string(),
        name: "Multiply".to_string(),
        category: NodeCategory::Math,
        description: "A * B".to_string(),
        constructor: Arithmetic::multiply,
    });

    registry.register(NodeType {
        id: "sum".to_string(),
        name: "Sum".to_string(),
        category: NodeCategory::Math,
        description: "Total of every value connected to Values".to_string(),
        constructor: Sum::create,
    });

    registry.register(NodeType {
        id: "broadcast_add".to_string(),
        name: "Broadcast Add".to_string(),
        category: NodeCategory::Math,
        description: "Element-wise X + Y, repeating the shorter list".to_string(),
        constructor: BroadcastAdd::create,
    });

    registry
}

fn number_input(base: &NodeBase, name: &str) -> Result<f64, EvaluationError> {
    let value = base
        .input_value(name)
        .ok_or_else(|| EvaluationError::MissingInput(name.to_string()))?;
    value.as_number().ok_or_else(|| EvaluationError::TypeMismatch {
        port: name.to_string(),
        expected: PortType::Number,
    })
}

/// Numbers carried by a scalar or list value; anything else contributes none
fn numbers(value: Option<&PortValue>) -> Vec<f64> {
    match value {
        Some(PortValue::Number(n)) => vec![*n],
        Some(PortValue::List(items)) => items.iter().filter_map(PortValue::as_number).collect(),
        _ => Vec::new(),
    }
}

struct Constant {
    base: NodeBase,
}

impl Constant {
    fn create(id: NodeId) -> Box<dyn Node> {
        let mut base = NodeBase::new(id, "constant", "Constant");
        base.add_output(PortSchema::new("value", PortType::Number));
        base.add_property(NodeProperty::number("value", 0.0).with_label("Value"));
        Box::new(Self { base })
    }
}

impl Node for Constant {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn evaluate(&mut self, _ctx: &mut EvaluationContext<'_>) -> Result<(), EvaluationError> {
        let value = self
            .base
            .property("value")
            .cloned()
            .unwrap_or(PortValue::Number(0.0));
        self.base.set_output_value("value", value)?;
        Ok(())
    }
}

struct Arithmetic {
    base: NodeBase,
    op: fn(f64, f64) -> f64,
}

impl Arithmetic {
    fn add(id: NodeId) -> Box<dyn Node> {
        Self::build(NodeBase::new(id, "add", "Add"), 0.0, |a, b| a + b)
    }

    fn multiply(id: NodeId) -> Box<dyn Node> {
        Self::build(NodeBase::new(id, "multiply", "Multiply"), 1.0, |a, b| a * b)
    }

    fn build(mut base: NodeBase, identity: f64, op: fn(f64, f64) -> f64) -> Box<dyn Node> {
        base.add_input(PortSchema::new("a", PortType::Number).with_default(identity));
        base.add_input(PortSchema::new("b", PortType::Number).with_default(identity));
        base.add_output(PortSchema::new("result", PortType::Number));
        Box::new(Self { base, op })
    }
}

impl Node for Arithmetic {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn evaluate(&mut self, _ctx: &mut EvaluationContext<'_>) -> Result<(), EvaluationError> {
        let a = number_input(&self.base, "a")?;
        let b = number_input(&self.base, "b")?;
        self.base
            .set_output_value("result", PortValue::Number((self.op)(a, b)))?;
        Ok(())
    }
}

struct Sum {
    base: NodeBase,
}

impl Sum {
    fn create(id: NodeId) -> Box<dyn Node> {
        let mut base = NodeBase::new(id, "sum", "Sum");
        base.add_input(PortSchema::new("values", PortType::Number));
        base.add_output(PortSchema::new("result", PortType::Number));
        Box::new(Self { base })
    }
}

impl Node for Sum {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn evaluate(&mut self, _ctx: &mut EvaluationContext<'_>) -> Result<(), EvaluationError> {
        let total: f64 = self
            .base
            .input_values("values")
            .into_iter()
            .flatten()
            .filter_map(PortValue::as_number)
            .sum();
        self.base
            .set_output_value("result", PortValue::Number(total))?;
        Ok(())
    }
}

struct BroadcastAdd {
    base: NodeBase,
}

impl BroadcastAdd {
    fn create(id: NodeId) -> Box<dyn Node> {
        let mut base = NodeBase::new(id, "broadcast_add", "Broadcast Add");
        base.add_input(PortSchema::new("x", PortType::Any));
        base.add_input(PortSchema::new("y", PortType::Any));
        base.add_output(PortSchema::new("result", PortType::Any));
        Box::new(Self { base })
    }
}

impl Node for BroadcastAdd {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn evaluate(&mut self, _ctx: &mut EvaluationContext<'_>) -> Result<(), EvaluationError> {
        let x = numbers(self.base.input_value("x"));
        let y = numbers(self.base.input_value("y"));
        let result = process_arrays(&[("x", &x[..]), ("y", &y[..])], |row, _| {
            let x = row.get("x").copied().unwrap_or(0.0);
            let y = row.get("y").copied().unwrap_or(0.0);
            PortValue::Number(x + y)
        });
        self.base
            .set_output_value("result", PortValue::List(result))?;
        Ok(())
    }
}
