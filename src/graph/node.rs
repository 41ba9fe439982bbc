use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::NodeId;
use crate::shape::{ElementType, PartialShape};

#[derive(Clone, Debug)]
pub enum Node {
    Operation(OperationNode),
    Tensor(TensorNode),
}

impl Node {
    /// Return the debug name of this node.
    ///
    /// For tensors this is the first of the tensor's names.
    pub fn name(&self) -> Option<&str> {
        match self {
            Node::Operation(op) => op.name(),
            Node::Tensor(tensor) => tensor.name(),
        }
    }

    /// Return the contained operation, if this is an operation node.
    pub fn as_operation(&self) -> Option<&OperationNode> {
        match self {
            Node::Operation(op) => Some(op),
            Node::Tensor(_) => None,
        }
    }

    /// Return the contained tensor, if this is a tensor node.
    pub fn as_tensor(&self) -> Option<&TensorNode> {
        match self {
            Node::Tensor(tensor) => Some(tensor),
            Node::Operation(_) => None,
        }
    }
}

/// Identifies an input or output port of an operation by the operation ID and
/// the port's position in the operation's list of inputs or outputs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortRef {
    pub op: NodeId,
    pub index: usize,
}

impl PortRef {
    pub fn new(op: NodeId, index: usize) -> Self {
        PortRef { op, index }
    }
}

/// Connection between an operation port and a tensor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Port {
    /// Optional name of the port, unique among the operation's ports of the
    /// same direction.
    pub name: Option<String>,

    /// Tensor connected to the port. This is `None` for optional inputs that
    /// are not provided. Output ports are always connected.
    pub tensor: Option<NodeId>,
}

impl Port {
    pub fn new(tensor: Option<NodeId>) -> Self {
        Port { name: None, tensor }
    }
}

/// Value of an operation attribute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attribute {
    Int(i64),
    Float(f32),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    Strings(Vec<String>),
}

/// Attributes of an operation, keyed by name.
pub type Attributes = BTreeMap<String, Attribute>;

#[derive(Clone, Debug)]
pub struct OperationNode {
    name: Option<String>,
    op_type: String,
    attrs: Attributes,
    pub(super) inputs: SmallVec<[Port; 4]>,
    pub(super) outputs: SmallVec<[Port; 2]>,
}

impl OperationNode {
    pub(super) fn new(
        name: Option<&str>,
        op_type: &str,
        attrs: Attributes,
        inputs: SmallVec<[Port; 4]>,
        outputs: SmallVec<[Port; 2]>,
    ) -> Self {
        OperationNode {
            name: name.map(|s| s.to_owned()),
            op_type: op_type.to_owned(),
            attrs,
            inputs,
            outputs,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the operator type, eg. "Add" or "Split".
    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// Return an integer attribute.
    pub fn attr_int(&self, name: &str) -> Option<i64> {
        match self.attrs.get(name)? {
            Attribute::Int(val) => Some(*val),
            _ => None,
        }
    }

    /// Return an integer list attribute.
    pub fn attr_ints(&self, name: &str) -> Option<&[i64]> {
        match self.attrs.get(name)? {
            Attribute::Ints(vals) => Some(vals),
            _ => None,
        }
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    /// Return the IDs of tensors connected to each input port.
    pub fn input_ids(&self) -> impl Iterator<Item = Option<NodeId>> + '_ {
        self.inputs.iter().map(|port| port.tensor)
    }

    /// Return the IDs of tensors connected to each output port.
    pub fn output_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.outputs.iter().filter_map(|port| port.tensor)
    }

    pub(super) fn set_name(&mut self, name: Option<&str>) {
        self.name = name.map(|s| s.to_owned());
    }
}

#[derive(Clone, Debug)]
pub struct TensorNode {
    names: SmallVec<[String; 1]>,
    shape: PartialShape,
    dtype: Option<ElementType>,
    pub(super) producer: Option<PortRef>,
    pub(super) consumers: Vec<PortRef>,
}

impl TensorNode {
    pub(super) fn new(names: &[&str], shape: PartialShape, dtype: Option<ElementType>) -> Self {
        TensorNode {
            names: names.iter().map(|s| s.to_string()).collect(),
            shape,
            dtype,
            producer: None,
            consumers: Vec::new(),
        }
    }

    /// Return the primary name of this tensor.
    pub fn name(&self) -> Option<&str> {
        self.names.first().map(|s| s.as_str())
    }

    /// Return all names (aliases) of this tensor, primary name first.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn shape(&self) -> &PartialShape {
        &self.shape
    }

    pub fn dtype(&self) -> Option<ElementType> {
        self.dtype
    }

    /// Return the output port which produces this tensor.
    pub fn producer(&self) -> Option<PortRef> {
        self.producer
    }

    /// Return the input ports which consume this tensor, in the order the
    /// consuming operations were added to the graph.
    pub fn consumers(&self) -> &[PortRef] {
        &self.consumers
    }

    pub(super) fn set_shape(&mut self, shape: PartialShape) {
        self.shape = shape;
    }

    pub(super) fn set_dtype(&mut self, dtype: Option<ElementType>) {
        self.dtype = dtype;
    }

    pub(super) fn names_mut(&mut self) -> &mut SmallVec<[String; 1]> {
        &mut self.names
    }
}
