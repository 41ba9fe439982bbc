use std::error::Error;
use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::shape::{ElementType, PartialShape};

pub mod builder;
mod node;
mod node_id;
mod planner;


pub use builder::{GraphBuilder, NodeSpec};
pub use node::{Attribute, Attributes, Node, OperationNode, Port, PortRef, TensorNode};
pub use node_id::NodeId;
pub use planner::Planner;

/// Errors that occur when a graph mutation would violate the structural
/// invariants of a [`Graph`].
#[derive(Clone, Debug, PartialEq)]
pub enum GraphError {
    /// A node ID does not refer to a node in this graph.
    InvalidNodeId(NodeId),

    /// A node ID refers to an operation where a tensor was expected.
    NotATensor(NodeId),

    /// A node ID refers to a tensor where an operation was expected.
    NotAnOperation(NodeId),

    /// A tensor name is already used by another tensor.
    DuplicateTensorName(String),

    /// Two ports of the same direction on an operation have the same name.
    DuplicatePortName { operation: String, port: String },

    /// A tensor would have more than one producing port.
    MultipleProducers { tensor: String },

    /// A tensor listed as a graph input has a producer.
    InputHasProducer { tensor: String },

    /// A tensor is listed more than once as a graph input or output.
    DuplicateBoundary { tensor: String },

    /// A tensor name referenced while building a graph was never defined.
    UnknownTensor(String),

    /// The graph contains a data dependency cycle through an operation.
    Cycle { operation: String },

    /// Producer or consumer bookkeeping is inconsistent with operation ports.
    InconsistentEdge { tensor: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNodeId(id) => write!(f, "node ID {} is invalid", id),
            Self::NotATensor(id) => write!(f, "node {} is not a tensor", id),
            Self::NotAnOperation(id) => write!(f, "node {} is not an operation", id),
            Self::DuplicateTensorName(name) => {
                write!(f, "tensor name \"{}\" is already in use", name)
            }
            Self::DuplicatePortName { operation, port } => write!(
                f,
                "operation \"{}\" has more than one port named \"{}\"",
                operation, port
            ),
            Self::MultipleProducers { tensor } => {
                write!(f, "tensor \"{}\" already has a producer", tensor)
            }
            Self::InputHasProducer { tensor } => write!(
                f,
                "tensor \"{}\" cannot be a graph input because it has a producer",
                tensor
            ),
            Self::DuplicateBoundary { tensor } => {
                write!(f, "tensor \"{}\" is listed more than once", tensor)
            }
            Self::UnknownTensor(name) => write!(f, "tensor \"{}\" is not defined", name),
            Self::Cycle { operation } => {
                write!(f, "graph contains a cycle through operation \"{}\"", operation)
            }
            Self::InconsistentEdge { tensor } => {
                write!(f, "edges of tensor \"{}\" are inconsistent", tensor)
            }
        }
    }
}

impl Error for GraphError {}

/// A directed graph of operations connected by tensors.
///
/// Graphs consist of two types of node, each of which has a numeric ID. An
/// operation node has ordered input and output ports. A tensor node is a data
/// edge with one or more names, which is produced by at most one operation
/// output port and consumed by any number of operation input ports.
///
/// Some tensors are designated as graph inputs and outputs. Graph inputs
/// never have a producer.
///
/// All mutations go through methods of this type, which validate the
/// structural invariants and return a [`GraphError`] if a change would
/// violate them. Failed mutations leave the graph unchanged.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,

    /// Map of tensor name (including aliases) to tensor node ID.
    tensor_names: FxHashMap<String, NodeId>,

    input_ids: Vec<NodeId>,
    output_ids: Vec<NodeId>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Graph {
        Self::default()
    }

    /// Create a new graph with pre-allocated storage space for nodes.
    pub fn with_capacity(n_nodes: usize) -> Graph {
        Graph {
            nodes: Vec::with_capacity(n_nodes),
            ..Self::default()
        }
    }

    /// Add a tensor node to the graph.
    ///
    /// `names` are the tensor's names, primary name first. Each name must be
    /// unused by other tensors.
    pub fn add_tensor(
        &mut self,
        names: &[&str],
        shape: PartialShape,
        dtype: Option<ElementType>,
    ) -> Result<NodeId, GraphError> {
        for (i, name) in names.iter().enumerate() {
            if self.tensor_names.contains_key(*name) || names[..i].contains(name) {
                return Err(GraphError::DuplicateTensorName(name.to_string()));
            }
        }

        let id = NodeId::from_index(self.nodes.len());
        self.nodes
            .push(Node::Tensor(TensorNode::new(names, shape, dtype)));
        for name in names {
            self.tensor_names.insert(name.to_string(), id);
        }
        Ok(id)
    }

    /// Add an operation node whose ports are unnamed.
    ///
    /// `inputs` lists the tensor connected to each input port, or `None` for
    /// optional inputs which are not provided. `outputs` lists the tensor fed
    /// by each output port. Output tensors must not already have a producer.
    pub fn add_operation(
        &mut self,
        name: Option<&str>,
        op_type: &str,
        attrs: Attributes,
        inputs: &[Option<NodeId>],
        outputs: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        let inputs: SmallVec<[Port; 4]> = inputs.iter().map(|id| Port::new(*id)).collect();
        let outputs: SmallVec<[Port; 2]> = outputs.iter().map(|id| Port::new(Some(*id))).collect();
        self.add_operation_with_ports(name, op_type, attrs, inputs, outputs)
    }

    /// Add an operation node with explicitly described ports.
    pub fn add_operation_with_ports(
        &mut self,
        name: Option<&str>,
        op_type: &str,
        attrs: Attributes,
        inputs: SmallVec<[Port; 4]>,
        outputs: SmallVec<[Port; 2]>,
    ) -> Result<NodeId, GraphError> {
        let op_label = || name.unwrap_or(op_type).to_string();

        for ports in [inputs.as_slice(), outputs.as_slice()] {
            for (i, port) in ports.iter().enumerate() {
                let Some(port_name) = port.name.as_deref() else {
                    continue;
                };
                if ports[..i].iter().any(|p| p.name.as_deref() == Some(port_name)) {
                    return Err(GraphError::DuplicatePortName {
                        operation: op_label(),
                        port: port_name.to_string(),
                    });
                }
            }
        }

        for tensor_id in inputs.iter().filter_map(|port| port.tensor) {
            self.tensor(tensor_id)?;
        }

        for (i, port) in outputs.iter().enumerate() {
            let Some(tensor_id) = port.tensor else {
                return Err(GraphError::InconsistentEdge {
                    tensor: format!("{} output {}", op_label(), i),
                });
            };
            let tensor = self.tensor(tensor_id)?;
            let claimed_twice = outputs[..i].iter().any(|p| p.tensor == Some(tensor_id));
            if tensor.producer().is_some() || claimed_twice {
                return Err(GraphError::MultipleProducers {
                    tensor: self.node_name(tensor_id),
                });
            }
            if self.input_ids.contains(&tensor_id) {
                return Err(GraphError::InputHasProducer {
                    tensor: self.node_name(tensor_id),
                });
            }
        }

        let op_id = NodeId::from_index(self.nodes.len());
        for (index, port) in inputs.iter().enumerate() {
            if let Some(tensor_id) = port.tensor {
                self.tensor_mut(tensor_id)?
                    .consumers
                    .push(PortRef::new(op_id, index));
            }
        }
        for (index, port) in outputs.iter().enumerate() {
            if let Some(tensor_id) = port.tensor {
                self.tensor_mut(tensor_id)?.producer = Some(PortRef::new(op_id, index));
            }
        }

        self.nodes.push(Node::Operation(OperationNode::new(
            name, op_type, attrs, inputs, outputs,
        )));
        Ok(op_id)
    }

    /// Set which tensors are the graph's inputs.
    pub fn set_input_ids(&mut self, ids: &[NodeId]) -> Result<(), GraphError> {
        for (i, &id) in ids.iter().enumerate() {
            let tensor = self.tensor(id)?;
            if tensor.producer().is_some() {
                return Err(GraphError::InputHasProducer {
                    tensor: self.node_name(id),
                });
            }
            if ids[..i].contains(&id) {
                return Err(GraphError::DuplicateBoundary {
                    tensor: self.node_name(id),
                });
            }
        }
        self.input_ids = ids.to_vec();
        Ok(())
    }

    /// Set which tensors are the graph's outputs.
    pub fn set_output_ids(&mut self, ids: &[NodeId]) -> Result<(), GraphError> {
        for (i, &id) in ids.iter().enumerate() {
            self.tensor(id)?;
            if ids[..i].contains(&id) {
                return Err(GraphError::DuplicateBoundary {
                    tensor: self.node_name(id),
                });
            }
        }
        self.output_ids = ids.to_vec();
        Ok(())
    }

    /// Replace the stored partial shape of a tensor.
    pub fn set_tensor_shape(&mut self, id: NodeId, shape: PartialShape) -> Result<(), GraphError> {
        self.tensor_mut(id)?.set_shape(shape);
        Ok(())
    }

    /// Replace the stored element type of a tensor.
    pub fn set_tensor_type(
        &mut self,
        id: NodeId,
        dtype: Option<ElementType>,
    ) -> Result<(), GraphError> {
        self.tensor_mut(id)?.set_dtype(dtype);
        Ok(())
    }

    /// Add an alias to a tensor.
    ///
    /// Adding a name the tensor already has is a no-op.
    pub fn add_tensor_name(&mut self, id: NodeId, name: &str) -> Result<(), GraphError> {
        self.tensor(id)?;
        match self.tensor_names.get(name) {
            Some(existing) if *existing == id => return Ok(()),
            Some(_) => return Err(GraphError::DuplicateTensorName(name.to_string())),
            None => {}
        }
        self.tensor_mut(id)?.names_mut().push(name.to_string());
        self.tensor_names.insert(name.to_string(), id);
        Ok(())
    }

    /// Replace the primary name of a tensor, keeping any other aliases.
    pub fn rename_tensor(&mut self, id: NodeId, name: &str) -> Result<(), GraphError> {
        self.tensor(id)?;
        match self.tensor_names.get(name) {
            Some(existing) if *existing != id => {
                return Err(GraphError::DuplicateTensorName(name.to_string()))
            }
            _ => {}
        }

        let names = self.tensor_mut(id)?.names_mut();
        names.retain(|n| n.as_str() != name);
        let old_name = if names.is_empty() {
            None
        } else {
            Some(names.remove(0))
        };
        names.insert(0, name.to_string());

        if let Some(old_name) = old_name {
            self.tensor_names.remove(&old_name);
        }
        self.tensor_names.insert(name.to_string(), id);
        Ok(())
    }

    /// Set or clear the name of an operation.
    pub fn rename_operation(&mut self, id: NodeId, name: Option<&str>) -> Result<(), GraphError> {
        match self.nodes.get_mut(id.as_usize()) {
            Some(Node::Operation(op)) => {
                op.set_name(name);
                Ok(())
            }
            Some(Node::Tensor(_)) => Err(GraphError::NotAnOperation(id)),
            None => Err(GraphError::InvalidNodeId(id)),
        }
    }

    /// Retrieve a node by ID.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.as_usize())
    }

    /// Retrieve a tensor node by ID.
    pub fn tensor(&self, id: NodeId) -> Result<&TensorNode, GraphError> {
        match self.get_node(id) {
            Some(Node::Tensor(tensor)) => Ok(tensor),
            Some(Node::Operation(_)) => Err(GraphError::NotATensor(id)),
            None => Err(GraphError::InvalidNodeId(id)),
        }
    }

    fn tensor_mut(&mut self, id: NodeId) -> Result<&mut TensorNode, GraphError> {
        match self.nodes.get_mut(id.as_usize()) {
            Some(Node::Tensor(tensor)) => Ok(tensor),
            Some(Node::Operation(_)) => Err(GraphError::NotATensor(id)),
            None => Err(GraphError::InvalidNodeId(id)),
        }
    }

    /// Retrieve an operation node by ID.
    pub fn operation(&self, id: NodeId) -> Result<&OperationNode, GraphError> {
        match self.get_node(id) {
            Some(Node::Operation(op)) => Ok(op),
            Some(Node::Tensor(_)) => Err(GraphError::NotAnOperation(id)),
            None => Err(GraphError::InvalidNodeId(id)),
        }
    }

    /// Look up a tensor by any of its names.
    pub fn tensor_id(&self, name: &str) -> Option<NodeId> {
        self.tensor_names.get(name).copied()
    }

    /// Return the debug name for a node.
    pub fn node_name(&self, id: NodeId) -> String {
        self.get_node(id)
            .and_then(|node| match node {
                Node::Operation(op) => op.name().or(Some(op.op_type())),
                Node::Tensor(tensor) => tensor.name(),
            })
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("[ID: {}]", id))
    }

    /// Return an iterator over all nodes and their IDs, in the order they
    /// were added.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId::from_index(i), node))
    }

    /// Return an iterator over operation nodes, in the order they were added.
    pub fn operations(&self) -> impl Iterator<Item = (NodeId, &OperationNode)> {
        self.iter()
            .filter_map(|(id, node)| node.as_operation().map(|op| (id, op)))
    }

    /// Return an iterator over tensor nodes, in the order they were added.
    pub fn tensors(&self) -> impl Iterator<Item = (NodeId, &TensorNode)> {
        self.iter()
            .filter_map(|(id, node)| node.as_tensor().map(|t| (id, t)))
    }

    /// Return the number of operation nodes.
    pub fn operation_count(&self) -> usize {
        self.operations().count()
    }

    /// Return the number of nodes of all kinds.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn input_ids(&self) -> &[NodeId] {
        &self.input_ids
    }

    pub fn output_ids(&self) -> &[NodeId] {
        &self.output_ids
    }

    pub fn is_input(&self, id: NodeId) -> bool {
        self.input_ids.contains(&id)
    }

    pub fn is_output(&self, id: NodeId) -> bool {
        self.output_ids.contains(&id)
    }

    /// Return the tensor connected to an operation port.
    pub fn input_tensor(&self, port: PortRef) -> Option<NodeId> {
        let op = self.operation(port.op).ok()?;
        op.inputs().get(port.index)?.tensor
    }

    /// Return the tensor fed by an operation output port.
    pub fn output_tensor(&self, port: PortRef) -> Option<NodeId> {
        let op = self.operation(port.op).ok()?;
        op.outputs().get(port.index)?.tensor
    }

    /// Return the operation producing a tensor.
    pub fn producer_of(&self, tensor_id: NodeId) -> Option<NodeId> {
        Some(self.tensor(tensor_id).ok()?.producer()?.op)
    }

    /// Check that producer and consumer bookkeeping on tensors agrees with
    /// the ports of operations, and that the graph is acyclic.
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        for (op_id, op) in self.operations() {
            for (index, port) in op.inputs().iter().enumerate() {
                let Some(tensor_id) = port.tensor else {
                    continue;
                };
                let consumes = self
                    .tensor(tensor_id)?
                    .consumers()
                    .contains(&PortRef::new(op_id, index));
                if !consumes {
                    return Err(GraphError::InconsistentEdge {
                        tensor: self.node_name(tensor_id),
                    });
                }
            }
            for (index, port) in op.outputs().iter().enumerate() {
                let tensor_id = port.tensor.ok_or_else(|| GraphError::InconsistentEdge {
                    tensor: format!("{} output {}", self.node_name(op_id), index),
                })?;
                if self.tensor(tensor_id)?.producer() != Some(PortRef::new(op_id, index)) {
                    return Err(GraphError::InconsistentEdge {
                        tensor: self.node_name(tensor_id),
                    });
                }
            }
        }

        for (tensor_id, tensor) in self.tensors() {
            let edges_valid = tensor
                .producer()
                .into_iter()
                .all(|port| self.output_tensor(port) == Some(tensor_id))
                && tensor
                    .consumers()
                    .iter()
                    .all(|port| self.input_tensor(*port) == Some(tensor_id));
            if !edges_valid {
                return Err(GraphError::InconsistentEdge {
                    tensor: self.node_name(tensor_id),
                });
            }
        }

        for &input_id in &self.input_ids {
            if self.tensor(input_id)?.producer().is_some() {
                return Err(GraphError::InputHasProducer {
                    tensor: self.node_name(input_id),
                });
            }
        }

        self.check_acyclic()
    }

    /// Return an error if any operation transitively depends on its own
    /// outputs.
    pub fn check_acyclic(&self) -> Result<(), GraphError> {
        Planner::with_graph(self).sorted_operations().map(|_| ())
    }
}
