//! Tools to build graphs by tensor name.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use super::{Attributes, Graph, GraphError, NodeId, Port};
use crate::shape::{ElementType, PartialShape};

/// Description of an operation to add to a graph with [`GraphBuilder`].
#[derive(Clone, Debug, Default)]
pub struct NodeSpec<'a> {
    pub name: Option<&'a str>,
    pub op_type: &'a str,
    pub attrs: Attributes,

    /// Names of input tensors. An empty string marks an optional input that
    /// is not provided.
    pub inputs: &'a [&'a str],

    /// Names of output tensors.
    pub outputs: &'a [&'a str],

    /// Optional names for the input and output ports.
    pub input_port_names: &'a [&'a str],
    pub output_port_names: &'a [&'a str],
}

impl<'a> NodeSpec<'a> {
    pub fn new(op_type: &'a str, inputs: &'a [&'a str], outputs: &'a [&'a str]) -> Self {
        NodeSpec {
            op_type,
            inputs,
            outputs,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }
}

/// Builds a [`Graph`] from operations which refer to tensors by name.
///
/// Tensors are created the first time they are mentioned, so operations can
/// be added in any order. Shapes and types of tensors are supplied via
/// [`input`](Self::input) and [`value_info`](Self::value_info).
///
/// ```
/// use rten_edit::graph::{GraphBuilder, NodeSpec};
/// use rten_edit::{ElementType, PartialShape};
///
/// let mut builder = GraphBuilder::new();
/// builder.input("x", PartialShape::fixed(&[2, 2]), Some(ElementType::Float32))?;
/// builder.node(NodeSpec::new("Relu", &["x"], &["y"]))?;
/// builder.output("y")?;
/// let graph = builder.build()?;
/// assert_eq!(graph.operation_count(), 1);
/// # Ok::<_, rten_edit::graph::GraphError>(())
/// ```
#[derive(Default)]
pub struct GraphBuilder {
    graph: Graph,
    input_ids: Vec<NodeId>,
    output_ids: Vec<NodeId>,
}

impl GraphBuilder {
    pub fn new() -> GraphBuilder {
        Self::default()
    }

    /// Return the ID of the tensor called `name`, creating it if needed.
    fn tensor(&mut self, name: &str) -> Result<NodeId, GraphError> {
        if let Some(id) = self.graph.tensor_id(name) {
            return Ok(id);
        }
        self.graph.add_tensor(&[name], PartialShape::Dynamic, None)
    }

    /// Declare a graph input.
    pub fn input(
        &mut self,
        name: &str,
        shape: PartialShape,
        dtype: Option<ElementType>,
    ) -> Result<NodeId, GraphError> {
        let id = self.value_info(name, shape, dtype)?;
        if !self.input_ids.contains(&id) {
            self.input_ids.push(id);
        }
        Ok(id)
    }

    /// Declare a graph output. The tensor is usually produced by an operation
    /// added before or after this call.
    pub fn output(&mut self, name: &str) -> Result<NodeId, GraphError> {
        let id = self.tensor(name)?;
        if !self.output_ids.contains(&id) {
            self.output_ids.push(id);
        }
        Ok(id)
    }

    /// Set the shape and type of a tensor.
    pub fn value_info(
        &mut self,
        name: &str,
        shape: PartialShape,
        dtype: Option<ElementType>,
    ) -> Result<NodeId, GraphError> {
        let id = self.tensor(name)?;
        self.graph.set_tensor_shape(id, shape)?;
        self.graph.set_tensor_type(id, dtype)?;
        Ok(id)
    }

    /// Add an alternative name for a tensor.
    pub fn alias(&mut self, name: &str, alias: &str) -> Result<(), GraphError> {
        let id = self.tensor(name)?;
        self.graph.add_tensor_name(id, alias)
    }

    /// Add an operation.
    pub fn node(&mut self, spec: NodeSpec) -> Result<NodeId, GraphError> {
        let port_name = |names: &[&str], index: usize| {
            names
                .get(index)
                .filter(|name| !name.is_empty())
                .map(|name| name.to_string())
        };

        let mut inputs = SmallVec::<[Port; 4]>::with_capacity(spec.inputs.len());
        for (index, name) in spec.inputs.iter().enumerate() {
            let tensor = if name.is_empty() {
                None
            } else {
                Some(self.tensor(name)?)
            };
            inputs.push(Port {
                name: port_name(spec.input_port_names, index),
                tensor,
            });
        }

        let mut outputs = SmallVec::<[Port; 2]>::with_capacity(spec.outputs.len());
        for (index, name) in spec.outputs.iter().enumerate() {
            outputs.push(Port {
                name: port_name(spec.output_port_names, index),
                tensor: Some(self.tensor(name)?),
            });
        }

        self.graph
            .add_operation_with_ports(spec.name, spec.op_type, spec.attrs, inputs, outputs)
    }

    /// Finish building the graph.
    ///
    /// Fails if the graph contains a cycle or an input is produced by an
    /// operation.
    pub fn build(mut self) -> Result<Graph, GraphError> {
        self.graph.set_input_ids(&self.input_ids)?;
        self.graph.set_output_ids(&self.output_ids)?;
        self.graph.check_acyclic()?;
        Ok(self.graph)
    }
}

/// Generates names which do not collide with names already in use.
pub(crate) struct NodeNameGenerator {
    used_names: FxHashSet<String>,
}

impl NodeNameGenerator {
    /// Create a generator which avoids all tensor names in `graph`.
    pub fn for_graph(graph: &Graph) -> NodeNameGenerator {
        NodeNameGenerator {
            used_names: graph
                .tensors()
                .flat_map(|(_, tensor)| tensor.names().iter().cloned())
                .collect(),
        }
    }

    /// Return `prefix` if it is unused, or `prefix` followed by the first
    /// free `_N` suffix.
    pub fn generate(&mut self, prefix: &str) -> String {
        let mut name = prefix.to_string();
        let mut suffix = 0;
        while self.used_names.contains(&name) {
            suffix += 1;
            name = format!("{}_{}", prefix, suffix);
        }
        self.used_names.insert(name.clone());
        name
    }
}
