//! Addressable locations in a model's graph.
//!
//! A [`Place`] identifies a tensor, an operation, or an input or output port
//! of an operation, and provides navigation between them. Places are obtained
//! from an [`InputModel`] and borrow it, so they cannot outlive it or be used
//! across an edit. Editing operations accept [`PlaceId`]s, which are plain
//! values that record the edit generation of the model they came from.

use std::fmt;

use crate::graph::{Graph, NodeId, Port, PortRef};
use crate::model::InputModel;

/// The graph element which a place refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PlaceKind {
    Tensor(NodeId),
    Operation(NodeId),
    InputPort(PortRef),
    OutputPort(PortRef),
}

/// Identifier of a place, valid until the next topology edit of the model
/// which issued it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlaceId {
    kind: PlaceKind,
    generation: u32,
}

impl PlaceId {
    pub(crate) fn new(kind: PlaceKind, generation: u32) -> PlaceId {
        PlaceId { kind, generation }
    }

    pub fn kind(&self) -> PlaceKind {
        self.kind
    }

    /// Return the edit generation of the model when this ID was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Selects one port of an operation, in one direction.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum PortSelector<'a> {
    /// The sole port in the relevant direction. Resolves to nothing if the
    /// operation has zero or several ports in that direction.
    #[default]
    Default,

    /// The port at a given position.
    Index(usize),

    /// The port whose name, or the name of whose connected tensor, matches.
    /// Resolves to nothing if the name matches zero or several ports.
    Name(&'a str),
}

impl From<usize> for PortSelector<'_> {
    fn from(index: usize) -> Self {
        PortSelector::Index(index)
    }
}

impl<'a> From<&'a str> for PortSelector<'a> {
    fn from(name: &'a str) -> Self {
        PortSelector::Name(name)
    }
}

impl PortSelector<'_> {
    /// Resolve this selector to a port index in `ports`.
    fn resolve(&self, graph: &Graph, ports: &[Port]) -> Option<usize> {
        match *self {
            PortSelector::Default => (ports.len() == 1).then_some(0),
            PortSelector::Index(index) => (index < ports.len()).then_some(index),
            PortSelector::Name(name) => {
                let mut matches = ports.iter().enumerate().filter(|(_, port)| {
                    port.name.as_deref() == Some(name)
                        || port
                            .tensor
                            .and_then(|id| graph.tensor(id).ok())
                            .is_some_and(|tensor| tensor.has_name(name))
                });
                match (matches.next(), matches.next()) {
                    (Some((index, _)), None) => Some(index),
                    _ => None,
                }
            }
        }
    }
}

/// A tensor, operation or port in an [`InputModel`].
///
/// Navigation methods return `None` or an empty list when a relationship
/// does not apply to the kind of place, or a [`PortSelector`] does not
/// resolve.
#[derive(Copy, Clone)]
pub struct Place<'a> {
    model: &'a InputModel,
    id: PlaceId,
}

impl<'a> Place<'a> {
    pub(crate) fn new(model: &'a InputModel, kind: PlaceKind) -> Place<'a> {
        Place {
            model,
            id: PlaceId::new(kind, model.generation()),
        }
    }

    fn graph(&self) -> &'a Graph {
        self.model.graph()
    }

    fn with_kind(&self, kind: PlaceKind) -> Place<'a> {
        Place::new(self.model, kind)
    }

    pub fn id(&self) -> PlaceId {
        self.id
    }

    pub fn kind(&self) -> PlaceKind {
        self.id.kind
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self.kind(), PlaceKind::Tensor(_))
    }

    pub fn is_operation(&self) -> bool {
        matches!(self.kind(), PlaceKind::Operation(_))
    }

    pub fn is_input_port(&self) -> bool {
        matches!(self.kind(), PlaceKind::InputPort(_))
    }

    pub fn is_output_port(&self) -> bool {
        matches!(self.kind(), PlaceKind::OutputPort(_))
    }

    /// Return true if this is a tensor which is one of the graph's inputs.
    pub fn is_input(&self) -> bool {
        match self.kind() {
            PlaceKind::Tensor(id) => self.graph().is_input(id),
            _ => false,
        }
    }

    /// Return true if this is a tensor which is one of the graph's outputs.
    pub fn is_output(&self) -> bool {
        match self.kind() {
            PlaceKind::Tensor(id) => self.graph().is_output(id),
            _ => false,
        }
    }

    /// Return the names of a tensor, primary name first. Other places have no
    /// names.
    pub fn names(&self) -> &'a [String] {
        match self.kind() {
            PlaceKind::Tensor(id) => self
                .graph()
                .tensor(id)
                .map(|tensor| tensor.names())
                .unwrap_or(&[]),
            _ => &[],
        }
    }

    /// Return the name of an operation, if it has one.
    pub fn operation_name(&self) -> Option<&'a str> {
        match self.kind() {
            PlaceKind::Operation(id) => self.graph().operation(id).ok()?.name(),
            _ => None,
        }
    }

    /// Return the operation that produces the data at this place.
    ///
    /// - For a tensor, this is the operation whose output feeds the tensor.
    /// - For an input port, this is the producer of the port's source tensor.
    /// - For an output port, this is the operation which owns the port.
    /// - For an operation, this is the producer of the source tensor of the
    ///   input port chosen by `input`.
    ///
    /// Tensors without a producer, such as graph inputs, have no producing
    /// operation.
    pub fn producing_operation(&self, input: PortSelector) -> Option<Place<'a>> {
        let op_id = match self.kind() {
            PlaceKind::Tensor(id) => self.graph().producer_of(id)?,
            PlaceKind::InputPort(port) => {
                self.graph().producer_of(self.graph().input_tensor(port)?)?
            }
            PlaceKind::OutputPort(port) => port.op,
            PlaceKind::Operation(_) => {
                return self.input_port(input)?.producing_operation(PortSelector::Default)
            }
        };
        Some(self.with_kind(PlaceKind::Operation(op_id)))
    }

    /// Return the output port which feeds a tensor or the source tensor of an
    /// input port.
    pub fn producing_port(&self) -> Option<Place<'a>> {
        let tensor_id = match self.kind() {
            PlaceKind::Tensor(id) => id,
            PlaceKind::InputPort(port) => self.graph().input_tensor(port)?,
            _ => return None,
        };
        let producer = self.graph().tensor(tensor_id).ok()?.producer()?;
        Some(self.with_kind(PlaceKind::OutputPort(producer)))
    }

    /// Return the input ports which consume the data at this place, in the
    /// order the consuming operations were added to the graph.
    ///
    /// For an operation, `output` chooses which output's consumers to return.
    /// With [`PortSelector::Default`] the consumers of all outputs are
    /// returned, in output order.
    pub fn consuming_ports(&self, output: PortSelector) -> Vec<Place<'a>> {
        let graph = self.graph();
        let tensor_ids: Vec<NodeId> = match self.kind() {
            PlaceKind::Tensor(id) => vec![id],
            PlaceKind::OutputPort(port) => graph.output_tensor(port).into_iter().collect(),
            PlaceKind::Operation(op_id) => {
                let Ok(op) = graph.operation(op_id) else {
                    return Vec::new();
                };
                match output {
                    PortSelector::Default => op.output_ids().collect(),
                    _ => output
                        .resolve(graph, op.outputs())
                        .and_then(|index| op.outputs()[index].tensor)
                        .into_iter()
                        .collect(),
                }
            }
            PlaceKind::InputPort(_) => Vec::new(),
        };

        tensor_ids
            .into_iter()
            .filter_map(|id| graph.tensor(id).ok())
            .flat_map(|tensor| tensor.consumers().iter())
            .map(|port| self.with_kind(PlaceKind::InputPort(*port)))
            .collect()
    }

    /// Return the operations owning the ports returned by
    /// [`consuming_ports`](Self::consuming_ports).
    ///
    /// An operation which consumes the same data on several ports is listed
    /// once per port. For an input port this is the operation owning the port.
    pub fn consuming_operations(&self, output: PortSelector) -> Vec<Place<'a>> {
        if let PlaceKind::InputPort(port) = self.kind() {
            return vec![self.with_kind(PlaceKind::Operation(port.op))];
        }
        self.consuming_ports(output)
            .into_iter()
            .filter_map(|port| match port.kind() {
                PlaceKind::InputPort(port) => Some(self.with_kind(PlaceKind::Operation(port.op))),
                _ => None,
            })
            .collect()
    }

    /// Return the tensor fed by an output port, or by the output of an
    /// operation chosen by `output`.
    pub fn target_tensor(&self, output: PortSelector) -> Option<Place<'a>> {
        let tensor_id = match self.kind() {
            PlaceKind::OutputPort(port) => self.graph().output_tensor(port)?,
            PlaceKind::Operation(_) => return self.output_port(output)?.target_tensor(output),
            _ => return None,
        };
        Some(self.with_kind(PlaceKind::Tensor(tensor_id)))
    }

    /// Return the tensor connected to an input port, or to the input of an
    /// operation chosen by `input`.
    pub fn source_tensor(&self, input: PortSelector) -> Option<Place<'a>> {
        let tensor_id = match self.kind() {
            PlaceKind::InputPort(port) => self.graph().input_tensor(port)?,
            PlaceKind::Operation(_) => return self.input_port(input)?.source_tensor(input),
            _ => return None,
        };
        Some(self.with_kind(PlaceKind::Tensor(tensor_id)))
    }

    /// Return an input port of an operation.
    ///
    /// For a tensor, this returns an input port of the operation which
    /// produces the tensor.
    pub fn input_port(&self, input: PortSelector) -> Option<Place<'a>> {
        let op_id = match self.kind() {
            PlaceKind::Operation(op_id) => op_id,
            PlaceKind::Tensor(id) => self.graph().producer_of(id)?,
            _ => return None,
        };
        let op = self.graph().operation(op_id).ok()?;
        let index = input.resolve(self.graph(), op.inputs())?;
        Some(self.with_kind(PlaceKind::InputPort(PortRef::new(op_id, index))))
    }

    /// Return an output port of an operation.
    ///
    /// For a tensor, this returns the port which produces it.
    pub fn output_port(&self, output: PortSelector) -> Option<Place<'a>> {
        let op_id = match self.kind() {
            PlaceKind::Operation(op_id) => op_id,
            PlaceKind::Tensor(_) => return self.producing_port(),
            _ => return None,
        };
        let op = self.graph().operation(op_id).ok()?;
        let index = output.resolve(self.graph(), op.outputs())?;
        Some(self.with_kind(PlaceKind::OutputPort(PortRef::new(op_id, index))))
    }

    /// Return true if `other` refers to the same graph element.
    pub fn is_equal(&self, other: &Place) -> bool {
        self.id == other.id
    }

    /// Return true if `other` refers to the same data value.
    ///
    /// A tensor, the output port that produces it and every input port that
    /// consumes it all carry the same data. Operations are only data-equal to
    /// themselves.
    pub fn is_equal_data(&self, other: &Place) -> bool {
        if self.id.generation != other.id.generation {
            return false;
        }
        match (self.data_tensor(), other.data_tensor()) {
            (Some(a), Some(b)) => a == b,
            _ => self.is_equal(other),
        }
    }

    /// Return the tensor whose value is available at this place.
    fn data_tensor(&self) -> Option<NodeId> {
        match self.kind() {
            PlaceKind::Tensor(id) => Some(id),
            PlaceKind::OutputPort(port) => self.graph().output_tensor(port),
            PlaceKind::InputPort(port) => self.graph().input_tensor(port),
            PlaceKind::Operation(_) => None,
        }
    }
}

impl fmt::Debug for Place<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Place<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.graph();
        match self.kind() {
            PlaceKind::Tensor(id) => write!(f, "tensor \"{}\"", graph.node_name(id)),
            PlaceKind::Operation(id) => write!(f, "operation \"{}\"", graph.node_name(id)),
            PlaceKind::InputPort(port) => write!(
                f,
                "input {} of \"{}\"",
                port.index,
                graph.node_name(port.op)
            ),
            PlaceKind::OutputPort(port) => write!(
                f,
                "output {} of \"{}\"",
                port.index,
                graph.node_name(port.op)
            ),
        }
    }
}
