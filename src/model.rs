use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::env::{env_flag, env_value};
use crate::graph::{Graph, NodeId, Planner, PortRef};
use crate::place::{Place, PlaceId, PlaceKind};
use crate::shape::{ElementType, PartialShape};

mod edit_error;
mod extract;
mod registry;

#[cfg(test)]
mod tests;

pub use edit_error::{EditError, EditErrorKind};
use extract::SubgraphExtractor;
use registry::PlaceRegistry;

/// How placeholder inputs created by subgraph extraction are named.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum PlaceholderNaming {
    /// `<source tensor>/placeholder_port_<k>`, where `k` counts the
    /// placeholders created for the same source tensor.
    #[default]
    Tensor,

    /// `<first output of consumer>/placeholder_port_<input index>`.
    Consumer,
}

impl FromStr for PlaceholderNaming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tensor" => Ok(PlaceholderNaming::Tensor),
            "consumer" => Ok(PlaceholderNaming::Consumer),
            _ => Err(format!("unknown placeholder naming \"{}\"", s)),
        }
    }
}

/// Options that control how an [`InputModel`] is edited.
#[derive(Clone, Debug, Default)]
pub struct EditOptions {
    placeholder_naming: PlaceholderNaming,
    validate: bool,
}

impl EditOptions {
    /// Create options from the `RTEN_EDIT_PLACEHOLDER_NAMING` and
    /// `RTEN_EDIT_VALIDATE` environment variables.
    pub fn from_env() -> EditOptions {
        EditOptions {
            placeholder_naming: env_value(
                "RTEN_EDIT_PLACEHOLDER_NAMING",
                PlaceholderNaming::default(),
                |s| s.parse().ok(),
            ),
            validate: env_flag("RTEN_EDIT_VALIDATE", false),
        }
    }

    /// Set how placeholder inputs are named.
    pub fn placeholder_naming(&mut self, naming: PlaceholderNaming) -> &mut Self {
        self.placeholder_naming = naming;
        self
    }

    /// Set whether each edit checks all structural invariants of the new graph
    /// before committing it.
    pub fn validate(&mut self, validate: bool) -> &mut Self {
        self.validate = validate;
        self
    }
}

/// A model graph which can be queried and edited.
///
/// Locations in the graph are addressed using [`Place`]s, which are obtained
/// by name using methods such as
/// [`place_by_tensor_name`](InputModel::place_by_tensor_name). Places borrow
/// the model, so to edit it their [`id`](Place::id) is passed to the editing
/// methods instead.
///
/// Edits which change the topology of the graph, such as
/// [`extract_subgraph`](InputModel::extract_subgraph), either fully succeed
/// or leave the model unchanged. After such an edit, IDs of places obtained
/// earlier are rejected and places must be looked up again.
///
/// ```
/// use rten_edit::graph::{GraphBuilder, NodeSpec};
/// use rten_edit::{EditOptions, InputModel, PartialShape, PortSelector};
///
/// let mut builder = GraphBuilder::new();
/// builder.input("x", PartialShape::fixed(&[2]), None)?;
/// builder.node(NodeSpec::new("Relu", &["x"], &["y"]).with_name("relu"))?;
/// builder.node(NodeSpec::new("Abs", &["y"], &["z"]).with_name("abs"))?;
/// builder.output("z")?;
/// let mut model = InputModel::new(builder.build()?, EditOptions::default());
///
/// let abs = model.place_by_operation_name("abs").unwrap();
/// let input = abs.input_port(PortSelector::Default).unwrap().id();
/// let output = abs.target_tensor(PortSelector::Default).unwrap().id();
/// model.extract_subgraph(&[input], &[output])?;
///
/// let names: Vec<_> = model.inputs().iter().map(|p| p.names()[0].clone()).collect();
/// assert_eq!(names, ["y/placeholder_port_0"]);
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug)]
pub struct InputModel {
    name: Option<String>,
    graph: Graph,
    registry: PlaceRegistry,

    /// Counter incremented by each topology edit, used to detect stale
    /// place IDs.
    generation: u32,

    options: EditOptions,
}

impl InputModel {
    /// Create a model from a graph.
    pub fn new(graph: Graph, options: EditOptions) -> InputModel {
        let registry = PlaceRegistry::build(&graph);
        InputModel {
            name: None,
            graph,
            registry,
            generation: 0,
            options,
        }
    }

    /// Set the name of the model.
    pub fn with_name(mut self, name: Option<&str>) -> InputModel {
        self.name = name.map(|s| s.to_string());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the current graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Return the number of topology edits applied to this model.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn options(&self) -> &EditOptions {
        &self.options
    }

    /// Resolve a place ID to a place.
    ///
    /// Fails if the ID was issued before the last topology edit or does not
    /// refer to an element of the graph.
    pub fn place(&self, id: PlaceId) -> Result<Place<'_>, EditError> {
        if id.generation() != self.generation {
            return Err(EditError::stale_place());
        }
        let exists = match id.kind() {
            PlaceKind::Tensor(id) => self.graph.tensor(id).is_ok(),
            PlaceKind::Operation(id) => self.graph.operation(id).is_ok(),
            PlaceKind::InputPort(port) => self
                .graph
                .operation(port.op)
                .is_ok_and(|op| port.index < op.inputs().len()),
            PlaceKind::OutputPort(port) => self
                .graph
                .operation(port.op)
                .is_ok_and(|op| port.index < op.outputs().len()),
        };
        if !exists {
            return Err(EditError::invalid_place("place is not part of the graph"));
        }
        Ok(Place::new(self, id.kind()))
    }

    /// Find a tensor by any of its names.
    ///
    /// Only exact matches are returned.
    pub fn place_by_tensor_name(&self, name: &str) -> Option<Place<'_>> {
        let id = self.graph.tensor_id(name)?;
        Some(Place::new(self, PlaceKind::Tensor(id)))
    }

    /// Find an operation by name.
    ///
    /// Returns `None` if no operation, or more than one, has this name.
    pub fn place_by_operation_name(&self, name: &str) -> Option<Place<'_>> {
        let id = self.registry.operation(name)?;
        Some(Place::new(self, PlaceKind::Operation(id)))
    }

    /// Find an input port of an operation by the operation name and port
    /// index.
    pub fn place_by_operation_name_and_input_port(
        &self,
        name: &str,
        index: usize,
    ) -> Option<Place<'_>> {
        let id = self.registry.operation(name)?;
        let op = self.graph.operation(id).ok()?;
        (index < op.inputs().len())
            .then(|| Place::new(self, PlaceKind::InputPort(PortRef::new(id, index))))
    }

    /// Find an output port of an operation by the operation name and port
    /// index.
    pub fn place_by_operation_name_and_output_port(
        &self,
        name: &str,
        index: usize,
    ) -> Option<Place<'_>> {
        let id = self.registry.operation(name)?;
        let op = self.graph.operation(id).ok()?;
        (index < op.outputs().len())
            .then(|| Place::new(self, PlaceKind::OutputPort(PortRef::new(id, index))))
    }

    /// Return the graph's input tensors, in order.
    pub fn inputs(&self) -> Vec<Place<'_>> {
        self.graph
            .input_ids()
            .iter()
            .map(|id| Place::new(self, PlaceKind::Tensor(*id)))
            .collect()
    }

    /// Return the graph's output tensors, in order.
    pub fn outputs(&self) -> Vec<Place<'_>> {
        self.graph
            .output_ids()
            .iter()
            .map(|id| Place::new(self, PlaceKind::Tensor(*id)))
            .collect()
    }

    /// Return the tensor whose data is available at `id`.
    ///
    /// This is the tensor itself, the tensor fed by an output port or the
    /// source tensor of an input port.
    fn data_tensor(&self, id: PlaceId) -> Result<NodeId, EditError> {
        let place = self.place(id)?;
        let tensor = match place.kind() {
            PlaceKind::Tensor(id) => Some(id),
            PlaceKind::OutputPort(port) => self.graph.output_tensor(port),
            PlaceKind::InputPort(port) => self.graph.input_tensor(port),
            PlaceKind::Operation(_) => None,
        };
        tensor.ok_or_else(|| {
            EditError::invalid_place(format!("{} does not refer to a tensor", place))
        })
    }

    /// Return the stored partial shape of the tensor at a place.
    pub fn partial_shape(&self, place: PlaceId) -> Result<&PartialShape, EditError> {
        let id = self.data_tensor(place)?;
        Ok(self.graph.tensor(id)?.shape())
    }

    /// Replace the stored partial shape of the tensor at a place.
    ///
    /// This does not update the shapes of other tensors.
    pub fn set_partial_shape(
        &mut self,
        place: PlaceId,
        shape: PartialShape,
    ) -> Result<(), EditError> {
        let id = self.data_tensor(place)?;
        debug!(
            "Set shape of \"{}\" to {}",
            self.graph.node_name(id),
            shape
        );
        self.graph.set_tensor_shape(id, shape)?;
        Ok(())
    }

    /// Return the stored element type of the tensor at a place.
    pub fn element_type(&self, place: PlaceId) -> Result<Option<ElementType>, EditError> {
        let id = self.data_tensor(place)?;
        Ok(self.graph.tensor(id)?.dtype())
    }

    /// Replace the stored element type of the tensor at a place.
    pub fn set_element_type(
        &mut self,
        place: PlaceId,
        dtype: Option<ElementType>,
    ) -> Result<(), EditError> {
        let id = self.data_tensor(place)?;
        self.graph.set_tensor_type(id, dtype)?;
        Ok(())
    }

    /// Add an alternative name for the tensor at a place.
    pub fn add_name_for_tensor(&mut self, place: PlaceId, name: &str) -> Result<(), EditError> {
        let id = self.data_tensor(place)?;
        self.graph.add_tensor_name(id, name)?;
        Ok(())
    }

    /// Replace the primary name of the tensor at a place.
    pub fn set_name_for_tensor(&mut self, place: PlaceId, name: &str) -> Result<(), EditError> {
        let id = self.data_tensor(place)?;
        self.graph.rename_tensor(id, name)?;
        Ok(())
    }

    /// Rename an operation.
    pub fn set_name_for_operation(&mut self, place: PlaceId, name: &str) -> Result<(), EditError> {
        let PlaceKind::Operation(id) = self.place(place)?.kind() else {
            return Err(EditError::invalid_place("place is not an operation"));
        };
        self.graph.rename_operation(id, Some(name))?;
        self.registry = PlaceRegistry::build(&self.graph);
        Ok(())
    }

    /// Add the tensor at a place to the graph's outputs.
    ///
    /// Does nothing if the tensor is already an output.
    pub fn add_output(&mut self, place: PlaceId) -> Result<(), EditError> {
        let id = self.data_tensor(place)?;
        if self.graph.is_output(id) {
            return Ok(());
        }
        let mut output_ids = self.graph.output_ids().to_vec();
        output_ids.push(id);
        self.graph.set_output_ids(&output_ids)?;
        Ok(())
    }

    /// Remove the tensor at a place from the graph's outputs.
    ///
    /// Operations which no longer contribute to any output are kept until the
    /// next call to [`override_all_outputs`](Self::override_all_outputs).
    pub fn remove_output(&mut self, place: PlaceId) -> Result<(), EditError> {
        let id = self.data_tensor(place)?;
        let output_ids: Vec<NodeId> = self
            .graph
            .output_ids()
            .iter()
            .copied()
            .filter(|output| *output != id)
            .collect();
        self.graph.set_output_ids(&output_ids)?;
        Ok(())
    }

    /// Resolve place IDs to place kinds, checking that they are current.
    fn place_kinds(&self, ids: &[PlaceId]) -> Result<Vec<PlaceKind>, EditError> {
        ids.iter()
            .map(|id| self.place(*id).map(|place| place.kind()))
            .collect()
    }

    /// Replace the graph with the part between `inputs` and `outputs`.
    ///
    /// Operations are kept if they lie on a path from the inputs to the
    /// outputs. Every output must be an input or be computed by a kept
    /// operation. Kept operations may only read values computed by other
    /// kept operations, inputs and original graph inputs.
    ///
    /// If `inputs` is empty, all operations needed to compute the outputs
    /// are kept. If `outputs` is empty, only the operations which directly
    /// consume the inputs are kept and all of their results become the
    /// outputs.
    ///
    /// An input place which is an input port of an operation, whose source is
    /// produced by another operation, is replaced by a new placeholder input
    /// with the same shape and type as the source.
    ///
    /// The new graph inputs are the declared inputs in order, followed by
    /// original graph inputs which are still used.
    pub fn extract_subgraph(
        &mut self,
        inputs: &[PlaceId],
        outputs: &[PlaceId],
    ) -> Result<(), EditError> {
        let inputs = self.place_kinds(inputs)?;
        let outputs = self.place_kinds(outputs)?;
        let extractor = SubgraphExtractor::new(&self.graph, self.options.placeholder_naming);
        let Some(extraction) = extractor.extract(&inputs, &outputs)? else {
            return Ok(());
        };
        self.commit(extraction.graph)
    }

    /// Make `inputs` the complete set of graph inputs.
    ///
    /// Fails unless every operation needed to compute the current outputs
    /// can be computed from exactly the declared inputs.
    pub fn override_all_inputs(&mut self, inputs: &[PlaceId]) -> Result<(), EditError> {
        let inputs = self.place_kinds(inputs)?;
        let outputs: Vec<PlaceKind> = self
            .graph
            .output_ids()
            .iter()
            .map(|id| PlaceKind::Tensor(*id))
            .collect();
        if outputs.is_empty() {
            return Err(EditError::invalid_boundary("graph has no outputs"));
        }

        let extractor = SubgraphExtractor::new(&self.graph, self.options.placeholder_naming);
        let Some(extraction) = extractor.extract(&inputs, &outputs)? else {
            return Ok(());
        };
        let input_count = extraction.graph.input_ids().len();
        if input_count != extraction.declared_inputs {
            return Err(EditError::invalid_boundary(format!(
                "unexpected number of inputs after override_all_inputs (expected {}, got {})",
                extraction.declared_inputs, input_count
            )));
        }
        self.commit(extraction.graph)
    }

    /// Make `outputs` the complete set of graph outputs, removing operations
    /// that are not needed to compute them.
    pub fn override_all_outputs(&mut self, outputs: &[PlaceId]) -> Result<(), EditError> {
        if outputs.is_empty() {
            return Err(EditError::invalid_boundary("no outputs specified"));
        }
        self.extract_subgraph(&[], outputs)
    }

    /// Replace the graph after a topology edit.
    fn commit(&mut self, graph: Graph) -> Result<(), EditError> {
        if self.options.validate {
            graph.check_invariants()?;
            let unreachable = Planner::with_graph(&graph).unreachable_operations();
            if let Some(op_id) = unreachable.first() {
                return Err(EditError::invalid_boundary(format!(
                    "operation \"{}\" does not contribute to any output",
                    graph.node_name(*op_id)
                )));
            }
        }

        debug!(
            "Edited graph has {} operations, {} inputs and {} outputs",
            graph.operation_count(),
            graph.input_ids().len(),
            graph.output_ids().len()
        );

        self.registry = PlaceRegistry::build(&graph);
        self.graph = graph;
        self.generation = self.generation.wrapping_add(1);
        Ok(())
    }
}

impl fmt::Display for InputModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |places: Vec<Place>| {
            places
                .iter()
                .map(|p| p.names().first().map(|s| s.as_str()).unwrap_or("?").to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "{} ({} operations, inputs: [{}], outputs: [{}])",
            self.name.as_deref().unwrap_or("model"),
            self.graph.operation_count(),
            names(self.inputs()),
            names(self.outputs())
        )
    }
}
