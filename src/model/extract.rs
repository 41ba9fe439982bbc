use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::{EditError, PlaceholderNaming};
use crate::graph::builder::NodeNameGenerator;
use crate::graph::{Graph, NodeId, Planner, Port, PortRef};
use crate::place::PlaceKind;

/// A point at which a declared input detaches the kept subgraph from the
/// rest of the graph.
#[derive(Copy, Clone, Debug, PartialEq)]
enum Cut {
    /// The tensor becomes a graph input.
    Tensor(NodeId),

    /// The input port reads from a new placeholder input instead of its
    /// current source tensor.
    Port(PortRef),
}

/// Result of extracting a subgraph.
pub(crate) struct Extraction {
    pub graph: Graph,

    /// Number of graph inputs which correspond to declared input places. These
    /// come first in the new graph's inputs.
    pub declared_inputs: usize,
}

/// Builds a new graph containing the part of an existing graph between a set
/// of input and output places.
pub(crate) struct SubgraphExtractor<'a> {
    graph: &'a Graph,
    naming: PlaceholderNaming,
}

impl<'a> SubgraphExtractor<'a> {
    pub fn new(graph: &'a Graph, naming: PlaceholderNaming) -> Self {
        SubgraphExtractor { graph, naming }
    }

    /// Extract the subgraph between `inputs` and `outputs`.
    ///
    /// With both declared, the subgraph is the operations on a path from
    /// `inputs` to `outputs`. If `outputs` is empty, it is the operations
    /// which directly consume `inputs`. If `inputs` is empty, it is
    /// everything needed to compute `outputs`. Returns `None` if both are
    /// empty.
    pub fn extract(
        &self,
        inputs: &[PlaceKind],
        outputs: &[PlaceKind],
    ) -> Result<Option<Extraction>, EditError> {
        if inputs.is_empty() && outputs.is_empty() {
            return Ok(None);
        }

        let cuts = self.resolve_inputs(inputs)?;
        let mut output_ids = self.resolve_outputs(outputs)?;

        let cut_tensors: FxHashSet<NodeId> = cuts
            .iter()
            .filter_map(|cut| match cut {
                Cut::Tensor(id) => Some(*id),
                Cut::Port(_) => None,
            })
            .collect();
        let cut_ports: FxHashSet<PortRef> = cuts
            .iter()
            .filter_map(|cut| match cut {
                Cut::Port(port) => Some(*port),
                Cut::Tensor(_) => None,
            })
            .collect();

        let planner = Planner::with_graph(self.graph);
        let kept = if output_ids.is_empty() {
            let kept = self.direct_consumers(&cuts)?;
            self.check_forward_closure(&kept, &cut_tensors, &cut_ports)?;
            output_ids = self.consumer_outputs(&kept);
            kept
        } else if cuts.is_empty() {
            planner.backward_closure(&output_ids, &cut_tensors, &cut_ports)
        } else {
            let cut_tensor_list: Vec<NodeId> = cut_tensors.iter().copied().collect();
            let cut_port_list: Vec<PortRef> = cut_ports.iter().copied().collect();
            let downstream = planner.forward_closure(&cut_tensor_list, &cut_port_list);
            let kept: FxHashSet<NodeId> = planner
                .backward_closure(&output_ids, &cut_tensors, &cut_ports)
                .into_iter()
                .filter(|op_id| downstream.contains(op_id))
                .collect();
            self.check_forward_closure(&kept, &cut_tensors, &cut_ports)?;
            kept
        };

        self.check_cuts(&cuts, &kept, &output_ids)?;
        if !cuts.is_empty() {
            self.check_outputs(&output_ids, &kept, &cut_tensors)?;
        }

        let graph = self.build_graph(&cuts, &cut_ports, &kept, &output_ids)?;
        Ok(Some(Extraction {
            graph,
            declared_inputs: cuts.len(),
        }))
    }

    /// Convert declared input places into cuts, in declaration order.
    fn resolve_inputs(&self, inputs: &[PlaceKind]) -> Result<Vec<Cut>, EditError> {
        let mut cuts = Vec::new();
        let mut push = |cut: Cut| {
            if !cuts.contains(&cut) {
                cuts.push(cut);
            }
        };

        for place in inputs {
            match *place {
                PlaceKind::Tensor(id) => push(Cut::Tensor(id)),
                PlaceKind::OutputPort(port) => {
                    let tensor = self.graph.output_tensor(port).ok_or_else(|| {
                        EditError::invalid_place("output port is not connected")
                    })?;
                    push(Cut::Tensor(tensor));
                }
                PlaceKind::InputPort(port) => push(self.input_port_cut(port)?),
                PlaceKind::Operation(op_id) => {
                    let op = self.graph.operation(op_id)?;
                    for (index, input) in op.input_ids().enumerate() {
                        if input.is_some() {
                            push(self.input_port_cut(PortRef::new(op_id, index))?);
                        }
                    }
                }
            }
        }

        Ok(cuts)
    }

    fn input_port_cut(&self, port: PortRef) -> Result<Cut, EditError> {
        let tensor = self.graph.input_tensor(port).ok_or_else(|| {
            EditError::invalid_boundary(format!(
                "input {} of \"{}\" has no source tensor",
                port.index,
                self.graph.node_name(port.op)
            ))
        })?;
        if self.graph.producer_of(tensor).is_none() {
            Ok(Cut::Tensor(tensor))
        } else {
            Ok(Cut::Port(port))
        }
    }

    /// Convert declared output places into tensor IDs, in declaration order.
    fn resolve_outputs(&self, outputs: &[PlaceKind]) -> Result<Vec<NodeId>, EditError> {
        let mut ids = Vec::new();
        let mut push = |id: NodeId| {
            if !ids.contains(&id) {
                ids.push(id);
            }
        };

        for place in outputs {
            match *place {
                PlaceKind::Tensor(id) => push(id),
                PlaceKind::OutputPort(port) => push(
                    self.graph
                        .output_tensor(port)
                        .ok_or_else(|| EditError::invalid_place("output port is not connected"))?,
                ),
                PlaceKind::InputPort(port) => push(self.graph.input_tensor(port).ok_or_else(
                    || EditError::invalid_place("input port has no source tensor"),
                )?),
                PlaceKind::Operation(op_id) => {
                    for id in self.graph.operation(op_id)?.output_ids() {
                        push(id);
                    }
                }
            }
        }

        Ok(ids)
    }

    /// Check that every input of a forward closure is either cut, produced
    /// inside the closure or has no producer.
    fn check_forward_closure(
        &self,
        kept: &FxHashSet<NodeId>,
        cut_tensors: &FxHashSet<NodeId>,
        cut_ports: &FxHashSet<PortRef>,
    ) -> Result<(), EditError> {
        for &op_id in kept {
            let op = self.graph.operation(op_id)?;
            for (index, input) in op.input_ids().enumerate() {
                let Some(input) = input else {
                    continue;
                };
                if cut_ports.contains(&PortRef::new(op_id, index)) || cut_tensors.contains(&input)
                {
                    continue;
                }
                match self.graph.producer_of(input) {
                    Some(producer) if !kept.contains(&producer) => {
                        return Err(EditError::invalid_boundary(format!(
                            "input {} of \"{}\" is produced outside the subgraph",
                            index,
                            self.graph.node_name(op_id)
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Return the operations which read a cut tensor or own a cut port.
    fn direct_consumers(&self, cuts: &[Cut]) -> Result<FxHashSet<NodeId>, EditError> {
        let mut ops = FxHashSet::default();
        for cut in cuts {
            match *cut {
                Cut::Tensor(id) => {
                    ops.extend(self.graph.tensor(id)?.consumers().iter().map(|port| port.op));
                }
                Cut::Port(port) => {
                    ops.insert(port.op);
                }
            }
        }
        Ok(ops)
    }

    /// Return the output tensors of `kept`, in graph order.
    fn consumer_outputs(&self, kept: &FxHashSet<NodeId>) -> Vec<NodeId> {
        let mut outputs = Vec::new();
        for (op_id, op) in self.graph.operations() {
            if !kept.contains(&op_id) {
                continue;
            }
            for output in op.output_ids() {
                if !outputs.contains(&output) {
                    outputs.push(output);
                }
            }
        }
        outputs
    }

    /// Check that every declared output is a cut or computed by `kept`.
    fn check_outputs(
        &self,
        output_ids: &[NodeId],
        kept: &FxHashSet<NodeId>,
        cut_tensors: &FxHashSet<NodeId>,
    ) -> Result<(), EditError> {
        for &id in output_ids {
            if cut_tensors.contains(&id) {
                continue;
            }
            if !self.graph.producer_of(id).is_some_and(|op| kept.contains(&op)) {
                return Err(EditError::invalid_boundary(format!(
                    "output \"{}\" is not computed from the inputs",
                    self.graph.node_name(id)
                )));
            }
        }
        Ok(())
    }

    /// Check that every cut is used by the kept subgraph and does not detach
    /// a tensor from a producer that is kept.
    fn check_cuts(
        &self,
        cuts: &[Cut],
        kept: &FxHashSet<NodeId>,
        output_ids: &[NodeId],
    ) -> Result<(), EditError> {
        for cut in cuts {
            match *cut {
                Cut::Tensor(id) => {
                    if self.graph.producer_of(id).is_some_and(|op| kept.contains(&op)) {
                        return Err(EditError::invalid_boundary(format!(
                            "input \"{}\" is produced inside the subgraph",
                            self.graph.node_name(id)
                        )));
                    }
                    let used = output_ids.contains(&id)
                        || self.graph.tensor(id)?.consumers().iter().any(|port| kept.contains(&port.op));
                    if !used {
                        return Err(EditError::invalid_boundary(format!(
                            "input \"{}\" is not used by the subgraph",
                            self.graph.node_name(id)
                        )));
                    }
                }
                Cut::Port(port) => {
                    if !kept.contains(&port.op) {
                        return Err(EditError::invalid_boundary(format!(
                            "input {} of \"{}\" is not used by the subgraph",
                            port.index,
                            self.graph.node_name(port.op)
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Return the name for a placeholder replacing the source of `port`.
    fn placeholder_name(&self, port: PortRef, source: NodeId, occurrence: usize) -> String {
        match self.naming {
            PlaceholderNaming::Tensor => format!(
                "{}/placeholder_port_{}",
                self.graph.node_name(source),
                occurrence
            ),
            PlaceholderNaming::Consumer => {
                let consumer = self
                    .graph
                    .operation(port.op)
                    .ok()
                    .and_then(|op| op.output_ids().next())
                    .unwrap_or(port.op);
                format!(
                    "{}/placeholder_port_{}",
                    self.graph.node_name(consumer),
                    port.index
                )
            }
        }
    }

    fn build_graph(
        &self,
        cuts: &[Cut],
        cut_ports: &FxHashSet<PortRef>,
        kept: &FxHashSet<NodeId>,
        output_ids: &[NodeId],
    ) -> Result<Graph, EditError> {
        let mut builder = GraphCopier::new(self.graph);
        let mut name_gen = NodeNameGenerator::for_graph(self.graph);
        let mut input_ids = Vec::new();
        let mut placeholders: FxHashMap<PortRef, NodeId> = FxHashMap::default();
        let mut occurrences: FxHashMap<NodeId, usize> = FxHashMap::default();

        for cut in cuts {
            match *cut {
                Cut::Tensor(id) => input_ids.push(builder.tensor(id)?),
                Cut::Port(port) => {
                    let Some(source_id) = self.graph.input_tensor(port) else {
                        continue;
                    };
                    let occurrence = occurrences.entry(source_id).or_insert(0);
                    let name = name_gen.generate(&self.placeholder_name(port, source_id, *occurrence));
                    *occurrence += 1;

                    let source = self.graph.tensor(source_id)?;
                    let placeholder = builder.graph.add_tensor(
                        &[name.as_str()],
                        source.shape().clone(),
                        source.dtype(),
                    )?;
                    trace!(
                        "Replaced source of input {} of \"{}\" with placeholder \"{}\"",
                        port.index,
                        self.graph.node_name(port.op),
                        name
                    );
                    placeholders.insert(port, placeholder);
                    input_ids.push(placeholder);
                }
            }
        }

        // Retain original inputs which are still used.
        for &input_id in self.graph.input_ids() {
            let used = output_ids.contains(&input_id)
                || self
                    .graph
                    .tensor(input_id)?
                    .consumers()
                    .iter()
                    .any(|port| kept.contains(&port.op) && !cut_ports.contains(port));
            if !used {
                continue;
            }
            let new_id = builder.tensor(input_id)?;
            if !input_ids.contains(&new_id) {
                input_ids.push(new_id);
            }
        }

        for (op_id, op) in self.graph.operations() {
            if !kept.contains(&op_id) {
                continue;
            }

            let mut inputs = SmallVec::<[Port; 4]>::with_capacity(op.inputs().len());
            for (index, port) in op.inputs().iter().enumerate() {
                let tensor = match placeholders.get(&PortRef::new(op_id, index)) {
                    Some(placeholder) => Some(*placeholder),
                    None => port.tensor.map(|id| builder.tensor(id)).transpose()?,
                };
                inputs.push(Port {
                    name: port.name.clone(),
                    tensor,
                });
            }

            let mut outputs = SmallVec::<[Port; 2]>::with_capacity(op.outputs().len());
            for port in op.outputs() {
                outputs.push(Port {
                    name: port.name.clone(),
                    tensor: port.tensor.map(|id| builder.tensor(id)).transpose()?,
                });
            }

            builder.graph.add_operation_with_ports(
                op.name(),
                op.op_type(),
                op.attrs().clone(),
                inputs,
                outputs,
            )?;
        }

        let new_output_ids = output_ids
            .iter()
            .map(|id| builder.tensor(*id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut graph = builder.graph;
        graph.set_input_ids(&input_ids)?;
        graph.set_output_ids(&new_output_ids)?;
        Ok(graph)
    }
}

/// Copies tensors from a source graph into a new graph on first use.
struct GraphCopier<'a> {
    source: &'a Graph,
    graph: Graph,
    tensor_map: FxHashMap<NodeId, NodeId>,
}

impl<'a> GraphCopier<'a> {
    fn new(source: &'a Graph) -> Self {
        GraphCopier {
            source,
            graph: Graph::with_capacity(source.len()),
            tensor_map: FxHashMap::default(),
        }
    }

    /// Return the ID in the new graph of tensor `id` from the source graph.
    fn tensor(&mut self, id: NodeId) -> Result<NodeId, EditError> {
        if let Some(new_id) = self.tensor_map.get(&id) {
            return Ok(*new_id);
        }
        let tensor = self.source.tensor(id)?;
        let names: SmallVec<[&str; 2]> = tensor.names().iter().map(|s| s.as_str()).collect();
        let new_id = self
            .graph
            .add_tensor(&names, tensor.shape().clone(), tensor.dtype())?;
        self.tensor_map.insert(id, new_id);
        Ok(new_id)
    }
}
