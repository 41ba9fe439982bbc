use rustc_hash::FxHashSet;

use super::{Graph, GraphError, NodeId, PortRef};

/// Planner answers ordering and reachability questions about a graph.
///
/// It is used to sort operations into dependency order, detect cycles and
/// find the set of operations between a set of boundary tensors and ports.
pub struct Planner<'a> {
    graph: &'a Graph,
}

/// Visit state of an operation during a depth-first traversal.
#[derive(Copy, Clone, PartialEq)]
enum VisitState {
    InProgress,
    Done,
}

impl<'a> Planner<'a> {
    /// Create a planner for a graph.
    pub fn with_graph(graph: &'a Graph) -> Self {
        Planner { graph }
    }

    /// Return all operations in an order where every operation comes after
    /// the producers of its inputs.
    ///
    /// Among operations that do not depend on each other, the order in which
    /// they were added to the graph is preserved as far as possible.
    pub fn sorted_operations(&self) -> Result<Vec<NodeId>, GraphError> {
        // A helper struct is used as recursive closures are not supported in
        // Rust.
        struct SortBuilder<'a> {
            graph: &'a Graph,
            state: Vec<Option<VisitState>>,
            plan: Vec<NodeId>,
        }

        impl SortBuilder<'_> {
            fn visit(&mut self, op_id: NodeId) -> Result<(), GraphError> {
                match self.state[op_id.as_usize()] {
                    Some(VisitState::Done) => return Ok(()),
                    Some(VisitState::InProgress) => {
                        return Err(GraphError::Cycle {
                            operation: self.graph.node_name(op_id),
                        })
                    }
                    None => {}
                }
                self.state[op_id.as_usize()] = Some(VisitState::InProgress);

                let op = self.graph.operation(op_id)?;
                for input_id in op.input_ids().flatten() {
                    if let Some(producer_id) = self.graph.producer_of(input_id) {
                        self.visit(producer_id)?;
                    }
                }

                self.state[op_id.as_usize()] = Some(VisitState::Done);
                self.plan.push(op_id);
                Ok(())
            }
        }

        let mut builder = SortBuilder {
            graph: self.graph,
            state: vec![None; self.graph.len()],
            plan: Vec::with_capacity(self.graph.operation_count()),
        };
        for (op_id, _) in self.graph.operations() {
            builder.visit(op_id)?;
        }
        Ok(builder.plan)
    }

    /// Return the operations needed to compute `outputs`, walking backwards
    /// from them.
    ///
    /// The walk does not go past tensors in `cut_tensors` or input ports in
    /// `cut_ports`. Values reaching the kept operations through those cuts are
    /// treated as if they were provided from outside.
    pub fn backward_closure(
        &self,
        outputs: &[NodeId],
        cut_tensors: &FxHashSet<NodeId>,
        cut_ports: &FxHashSet<PortRef>,
    ) -> FxHashSet<NodeId> {
        let mut kept = FxHashSet::default();
        let mut pending: Vec<NodeId> = outputs
            .iter()
            .filter(|id| !cut_tensors.contains(id))
            .filter_map(|id| self.graph.producer_of(*id))
            .collect();

        while let Some(op_id) = pending.pop() {
            if !kept.insert(op_id) {
                continue;
            }
            let Ok(op) = self.graph.operation(op_id) else {
                continue;
            };
            for (index, input_id) in op.input_ids().enumerate() {
                let Some(input_id) = input_id else {
                    continue;
                };
                if cut_ports.contains(&PortRef::new(op_id, index)) || cut_tensors.contains(&input_id)
                {
                    continue;
                }
                if let Some(producer_id) = self.graph.producer_of(input_id) {
                    pending.push(producer_id);
                }
            }
        }

        kept
    }

    /// Return the operations that transitively consume `tensors` or own one
    /// of `ports`, walking forwards.
    pub fn forward_closure(&self, tensors: &[NodeId], ports: &[PortRef]) -> FxHashSet<NodeId> {
        let mut kept = FxHashSet::default();
        let mut pending: Vec<NodeId> = ports.iter().map(|port| port.op).collect();
        for &tensor_id in tensors {
            if let Ok(tensor) = self.graph.tensor(tensor_id) {
                pending.extend(tensor.consumers().iter().map(|port| port.op));
            }
        }

        while let Some(op_id) = pending.pop() {
            if !kept.insert(op_id) {
                continue;
            }
            let Ok(op) = self.graph.operation(op_id) else {
                continue;
            };
            for output_id in op.output_ids() {
                if let Ok(tensor) = self.graph.tensor(output_id) {
                    pending.extend(tensor.consumers().iter().map(|port| port.op));
                }
            }
        }

        kept
    }

    /// Return operations whose outputs do not contribute to any graph output,
    /// in the order they were added to the graph.
    pub fn unreachable_operations(&self) -> Vec<NodeId> {
        let reachable = self.backward_closure(
            self.graph.output_ids(),
            &FxHashSet::default(),
            &FxHashSet::default(),
        );
        self.graph
            .operations()
            .map(|(id, _)| id)
            .filter(|id| !reachable.contains(id))
            .collect()
    }
}
