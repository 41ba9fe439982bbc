use rustc_hash::FxHashMap;

use crate::graph::{Graph, NodeId};

/// Index of operations by name.
///
/// Tensor names are indexed by the [`Graph`] itself, since they are required
/// to be unique. Operation names are not, so a name shared by several
/// operations is recorded as ambiguous and does not resolve.
#[derive(Clone, Debug, Default)]
pub(crate) struct PlaceRegistry {
    /// Map of operation name to operation ID, or `None` if the name is used by
    /// more than one operation.
    operations: FxHashMap<String, Option<NodeId>>,
}

impl PlaceRegistry {
    pub fn build(graph: &Graph) -> PlaceRegistry {
        let mut operations = FxHashMap::default();
        for (op_id, op) in graph.operations() {
            let Some(name) = op.name() else {
                continue;
            };
            operations
                .entry(name.to_string())
                .and_modify(|entry| *entry = None)
                .or_insert(Some(op_id));
        }
        PlaceRegistry { operations }
    }

    /// Look up an operation by name. Returns `None` if no operation, or more
    /// than one operation, has the name.
    pub fn operation(&self, name: &str) -> Option<NodeId> {
        self.operations.get(name).copied().flatten()
    }
}
