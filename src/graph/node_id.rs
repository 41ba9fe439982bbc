use std::num::NonZero;

/// ID of an operation or tensor node in a [`Graph`](super::Graph).
///
/// IDs are indices into the graph's node list. They are only meaningful for
/// the graph that issued them. Editing a model produces a new graph, so IDs
/// must not be carried across edits.
#[derive(Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(NonZero<u32>);

impl NodeId {
    /// Return the underlying ID value as a usize, for slice indexing.
    pub fn as_usize(self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// Construct a node ID from a node list index.
    ///
    /// Panics if the index does not fit in a `u32`.
    pub fn from_index(index: usize) -> NodeId {
        let value = u32::try_from(index)
            .ok()
            .and_then(|v| v.checked_add(1))
            .and_then(NonZero::new);
        match value {
            Some(value) => NodeId(value),
            None => panic!("node index {} is too large", index),
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_usize().fmt(f)
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", self.as_usize())
    }
}
