// id.rs: Stable identifiers for the lowering engine
//
// Graph handles are plain indices into the per-function arena; IR handles
// (variable indices, locations) are assigned upstream and carried through
// lowering unchanged so diagnostics can point back at the source.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a node within one function's dataflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

/// Index of an arrow within one function's dataflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EdgeId(pub u32);

/// Source variable index. Parameters occupy `0..params.len()`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VarIndex(pub u32);

/// Location of an IR construct, as assigned by the front end.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Loc(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for VarIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocator for IR identifiers. Produces monotonically increasing IDs in
/// allocation order, ensuring deterministic assignment when IR is built
/// programmatically.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_loc: u32,
    next_var: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_loc(&mut self) -> Loc {
        let id = Loc(self.next_loc);
        self.next_loc += 1;
        id
    }

    pub fn alloc_var(&mut self) -> VarIndex {
        let id = VarIndex(self.next_var);
        self.next_var += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_monotonic_per_kind() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.alloc_loc(), Loc(0));
        assert_eq!(ids.alloc_var(), VarIndex(0));
        assert_eq!(ids.alloc_loc(), Loc(1));
        assert_eq!(ids.alloc_var(), VarIndex(1));
    }

    #[test]
    fn display_forms() {
        assert_eq!(NodeId(4).to_string(), "n4");
        assert_eq!(VarIndex(2).to_string(), "%2");
        assert_eq!(Loc(17).to_string(), "#17");
    }
}
