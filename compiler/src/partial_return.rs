// partial_return.rs: Pending return values keyed by branch conditions
//
// A return inside a conditional only decides the function result on some
// paths. The tree records, per branch, either the completed return values
// or an open slot still waiting for a later `return` on that path. Once no
// slot is open, the tree collapses into one value per return with branch
// merges.
//
// Preconditions: every completed sequence in a tree has the same shapes.
// Postconditions: `resolve` yields one value per declared return.
// Failure modes: none (resolving an open tree is a defect).
// Side effects: `resolve` adds selector nodes.

use crate::graph::DataflowGraph;
use crate::id::Loc;
use crate::merge::end_if;
use crate::values::{Signal, ValueTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialReturn {
    /// Return values decided on every path reaching this node.
    Complete(Vec<ValueTree>),
    /// A conditional return; `None` marks an open slot.
    Branch {
        cond: Signal,
        loc: Loc,
        on_true: Option<Box<PartialReturn>>,
        on_false: Option<Box<PartialReturn>>,
    },
}

impl PartialReturn {
    pub fn branch(
        cond: Signal,
        loc: Loc,
        on_true: Option<PartialReturn>,
        on_false: Option<PartialReturn>,
    ) -> Self {
        PartialReturn::Branch {
            cond,
            loc,
            on_true: on_true.map(Box::new),
            on_false: on_false.map(Box::new),
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, PartialReturn::Branch { .. })
    }

    /// Whether some path through the tree has no return yet.
    pub fn is_partial(&self) -> bool {
        match self {
            PartialReturn::Complete(_) => false,
            PartialReturn::Branch {
                on_true, on_false, ..
            } => {
                on_true.as_ref().map_or(true, |t| t.is_partial())
                    || on_false.as_ref().map_or(true, |f| f.is_partial())
            }
        }
    }

    /// Fill every open slot with `rest`. Completed nodes are left unchanged.
    pub fn complete(&self, rest: &PartialReturn) -> PartialReturn {
        match self {
            PartialReturn::Complete(_) => self.clone(),
            PartialReturn::Branch {
                cond,
                loc,
                on_true,
                on_false,
            } => PartialReturn::Branch {
                cond: cond.clone(),
                loc: *loc,
                on_true: Some(Box::new(fill(on_true, rest))),
                on_false: Some(Box::new(fill(on_false, rest))),
            },
        }
    }

    /// Collapse a fully completed tree into one value per return.
    pub fn resolve(&self, graph: &mut DataflowGraph) -> Vec<ValueTree> {
        match self {
            PartialReturn::Complete(values) => values.clone(),
            PartialReturn::Branch {
                cond,
                on_true,
                on_false,
                ..
            } => {
                let (Some(t), Some(f)) = (on_true, on_false) else {
                    panic!("resolving a partial return with an open path");
                };
                let t = t.resolve(graph);
                let f = f.resolve(graph);
                assert_eq!(t.len(), f.len(), "return arity differs between branches");
                t.iter()
                    .zip(&f)
                    .map(|(a, b)| end_if(graph, cond, a, b))
                    .collect()
            }
        }
    }
}

fn fill(slot: &Option<Box<PartialReturn>>, rest: &PartialReturn) -> PartialReturn {
    match slot {
        Some(node) => node.complete(rest),
        None => rest.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::shape::ScalarType;

    const S32: ScalarType = ScalarType::Signed(32);

    fn leaf(g: &mut DataflowGraph, name: &str) -> ValueTree {
        ValueTree::leaf(S32, g.input(name, S32))
    }

    #[test]
    fn open_branch_is_partial_until_completed() {
        let mut g = DataflowGraph::new("t");
        let c = g.input("c", ScalarType::Bool);
        let a = leaf(&mut g, "a");
        let b = leaf(&mut g, "b");
        let tree = PartialReturn::branch(c, Loc(0), Some(PartialReturn::Complete(vec![a])), None);
        assert!(tree.is_partial());
        let done = tree.complete(&PartialReturn::Complete(vec![b]));
        assert!(!done.is_partial());
        let out = done.resolve(&mut g);
        assert_eq!(out.len(), 1);
        assert_eq!(g.count_kind(|k| matches!(k, NodeKind::BranchSelect)), 1);
    }

    #[test]
    fn completing_a_complete_tree_is_identity() {
        let mut g = DataflowGraph::new("t");
        let a = leaf(&mut g, "a");
        let b = leaf(&mut g, "b");
        let tree = PartialReturn::Complete(vec![a]);
        assert_eq!(tree.complete(&PartialReturn::Complete(vec![b])), tree);
    }

    #[test]
    fn nested_open_slots_all_filled() {
        let mut g = DataflowGraph::new("t");
        let c1 = g.input("c1", ScalarType::Bool);
        let c2 = g.input("c2", ScalarType::Bool);
        let a = leaf(&mut g, "a");
        let r = leaf(&mut g, "r");
        let inner = PartialReturn::branch(c2, Loc(1), None, Some(PartialReturn::Complete(vec![a])));
        let outer = PartialReturn::branch(c1, Loc(0), Some(inner), None);
        let done = outer.complete(&PartialReturn::Complete(vec![r]));
        assert!(!done.is_partial());
        done.resolve(&mut g);
        assert_eq!(g.count_kind(|k| matches!(k, NodeKind::BranchSelect)), 2);
    }

    #[test]
    #[should_panic(expected = "open path")]
    fn resolving_open_tree_panics() {
        let mut g = DataflowGraph::new("t");
        let c = g.input("c", ScalarType::Bool);
        PartialReturn::branch(c, Loc(0), None, None).resolve(&mut g);
    }
}
