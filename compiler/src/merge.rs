// merge.rs: Structural merge, branch merge and loop boundaries
//
// Two values of the same shape are combined wire by wire by a `LeafMerge`
// operator. The branch operator places a selector gated on the condition;
// the loop operator closes a loop-input with its feedback path.
//
// Preconditions: merged values have identical shapes (asserted).
// Postconditions: the merged value has that shape; identical producers on
//   both sides are reused rather than selected.
// Failure modes: none.
// Side effects: adds selector / loop nodes to the graph.

use indexmap::IndexMap;

use crate::graph::DataflowGraph;
use crate::shape::ScalarType;
use crate::values::{Alternative, Optional, RecordUnionValue, Signal, UnionValue, ValueTree};

/// Combines one pair of corresponding wires.
pub trait LeafMerge {
    fn merge_leaf(
        &mut self,
        graph: &mut DataflowGraph,
        ty: ScalarType,
        a: &Signal,
        b: &Signal,
    ) -> Signal;

    fn merge_flag(&mut self, graph: &mut DataflowGraph, a: &Signal, b: &Signal) -> Signal {
        self.merge_leaf(graph, ScalarType::Bool, a, b)
    }
}

/// Apply `op` pointwise over two values of the same shape. Record fields
/// are paired by name; the result keeps the field order of `a`.
pub fn merge<M: LeafMerge>(
    graph: &mut DataflowGraph,
    op: &mut M,
    a: &ValueTree,
    b: &ValueTree,
) -> ValueTree {
    assert_eq!(a.shape(), b.shape(), "merging values of different shapes");
    merge_tree(graph, op, a, b)
}

fn merge_tree<M: LeafMerge>(
    graph: &mut DataflowGraph,
    op: &mut M,
    a: &ValueTree,
    b: &ValueTree,
) -> ValueTree {
    match (a, b) {
        (ValueTree::Leaf(x), ValueTree::Leaf(y)) => {
            ValueTree::leaf(x.ty, op.merge_leaf(graph, x.ty, &x.signal, &y.signal))
        }
        (ValueTree::Record(x), ValueTree::Record(y)) => {
            ValueTree::Record(merge_fields(graph, op, x, y))
        }
        (ValueTree::Option(x), ValueTree::Option(y)) => {
            ValueTree::Option(Box::new(merge_optional(graph, op, x, y)))
        }
        (ValueTree::SimpleUnion(x), ValueTree::SimpleUnion(y)) => {
            ValueTree::SimpleUnion(merge_alts(graph, op, x, y))
        }
        (ValueTree::RecordUnion(x), ValueTree::RecordUnion(y)) => {
            ValueTree::RecordUnion(merge_record_union(graph, op, x, y))
        }
        (ValueTree::Union(x), ValueTree::Union(y)) => {
            let simple = merge_alts(graph, op, &x.simple, &y.simple);
            let has_record = op.merge_flag(graph, &x.has_record, &y.has_record);
            let records = merge_record_union(graph, op, &x.records, &y.records);
            ValueTree::Union(Box::new(UnionValue {
                simple,
                has_record,
                records,
            }))
        }
        _ => unreachable!("equal shapes have equal kinds"),
    }
}

fn merge_fields<M: LeafMerge>(
    graph: &mut DataflowGraph,
    op: &mut M,
    a: &IndexMap<String, ValueTree>,
    b: &IndexMap<String, ValueTree>,
) -> IndexMap<String, ValueTree> {
    a.iter()
        .map(|(name, x)| {
            let y = match b.get(name) {
                Some(y) => y,
                None => unreachable!("equal shapes have the same fields"),
            };
            (name.clone(), merge_tree(graph, op, x, y))
        })
        .collect()
}

fn merge_optional<M: LeafMerge>(
    graph: &mut DataflowGraph,
    op: &mut M,
    a: &Optional,
    b: &Optional,
) -> Optional {
    Optional {
        has: op.merge_flag(graph, &a.has, &b.has),
        val: merge_tree(graph, op, &a.val, &b.val),
    }
}

fn merge_alts<M: LeafMerge>(
    graph: &mut DataflowGraph,
    op: &mut M,
    a: &[Alternative],
    b: &[Alternative],
) -> Vec<Alternative> {
    a.iter()
        .zip(b)
        .map(|(x, y)| Alternative {
            ty: x.ty,
            has: op.merge_flag(graph, &x.has, &y.has),
            val: op.merge_leaf(graph, x.ty, &x.val, &y.val),
        })
        .collect()
}

fn merge_record_union<M: LeafMerge>(
    graph: &mut DataflowGraph,
    op: &mut M,
    a: &RecordUnionValue,
    b: &RecordUnionValue,
) -> RecordUnionValue {
    let shared = merge_fields(graph, op, &a.shared, &b.shared);
    let specific = a
        .specific
        .iter()
        .map(|(name, x)| {
            let y = match b.specific.get(name) {
                Some(y) => y,
                None => unreachable!("equal shapes have the same fields"),
            };
            (name.clone(), merge_optional(graph, op, x, y))
        })
        .collect();
    RecordUnionValue { shared, specific }
}

// ── Branches ────────────────────────────────────────────────────────────────

struct BranchMerge<'a> {
    cond: &'a Signal,
}

impl LeafMerge for BranchMerge<'_> {
    fn merge_leaf(
        &mut self,
        graph: &mut DataflowGraph,
        _ty: ScalarType,
        a: &Signal,
        b: &Signal,
    ) -> Signal {
        if a.same_producer(b) {
            a.clone()
        } else {
            graph.branch_select(self.cond, a, b)
        }
    }
}

/// Join the values a variable holds at the end of the two arms of a branch.
pub fn end_if(
    graph: &mut DataflowGraph,
    cond: &Signal,
    on_true: &ValueTree,
    on_false: &ValueTree,
) -> ValueTree {
    merge(graph, &mut BranchMerge { cond }, on_true, on_false)
}

// ── Loops ───────────────────────────────────────────────────────────────────

/// Wrap every wire of `value` in a loop-input node.
pub fn start_while(graph: &mut DataflowGraph, value: &ValueTree) -> ValueTree {
    value.map_signals("", &mut |_, signal, _, _| graph.loop_input(signal))
}

#[derive(Debug, Clone)]
pub struct LoopExit {
    pub value: ValueTree,
    /// Whether the body changed any wire of the value.
    pub changed: bool,
}

struct LoopClose<'a> {
    cond: &'a Signal,
    changed: bool,
}

impl LeafMerge for LoopClose<'_> {
    fn merge_leaf(
        &mut self,
        graph: &mut DataflowGraph,
        _ty: ScalarType,
        pre: &Signal,
        post: &Signal,
    ) -> Signal {
        if pre.same_producer(post) {
            if graph.live_consumers(pre.node) == 0 {
                if let Some(origin) = graph.loop_origin(pre.node) {
                    graph.elide_loop_input(pre.node);
                    return origin;
                }
            }
        } else {
            self.changed = true;
        }
        graph.loop_feedback(self.cond, pre, post)
    }
}

/// Close the loop around a value: `pre` is the loop-input value produced by
/// `start_while`, `post` the value at the end of the body.
pub fn end_while(
    graph: &mut DataflowGraph,
    cond: &Signal,
    pre: &ValueTree,
    post: &ValueTree,
) -> LoopExit {
    let mut op = LoopClose {
        cond,
        changed: false,
    };
    let value = merge(graph, &mut op, pre, post);
    LoopExit {
        value,
        changed: op.changed,
    }
}
