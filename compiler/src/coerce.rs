// coerce.rs: Undefined values and structural coercion
//
// Coercion widens a value tree to a target shape that subsumes it: a scalar
// becomes one alternative of a union, a record becomes one variant of a
// record union, and so on. Wires the source cannot supply are bound to the
// undefined constant (data) or `false` (presence flags).
//
// Preconditions: `value` was built in `graph`.
// Postconditions: a successful `coerce(g, v, s)` has shape `s`; coercing to
//   the value's own shape returns it unchanged and creates no node.
// Failure modes: `LowerError::UnrelatedType` when `s` does not subsume `v`.
// Side effects: may add constant nodes to `graph`.

use indexmap::IndexMap;

use crate::error::LowerError;
use crate::graph::DataflowGraph;
use crate::shape::{RecordUnionShape, ScalarType, SimpleUnionShape, TypeShape};
use crate::values::{
    build_alts, build_record_union, Alternative, FieldSource, LeafRole, LeafValue, Optional,
    RecordUnionValue, Signal, UnionValue, ValueTree,
};

/// A value of `shape` whose data wires are undefined and flags are `false`.
pub fn undef(graph: &mut DataflowGraph, shape: &TypeShape) -> ValueTree {
    ValueTree::build(shape, "", &mut undef_leaf(graph))
}

fn undef_leaf(graph: &mut DataflowGraph) -> impl FnMut(&str, ScalarType, LeafRole) -> Signal + '_ {
    move |_, ty, role| match role {
        LeafRole::Data => graph.undef(ty),
        LeafRole::Flag => graph.boolean(false),
    }
}

fn undef_alts(graph: &mut DataflowGraph, shape: &SimpleUnionShape) -> Vec<Alternative> {
    build_alts(shape, "", &mut undef_leaf(graph))
}

fn undef_record_union(graph: &mut DataflowGraph, shape: &RecordUnionShape) -> RecordUnionValue {
    build_record_union(shape, "", &mut undef_leaf(graph))
}

/// Widen `value` to `target`.
pub fn coerce(
    graph: &mut DataflowGraph,
    value: &ValueTree,
    target: &TypeShape,
) -> Result<ValueTree, LowerError> {
    let source = value.shape();
    if source.same_layout(target) {
        return Ok(value.clone());
    }
    let unrelated = || LowerError::unrelated(target, &source);

    match target {
        TypeShape::Leaf(_) => Err(unrelated()),

        TypeShape::Record(r) => {
            let ValueTree::Record(fields) = value else {
                return Err(unrelated());
            };
            if fields.len() != r.fields.len() || !fields.keys().all(|k| r.fields.contains_key(k)) {
                return Err(unrelated());
            }
            let mut out = IndexMap::with_capacity(r.fields.len());
            for (name, shape) in &r.fields {
                out.insert(name.clone(), coerce(graph, &fields[name.as_str()], shape)?);
            }
            Ok(ValueTree::Record(out))
        }

        TypeShape::Option(inner) => {
            let opt = match value {
                ValueTree::Option(opt) => Optional {
                    has: opt.has.clone(),
                    val: coerce(graph, &opt.val, inner)?,
                },
                other => Optional {
                    has: graph.boolean(true),
                    val: coerce(graph, other, inner)?,
                },
            };
            Ok(ValueTree::Option(Box::new(opt)))
        }

        TypeShape::SimpleUnion(u) => {
            let alts = match value {
                ValueTree::Leaf(leaf) => alts_from_leaf(graph, leaf, u),
                ValueTree::SimpleUnion(alts) => alts_from_alts(graph, alts, u),
                _ => None,
            };
            alts.map(ValueTree::SimpleUnion).ok_or_else(unrelated)
        }

        TypeShape::RecordUnion(u) => {
            let fields = value.field_sources().ok_or_else(unrelated)?;
            match record_union_from(graph, &fields, u)? {
                Some(ru) => Ok(ValueTree::RecordUnion(ru)),
                None => Err(unrelated()),
            }
        }

        TypeShape::Union(u) => {
            let union = match value {
                ValueTree::Union(src) => {
                    let simple = alts_from_alts(graph, &src.simple, &u.simple);
                    let fields = src.records.field_sources();
                    let records = record_union_from(graph, &fields, &u.records)?;
                    match (simple, records) {
                        (Some(simple), Some(records)) => Some(UnionValue {
                            simple,
                            has_record: src.has_record.clone(),
                            records,
                        }),
                        _ => None,
                    }
                }
                ValueTree::Leaf(_) | ValueTree::SimpleUnion(_) => {
                    let simple = match value {
                        ValueTree::Leaf(leaf) => alts_from_leaf(graph, leaf, &u.simple),
                        ValueTree::SimpleUnion(alts) => alts_from_alts(graph, alts, &u.simple),
                        _ => None,
                    };
                    match simple {
                        Some(simple) => Some(UnionValue {
                            simple,
                            has_record: graph.boolean(false),
                            records: undef_record_union(graph, &u.records),
                        }),
                        None => None,
                    }
                }
                ValueTree::Record(_) | ValueTree::RecordUnion(_) => {
                    let fields = value.field_sources().ok_or_else(unrelated)?;
                    match record_union_from(graph, &fields, &u.records)? {
                        Some(records) => Some(UnionValue {
                            simple: undef_alts(graph, &u.simple),
                            has_record: graph.boolean(true),
                            records,
                        }),
                        None => None,
                    }
                }
                ValueTree::Option(_) => None,
            };
            union
                .map(|u| ValueTree::Union(Box::new(u)))
                .ok_or_else(unrelated)
        }
    }
}

// ── Scalar alternatives ─────────────────────────────────────────────────────

fn alts_from_leaf(
    graph: &mut DataflowGraph,
    leaf: &LeafValue,
    target: &SimpleUnionShape,
) -> Option<Vec<Alternative>> {
    if !target.options.contains(&leaf.ty) {
        return None;
    }
    Some(
        target
            .options
            .iter()
            .map(|&ty| {
                if ty == leaf.ty {
                    Alternative {
                        ty,
                        has: graph.boolean(true),
                        val: leaf.signal.clone(),
                    }
                } else {
                    Alternative {
                        ty,
                        has: graph.boolean(false),
                        val: graph.undef(ty),
                    }
                }
            })
            .collect(),
    )
}

fn alts_from_alts(
    graph: &mut DataflowGraph,
    alts: &[Alternative],
    target: &SimpleUnionShape,
) -> Option<Vec<Alternative>> {
    if alts.iter().any(|a| !target.options.contains(&a.ty)) {
        return None;
    }
    Some(
        target
            .options
            .iter()
            .map(|&ty| match alts.iter().find(|a| a.ty == ty) {
                Some(alt) => alt.clone(),
                None => Alternative {
                    ty,
                    has: graph.boolean(false),
                    val: graph.undef(ty),
                },
            })
            .collect(),
    )
}

// ── Record variants ─────────────────────────────────────────────────────────

/// Build the record-union part of `target` from source fields. `Ok(None)`
/// when the field sets are incompatible; `Err` when a field's own coercion
/// fails.
fn record_union_from(
    graph: &mut DataflowGraph,
    fields: &IndexMap<&str, FieldSource<'_>>,
    target: &RecordUnionShape,
) -> Result<Option<RecordUnionValue>, LowerError> {
    if fields.keys().any(|name| target.field(name).is_none()) {
        return Ok(None);
    }

    let mut out = RecordUnionValue::default();
    for (name, shape) in &target.shared {
        let Some(FieldSource::Shared(v)) = fields.get(name.as_str()) else {
            return Ok(None);
        };
        out.shared.insert(name.clone(), coerce(graph, v, shape)?);
    }
    for (name, shape) in &target.specific {
        let opt = match fields.get(name.as_str()) {
            Some(FieldSource::Shared(v)) => Optional {
                has: graph.boolean(true),
                val: coerce(graph, v, shape)?,
            },
            Some(FieldSource::Specific(o)) => Optional {
                has: o.has.clone(),
                val: coerce(graph, &o.val, shape)?,
            },
            None => Optional {
                has: graph.boolean(false),
                val: undef(graph, shape),
            },
        };
        out.specific.insert(name.clone(), opt);
    }
    Ok(Some(out))
}
