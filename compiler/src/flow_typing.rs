// flow_typing.rs: Runtime type tests over presence flags
//
// `x is T` compiles to a boolean expression over the presence flags of
// `x`'s value tree. Conjunctions and disjunctions with the shared `true` /
// `false` constants fold without creating nodes, so statically decided tests
// come out as those constants.
//
// Preconditions: `value` was built in `graph`.
// Postconditions: the result is a boolean signal; a test that can never
//   succeed yields the `false` constant and records `IncompatibleType`.
// Failure modes: `LowerError::UnsupportedFlowTyping` for shape pairs with no
//   test.
// Side effects: adds `and` / `or` / `not` nodes; appends notices.

use indexmap::IndexMap;

use crate::diag::Notice;
use crate::error::LowerError;
use crate::graph::{BinaryOp, DataflowGraph, UnaryOp};
use crate::id::Loc;
use crate::shape::{ScalarType, SimpleUnionShape, TypeShape};
use crate::values::{Alternative, FieldSource, Signal, ValueTree};

/// Compile `value is target` into a boolean signal.
pub fn flow_type(
    graph: &mut DataflowGraph,
    target: &TypeShape,
    value: &ValueTree,
    loc: Option<Loc>,
    notices: &mut Vec<Notice>,
) -> Result<Signal, LowerError> {
    FlowTyper {
        graph,
        loc,
        notices,
    }
    .test(target, value)
}

struct FlowTyper<'a> {
    graph: &'a mut DataflowGraph,
    loc: Option<Loc>,
    notices: &'a mut Vec<Notice>,
}

impl FlowTyper<'_> {
    fn test(&mut self, target: &TypeShape, value: &ValueTree) -> Result<Signal, LowerError> {
        if value.shape() == *target {
            return Ok(self.graph.boolean(true));
        }
        let unsupported = || LowerError::UnsupportedFlowTyping {
            target: target.clone(),
            value: value.shape(),
        };

        match (target, value) {
            (TypeShape::Leaf(_), ValueTree::Leaf(_)) => Ok(self.incompatible()),
            (TypeShape::Leaf(ty), ValueTree::SimpleUnion(alts)) => Ok(self.alt_flag(alts, *ty)),
            (TypeShape::Leaf(ty), ValueTree::Union(u)) => Ok(self.alt_flag(&u.simple, *ty)),
            (TypeShape::Leaf(_), ValueTree::Option(opt)) if opt.val.shape() == *target => {
                Ok(opt.has.clone())
            }

            (TypeShape::SimpleUnion(su), ValueTree::Leaf(leaf)) => {
                if su.options.contains(&leaf.ty) {
                    Ok(self.graph.boolean(true))
                } else {
                    Ok(self.incompatible())
                }
            }
            (TypeShape::SimpleUnion(su), ValueTree::SimpleUnion(alts)) => {
                Ok(self.any_alt(su, alts))
            }
            (TypeShape::SimpleUnion(su), ValueTree::Union(u)) => Ok(self.any_alt(su, &u.simple)),

            (TypeShape::Record(r), ValueTree::Record(_) | ValueTree::RecordUnion(_)) => {
                let fields = value.field_sources().ok_or_else(unsupported)?;
                self.fit(&r.fields, &IndexMap::new(), &fields)
            }
            (TypeShape::Record(r), ValueTree::Union(u)) => {
                let fit = self.fit(&r.fields, &IndexMap::new(), &u.records.field_sources())?;
                Ok(self.and(&u.has_record, &fit))
            }

            (TypeShape::RecordUnion(ru), ValueTree::Record(_) | ValueTree::RecordUnion(_)) => {
                let fields = value.field_sources().ok_or_else(unsupported)?;
                self.fit(&ru.shared, &ru.specific, &fields)
            }
            (TypeShape::RecordUnion(ru), ValueTree::Union(u)) => {
                let fit = self.fit(&ru.shared, &ru.specific, &u.records.field_sources())?;
                Ok(self.and(&u.has_record, &fit))
            }

            (TypeShape::Union(t), ValueTree::Union(u)) => {
                let simple = match self.or_flags(&t.simple, &u.simple) {
                    Some(flag) => flag,
                    None => self.graph.boolean(false),
                };
                let records = u.records.field_sources();
                let fit = self.fit(&t.records.shared, &t.records.specific, &records)?;
                let records = self.and(&u.has_record, &fit);
                Ok(self.or(&simple, &records))
            }
            (TypeShape::Union(t), ValueTree::Leaf(_) | ValueTree::SimpleUnion(_)) => {
                self.test(&TypeShape::SimpleUnion(t.simple.clone()), value)
            }
            (TypeShape::Union(t), ValueTree::Record(_) | ValueTree::RecordUnion(_)) => {
                self.test(&TypeShape::RecordUnion(t.records.clone()), value)
            }

            (TypeShape::Option(inner), ValueTree::Option(opt)) => {
                let payload = self.test(inner, &opt.val)?;
                Ok(self.and(&opt.has, &payload))
            }

            _ => Err(unsupported()),
        }
    }

    /// Test a record-like value against required and optional target fields.
    fn fit(
        &mut self,
        required: &IndexMap<String, TypeShape>,
        optional: &IndexMap<String, TypeShape>,
        fields: &IndexMap<&str, FieldSource<'_>>,
    ) -> Result<Signal, LowerError> {
        let mut acc = self.graph.boolean(true);

        for (name, source) in fields {
            if required.contains_key(*name) || optional.contains_key(*name) {
                continue;
            }
            match source {
                FieldSource::Shared(_) => return Ok(self.incompatible()),
                FieldSource::Specific(opt) => {
                    let absent = self.not(&opt.has);
                    acc = self.and(&acc, &absent);
                }
            }
        }

        for (name, shape) in required {
            let term = match fields.get(name.as_str()) {
                Some(FieldSource::Shared(v)) => self.test(shape, v)?,
                Some(FieldSource::Specific(opt)) => {
                    let payload = self.test(shape, &opt.val)?;
                    self.and(&opt.has, &payload)
                }
                None => return Ok(self.incompatible()),
            };
            acc = self.and(&acc, &term);
        }

        for (name, shape) in optional {
            let term = match fields.get(name.as_str()) {
                Some(FieldSource::Shared(v)) => self.test(shape, v)?,
                Some(FieldSource::Specific(opt)) => {
                    let payload = self.test(shape, &opt.val)?;
                    let absent = self.not(&opt.has);
                    self.or(&absent, &payload)
                }
                None => continue,
            };
            acc = self.and(&acc, &term);
        }

        Ok(acc)
    }

    fn alt_flag(&mut self, alts: &[Alternative], ty: ScalarType) -> Signal {
        match alts.iter().find(|a| a.ty == ty) {
            Some(alt) => alt.has.clone(),
            None => self.incompatible(),
        }
    }

    fn any_alt(&mut self, target: &SimpleUnionShape, alts: &[Alternative]) -> Signal {
        match self.or_flags(target, alts) {
            Some(flag) => flag,
            None => self.incompatible(),
        }
    }

    /// OR of the flags of the alternatives `target` admits; `None` if none.
    fn or_flags(&mut self, target: &SimpleUnionShape, alts: &[Alternative]) -> Option<Signal> {
        let flags: Vec<Signal> = alts
            .iter()
            .filter(|a| target.options.contains(&a.ty))
            .map(|a| a.has.clone())
            .collect();
        if flags.is_empty() {
            return None;
        }
        let mut acc = self.graph.boolean(false);
        for flag in &flags {
            acc = self.or(&acc, flag);
        }
        Some(acc)
    }

    fn incompatible(&mut self) -> Signal {
        tracing::warn!(loc = ?self.loc, "type test can never succeed");
        self.notices.push(Notice::IncompatibleType { loc: self.loc });
        self.graph.boolean(false)
    }

    // ── Folding boolean builders ─────────────────────────────────────────

    fn and(&mut self, a: &Signal, b: &Signal) -> Signal {
        if self.graph.is_false(a) || self.graph.is_false(b) {
            self.graph.boolean(false)
        } else if self.graph.is_true(a) || a.same_producer(b) {
            b.clone()
        } else if self.graph.is_true(b) {
            a.clone()
        } else {
            self.graph.binary(BinaryOp::And, ScalarType::Bool, a, b)
        }
    }

    fn or(&mut self, a: &Signal, b: &Signal) -> Signal {
        if self.graph.is_true(a) || self.graph.is_true(b) {
            self.graph.boolean(true)
        } else if self.graph.is_false(a) || a.same_producer(b) {
            b.clone()
        } else if self.graph.is_false(b) {
            a.clone()
        } else {
            self.graph.binary(BinaryOp::Or, ScalarType::Bool, a, b)
        }
    }

    fn not(&mut self, a: &Signal) -> Signal {
        if self.graph.is_true(a) {
            self.graph.boolean(false)
        } else if self.graph.is_false(a) {
            self.graph.boolean(true)
        } else {
            self.graph.unary(UnaryOp::Not, ScalarType::Bool, a)
        }
    }
}
