// alias.rs: Reinterpreting a value under a narrower view
//
// An alias selects the part of a value tree that a narrower type occupies:
// one alternative's payload, the record part of a general union, a subset
// of scalar alternatives. It is pure relabelling: no node is ever created.
//
// Preconditions: none.
// Postconditions: a successful `alias(s, v)` has shape `s` and only
//   producers already referenced by `v`.
// Failure modes: `LowerError::UnsupportedAlias` when `s` is not a view of `v`.
// Side effects: none.

use indexmap::IndexMap;

use crate::error::LowerError;
use crate::shape::{RecordUnionShape, SimpleUnionShape, TypeShape};
use crate::values::{
    Alternative, FieldSource, Optional, RecordUnionValue, UnionValue, ValueTree,
};

pub fn alias(target: &TypeShape, value: &ValueTree) -> Result<ValueTree, LowerError> {
    if value.shape().same_layout(target) {
        return Ok(value.clone());
    }
    let unsupported = || LowerError::UnsupportedAlias {
        target: target.clone(),
        value: value.shape(),
    };

    let view = match (target, value) {
        (TypeShape::Leaf(ty), ValueTree::SimpleUnion(alts)) => alts
            .iter()
            .find(|a| a.ty == *ty)
            .map(|a| ValueTree::leaf(a.ty, a.val.clone())),
        (TypeShape::Leaf(ty), ValueTree::Union(u)) => u
            .simple
            .iter()
            .find(|a| a.ty == *ty)
            .map(|a| ValueTree::leaf(a.ty, a.val.clone())),

        (TypeShape::Record(r), ValueTree::Record(fields)) if fields.len() != r.fields.len() => {
            None
        }
        (TypeShape::Record(r), ValueTree::Record(_) | ValueTree::RecordUnion(_)) => {
            let fields = value.field_sources().ok_or_else(unsupported)?;
            record_view(&r.fields, &fields)?
        }
        (TypeShape::Record(r), ValueTree::Union(u)) => {
            record_view(&r.fields, &u.records.field_sources())?
        }

        (TypeShape::SimpleUnion(t), ValueTree::SimpleUnion(alts)) => alts_view(t, alts)
            .map(ValueTree::SimpleUnion),
        (TypeShape::SimpleUnion(t), ValueTree::Union(u)) => {
            alts_view(t, &u.simple).map(ValueTree::SimpleUnion)
        }

        (TypeShape::RecordUnion(t), ValueTree::RecordUnion(ru)) => {
            record_union_view(t, ru)?.map(ValueTree::RecordUnion)
        }
        (TypeShape::RecordUnion(t), ValueTree::Union(u)) => {
            record_union_view(t, &u.records)?.map(ValueTree::RecordUnion)
        }

        (TypeShape::Union(t), ValueTree::Union(u)) => {
            match (alts_view(&t.simple, &u.simple), record_union_view(&t.records, &u.records)?) {
                (Some(simple), Some(records)) => Some(ValueTree::Union(Box::new(UnionValue {
                    simple,
                    has_record: u.has_record.clone(),
                    records,
                }))),
                _ => None,
            }
        }

        (TypeShape::Option(inner), ValueTree::Option(opt)) => {
            Some(ValueTree::Option(Box::new(Optional {
                has: opt.has.clone(),
                val: alias(inner, &opt.val)?,
            })))
        }
        (_, ValueTree::Option(opt)) => Some(alias(target, &opt.val)?),

        _ => None,
    };
    view.ok_or_else(unsupported)
}

fn record_view(
    target: &IndexMap<String, TypeShape>,
    fields: &IndexMap<&str, FieldSource<'_>>,
) -> Result<Option<ValueTree>, LowerError> {
    let mut out = IndexMap::with_capacity(target.len());
    for (name, shape) in target {
        let field = match fields.get(name.as_str()) {
            Some(FieldSource::Shared(v)) => alias(shape, v)?,
            Some(FieldSource::Specific(opt)) => alias(shape, &opt.val)?,
            None => return Ok(None),
        };
        out.insert(name.clone(), field);
    }
    Ok(Some(ValueTree::Record(out)))
}

fn alts_view(target: &SimpleUnionShape, alts: &[Alternative]) -> Option<Vec<Alternative>> {
    target
        .options
        .iter()
        .map(|ty| alts.iter().find(|a| a.ty == *ty).cloned())
        .collect()
}

fn record_union_view(
    target: &RecordUnionShape,
    ru: &RecordUnionValue,
) -> Result<Option<RecordUnionValue>, LowerError> {
    let mut out = RecordUnionValue::default();
    for (name, shape) in &target.shared {
        let field = match (ru.shared.get(name), ru.specific.get(name)) {
            (Some(v), _) => alias(shape, v)?,
            (None, Some(opt)) => alias(shape, &opt.val)?,
            (None, None) => return Ok(None),
        };
        out.shared.insert(name.clone(), field);
    }
    for (name, shape) in &target.specific {
        let Some(opt) = ru.specific.get(name) else {
            return Ok(None);
        };
        out.specific.insert(
            name.clone(),
            Optional {
                has: opt.has.clone(),
                val: alias(shape, &opt.val)?,
            },
        );
    }
    Ok(Some(out))
}
