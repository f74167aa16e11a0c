// values.rs: Signal handles and value trees
//
// A `ValueTree` is the dataflow image of a source value: a tree of signal
// handles whose structure mirrors the value's `TypeShape` exactly. Trees are
// immutable; every transformation builds a new tree, sharing producers.
//
// Path identifiers name every wire of a variable for display and for the
// downstream netlist: `p`, `p_field`, `p_has` / `p_val`, `p_s32_has`,
// `p_pri_…`, `p_rec_has`, `p_rec_…`.
//
// Preconditions: none.
// Postconditions: `v.shape()` is the shape `v` was built for.
// Failure modes: none.
// Side effects: none.

use indexmap::IndexMap;

use crate::id::NodeId;
use crate::shape::{RecordUnionShape, ScalarType, SimpleUnionShape, TypeShape, UnionShape};

// ── Signal handle ───────────────────────────────────────────────────────────

/// Reference to the output of a producer node under a display identifier.
/// Identity is the producer; the identifier only labels the arrow created
/// when the handle is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signal {
    pub node: NodeId,
    pub ident: Option<String>,
}

impl Signal {
    pub fn anonymous(node: NodeId) -> Self {
        Signal { node, ident: None }
    }

    pub fn named(node: NodeId, ident: impl Into<String>) -> Self {
        Signal {
            node,
            ident: Some(ident.into()),
        }
    }

    pub fn renamed(&self, ident: impl Into<String>) -> Self {
        Signal::named(self.node, ident)
    }

    pub fn same_producer(&self, other: &Signal) -> bool {
        self.node == other.node
    }
}

// ── Value tree ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafValue {
    pub ty: ScalarType,
    pub signal: Signal,
}

/// A payload paired with its presence flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Optional {
    pub has: Signal,
    pub val: ValueTree,
}

/// One scalar alternative of a union value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    pub ty: ScalarType,
    pub has: Signal,
    pub val: Signal,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordUnionValue {
    pub shared: IndexMap<String, ValueTree>,
    pub specific: IndexMap<String, Optional>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionValue {
    pub simple: Vec<Alternative>,
    pub has_record: Signal,
    pub records: RecordUnionValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueTree {
    Leaf(LeafValue),
    Record(IndexMap<String, ValueTree>),
    Option(Box<Optional>),
    SimpleUnion(Vec<Alternative>),
    RecordUnion(RecordUnionValue),
    Union(Box<UnionValue>),
}

/// Whether a wire carries data or a presence flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafRole {
    Data,
    Flag,
}

/// One flattened wire of a value: path identifier, handle, type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedLeaf {
    pub ident: String,
    pub signal: Signal,
    pub ty: ScalarType,
    pub role: LeafRole,
}

pub fn join(prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{}_{}", prefix, suffix)
    }
}

fn alt_path(prefix: &str, ty: ScalarType) -> String {
    join(prefix, &ty.to_string())
}

impl ValueTree {
    pub fn leaf(ty: ScalarType, signal: Signal) -> Self {
        ValueTree::Leaf(LeafValue { ty, signal })
    }

    pub fn as_leaf(&self) -> Option<&LeafValue> {
        match self {
            ValueTree::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// The signal of a boolean leaf, if this is one.
    pub fn as_bool(&self) -> Option<&Signal> {
        match self {
            ValueTree::Leaf(LeafValue {
                ty: ScalarType::Bool,
                signal,
            }) => Some(signal),
            _ => None,
        }
    }

    /// A field readable without a presence test: any record field, or a
    /// shared field of a record union.
    pub fn field(&self, name: &str) -> Option<&ValueTree> {
        match self {
            ValueTree::Record(fields) => fields.get(name),
            ValueTree::RecordUnion(ru) => ru.shared.get(name),
            _ => None,
        }
    }

    pub fn shape(&self) -> TypeShape {
        match self {
            ValueTree::Leaf(leaf) => TypeShape::Leaf(leaf.ty),
            ValueTree::Record(fields) => TypeShape::record(
                fields.iter().map(|(name, v)| (name.clone(), v.shape())),
            ),
            ValueTree::Option(opt) => TypeShape::option(opt.val.shape()),
            ValueTree::SimpleUnion(alts) => TypeShape::SimpleUnion(simple_shape(alts)),
            ValueTree::RecordUnion(ru) => TypeShape::RecordUnion(ru.shape()),
            ValueTree::Union(u) => TypeShape::Union(UnionShape {
                simple: simple_shape(&u.simple),
                records: u.records.shape(),
            }),
        }
    }

    /// Build a tree for `shape`, asking `f` for the handle of every wire.
    pub fn build<F>(shape: &TypeShape, ident: &str, f: &mut F) -> ValueTree
    where
        F: FnMut(&str, ScalarType, LeafRole) -> Signal,
    {
        match shape {
            TypeShape::Leaf(ty) => ValueTree::leaf(*ty, f(ident, *ty, LeafRole::Data)),
            TypeShape::Record(r) => ValueTree::Record(
                r.fields
                    .iter()
                    .map(|(name, s)| (name.clone(), ValueTree::build(s, &join(ident, name), f)))
                    .collect(),
            ),
            TypeShape::Option(inner) => {
                ValueTree::Option(Box::new(build_optional(inner, ident, f)))
            }
            TypeShape::SimpleUnion(u) => ValueTree::SimpleUnion(build_alts(u, ident, f)),
            TypeShape::RecordUnion(u) => ValueTree::RecordUnion(build_record_union(u, ident, f)),
            TypeShape::Union(u) => {
                let simple = build_alts(&u.simple, &join(ident, "pri"), f);
                let rec = join(ident, "rec");
                let has_record = f(&join(&rec, "has"), ScalarType::Bool, LeafRole::Flag);
                let records = build_record_union(&u.records, &rec, f);
                ValueTree::Union(Box::new(UnionValue {
                    simple,
                    has_record,
                    records,
                }))
            }
        }
    }

    /// Rebuild the tree with every handle replaced by `f(path, handle, type, role)`.
    pub fn map_signals<F>(&self, ident: &str, f: &mut F) -> ValueTree
    where
        F: FnMut(&str, &Signal, ScalarType, LeafRole) -> Signal,
    {
        match self {
            ValueTree::Leaf(leaf) => {
                ValueTree::leaf(leaf.ty, f(ident, &leaf.signal, leaf.ty, LeafRole::Data))
            }
            ValueTree::Record(fields) => ValueTree::Record(
                fields
                    .iter()
                    .map(|(name, v)| (name.clone(), v.map_signals(&join(ident, name), f)))
                    .collect(),
            ),
            ValueTree::Option(opt) => ValueTree::Option(Box::new(map_optional(opt, ident, f))),
            ValueTree::SimpleUnion(alts) => ValueTree::SimpleUnion(map_alts(alts, ident, f)),
            ValueTree::RecordUnion(ru) => ValueTree::RecordUnion(map_record_union(ru, ident, f)),
            ValueTree::Union(u) => {
                let simple = map_alts(&u.simple, &join(ident, "pri"), f);
                let rec = join(ident, "rec");
                let has_record = f(
                    &join(&rec, "has"),
                    &u.has_record,
                    ScalarType::Bool,
                    LeafRole::Flag,
                );
                let records = map_record_union(&u.records, &rec, f);
                ValueTree::Union(Box::new(UnionValue {
                    simple,
                    has_record,
                    records,
                }))
            }
        }
    }

    /// Visit every wire in canonical order.
    pub fn for_each_signal<F>(&self, ident: &str, f: &mut F)
    where
        F: FnMut(&str, &Signal, ScalarType, LeafRole),
    {
        match self {
            ValueTree::Leaf(leaf) => f(ident, &leaf.signal, leaf.ty, LeafRole::Data),
            ValueTree::Record(fields) => {
                for (name, v) in fields {
                    v.for_each_signal(&join(ident, name), f);
                }
            }
            ValueTree::Option(opt) => visit_optional(opt, ident, f),
            ValueTree::SimpleUnion(alts) => visit_alts(alts, ident, f),
            ValueTree::RecordUnion(ru) => visit_record_union(ru, ident, f),
            ValueTree::Union(u) => {
                visit_alts(&u.simple, &join(ident, "pri"), f);
                let rec = join(ident, "rec");
                f(&join(&rec, "has"), &u.has_record, ScalarType::Bool, LeafRole::Flag);
                visit_record_union(&u.records, &rec, f);
            }
        }
    }

    /// Same producers, identifiers reassigned by path from `ident`.
    pub fn rename(&self, ident: &str) -> ValueTree {
        self.map_signals(ident, &mut |path, signal, _, _| signal.renamed(path))
    }

    pub fn named_leaves(&self, ident: &str) -> Vec<NamedLeaf> {
        let mut out = Vec::new();
        self.for_each_signal(ident, &mut |path, signal, ty, role| {
            out.push(NamedLeaf {
                ident: path.to_string(),
                signal: signal.clone(),
                ty,
                role,
            })
        });
        out
    }

    pub fn producers(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.for_each_signal("", &mut |_, signal, _, _| out.push(signal.node));
        out
    }

    /// Same kind and every corresponding wire from the same producer.
    /// Record fields correspond by name, not by position.
    pub fn same_producers(&self, other: &ValueTree) -> bool {
        match (self, other) {
            (ValueTree::Leaf(a), ValueTree::Leaf(b)) => {
                a.ty == b.ty && a.signal.same_producer(&b.signal)
            }
            (ValueTree::Record(a), ValueTree::Record(b)) => same_fields(a, b),
            (ValueTree::Option(a), ValueTree::Option(b)) => same_optional(a, b),
            (ValueTree::SimpleUnion(a), ValueTree::SimpleUnion(b)) => same_alts(a, b),
            (ValueTree::RecordUnion(a), ValueTree::RecordUnion(b)) => a.same_producers(b),
            (ValueTree::Union(a), ValueTree::Union(b)) => {
                same_alts(&a.simple, &b.simple)
                    && a.has_record.same_producer(&b.has_record)
                    && a.records.same_producers(&b.records)
            }
            _ => false,
        }
    }
}

fn same_fields(a: &IndexMap<String, ValueTree>, b: &IndexMap<String, ValueTree>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(name, v)| b.get(name).is_some_and(|w| v.same_producers(w)))
}

fn same_optional(a: &Optional, b: &Optional) -> bool {
    a.has.same_producer(&b.has) && a.val.same_producers(&b.val)
}

fn same_alts(a: &[Alternative], b: &[Alternative]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.ty == y.ty && x.has.same_producer(&y.has) && x.val.same_producer(&y.val)
        })
}

impl RecordUnionValue {
    pub fn same_producers(&self, other: &RecordUnionValue) -> bool {
        same_fields(&self.shared, &other.shared)
            && self.specific.len() == other.specific.len()
            && self
                .specific
                .iter()
                .all(|(name, o)| other.specific.get(name).is_some_and(|p| same_optional(o, p)))
    }

    pub fn shape(&self) -> RecordUnionShape {
        RecordUnionShape {
            shared: self
                .shared
                .iter()
                .map(|(name, v)| (name.clone(), v.shape()))
                .collect(),
            specific: self
                .specific
                .iter()
                .map(|(name, o)| (name.clone(), o.val.shape()))
                .collect(),
        }
    }
}

/// Where a record-like value keeps a field: always present, or behind a
/// presence flag.
#[derive(Debug, Clone, Copy)]
pub enum FieldSource<'a> {
    Shared(&'a ValueTree),
    Specific(&'a Optional),
}

impl ValueTree {
    /// Fields of a record or record union by name; `None` for other kinds.
    pub fn field_sources(&self) -> Option<IndexMap<&str, FieldSource<'_>>> {
        match self {
            ValueTree::Record(fields) => Some(
                fields
                    .iter()
                    .map(|(name, v)| (name.as_str(), FieldSource::Shared(v)))
                    .collect(),
            ),
            ValueTree::RecordUnion(ru) => Some(ru.field_sources()),
            _ => None,
        }
    }
}

impl RecordUnionValue {
    pub fn field_sources(&self) -> IndexMap<&str, FieldSource<'_>> {
        self.shared
            .iter()
            .map(|(name, v)| (name.as_str(), FieldSource::Shared(v)))
            .chain(
                self.specific
                    .iter()
                    .map(|(name, o)| (name.as_str(), FieldSource::Specific(o))),
            )
            .collect()
    }
}

fn simple_shape(alts: &[Alternative]) -> SimpleUnionShape {
    SimpleUnionShape {
        options: alts.iter().map(|a| a.ty).collect(),
    }
}

// ── Builders per kind ───────────────────────────────────────────────────────

fn build_optional<F>(inner: &TypeShape, ident: &str, f: &mut F) -> Optional
where
    F: FnMut(&str, ScalarType, LeafRole) -> Signal,
{
    let has = f(&join(ident, "has"), ScalarType::Bool, LeafRole::Flag);
    let val = ValueTree::build(inner, &join(ident, "val"), f);
    Optional { has, val }
}

pub(crate) fn build_alts<F>(shape: &SimpleUnionShape, ident: &str, f: &mut F) -> Vec<Alternative>
where
    F: FnMut(&str, ScalarType, LeafRole) -> Signal,
{
    shape
        .options
        .iter()
        .map(|&ty| {
            let path = alt_path(ident, ty);
            let has = f(&join(&path, "has"), ScalarType::Bool, LeafRole::Flag);
            let val = f(&join(&path, "val"), ty, LeafRole::Data);
            Alternative { ty, has, val }
        })
        .collect()
}

pub(crate) fn build_record_union<F>(shape: &RecordUnionShape, ident: &str, f: &mut F) -> RecordUnionValue
where
    F: FnMut(&str, ScalarType, LeafRole) -> Signal,
{
    let shared = shape
        .shared
        .iter()
        .map(|(name, s)| (name.clone(), ValueTree::build(s, &join(ident, name), f)))
        .collect();
    let specific = shape
        .specific
        .iter()
        .map(|(name, s)| (name.clone(), build_optional(s, &join(ident, name), f)))
        .collect();
    RecordUnionValue { shared, specific }
}

// ── Visitors per kind ───────────────────────────────────────────────────────

fn visit_optional<F>(opt: &Optional, ident: &str, f: &mut F)
where
    F: FnMut(&str, &Signal, ScalarType, LeafRole),
{
    f(&join(ident, "has"), &opt.has, ScalarType::Bool, LeafRole::Flag);
    opt.val.for_each_signal(&join(ident, "val"), f);
}

fn visit_alts<F>(alts: &[Alternative], ident: &str, f: &mut F)
where
    F: FnMut(&str, &Signal, ScalarType, LeafRole),
{
    for alt in alts {
        let path = alt_path(ident, alt.ty);
        f(&join(&path, "has"), &alt.has, ScalarType::Bool, LeafRole::Flag);
        f(&join(&path, "val"), &alt.val, alt.ty, LeafRole::Data);
    }
}

fn visit_record_union<F>(ru: &RecordUnionValue, ident: &str, f: &mut F)
where
    F: FnMut(&str, &Signal, ScalarType, LeafRole),
{
    for (name, v) in &ru.shared {
        v.for_each_signal(&join(ident, name), f);
    }
    for (name, o) in &ru.specific {
        visit_optional(o, &join(ident, name), f);
    }
}

// ── Mappers per kind ────────────────────────────────────────────────────────

fn map_optional<F>(opt: &Optional, ident: &str, f: &mut F) -> Optional
where
    F: FnMut(&str, &Signal, ScalarType, LeafRole) -> Signal,
{
    Optional {
        has: f(&join(ident, "has"), &opt.has, ScalarType::Bool, LeafRole::Flag),
        val: opt.val.map_signals(&join(ident, "val"), f),
    }
}

fn map_alts<F>(alts: &[Alternative], ident: &str, f: &mut F) -> Vec<Alternative>
where
    F: FnMut(&str, &Signal, ScalarType, LeafRole) -> Signal,
{
    alts.iter()
        .map(|alt| {
            let path = alt_path(ident, alt.ty);
            Alternative {
                ty: alt.ty,
                has: f(&join(&path, "has"), &alt.has, ScalarType::Bool, LeafRole::Flag),
                val: f(&join(&path, "val"), &alt.val, alt.ty, LeafRole::Data),
            }
        })
        .collect()
}

fn map_record_union<F>(ru: &RecordUnionValue, ident: &str, f: &mut F) -> RecordUnionValue
where
    F: FnMut(&str, &Signal, ScalarType, LeafRole) -> Signal,
{
    RecordUnionValue {
        shared: ru
            .shared
            .iter()
            .map(|(name, v)| (name.clone(), v.map_signals(&join(ident, name), f)))
            .collect(),
        specific: ru
            .specific
            .iter()
            .map(|(name, o)| (name.clone(), map_optional(o, &join(ident, name), f)))
            .collect(),
    }
}
