// shape.rs: Canonical type shapes (hardware layouts)
//
// A `TypeShape` is the statically-known layout a source type occupies in
// hardware: scalar wires, records of wires, and unions flattened into every
// alternative plus presence flags. Two shapes are the same layout iff they
// are structurally equal; that equality is the only notion of type identity
// the lowering engine relies on.
//
// Preconditions: shapes are produced by `type_compiler` (or tests).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

// ── Scalars ─────────────────────────────────────────────────────────────────

/// An opaque fixed-width scalar carried by a single wire bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Bool,
    Signed(u32),
    Unsigned(u32),
}

impl ScalarType {
    pub fn is_bool(self) -> bool {
        matches!(self, ScalarType::Bool)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::Bool => write!(f, "bool"),
            ScalarType::Signed(w) => write!(f, "s{}", w),
            ScalarType::Unsigned(w) => write!(f, "u{}", w),
        }
    }
}

// ── Shapes ──────────────────────────────────────────────────────────────────

/// Ordered field name → shape mapping; every field is always present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordShape {
    pub fields: IndexMap<String, TypeShape>,
}

/// Mutually exclusive scalar alternatives, each implicitly paired with a
/// presence flag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimpleUnionShape {
    pub options: Vec<ScalarType>,
}

/// Union of record variants: fields every variant shares, plus the
/// variant-specific fields, each implicitly paired with a presence flag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordUnionShape {
    pub shared: IndexMap<String, TypeShape>,
    pub specific: IndexMap<String, TypeShape>,
}

/// General union: scalar alternatives plus a flagged record-union part.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnionShape {
    pub simple: SimpleUnionShape,
    pub records: RecordUnionShape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    Leaf(ScalarType),
    Record(RecordShape),
    Option(Box<TypeShape>),
    SimpleUnion(SimpleUnionShape),
    RecordUnion(RecordUnionShape),
    Union(UnionShape),
}

impl TypeShape {
    pub const BOOL: TypeShape = TypeShape::Leaf(ScalarType::Bool);

    pub fn leaf(ty: ScalarType) -> Self {
        TypeShape::Leaf(ty)
    }

    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, TypeShape)>,
        S: Into<String>,
    {
        TypeShape::Record(RecordShape {
            fields: fields.into_iter().map(|(n, s)| (n.into(), s)).collect(),
        })
    }

    pub fn option(inner: TypeShape) -> Self {
        TypeShape::Option(Box::new(inner))
    }

    pub fn simple_union(options: Vec<ScalarType>) -> Self {
        TypeShape::SimpleUnion(SimpleUnionShape { options })
    }

    pub fn as_leaf(&self) -> Option<ScalarType> {
        match self {
            TypeShape::Leaf(ty) => Some(*ty),
            _ => None,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, TypeShape::Leaf(ScalarType::Bool))
    }

    /// Number of wires (data leaves and presence flags) this shape occupies.
    pub fn width(&self) -> usize {
        match self {
            TypeShape::Leaf(_) => 1,
            TypeShape::Record(r) => r.fields.values().map(TypeShape::width).sum(),
            TypeShape::Option(inner) => 1 + inner.width(),
            TypeShape::SimpleUnion(u) => 2 * u.options.len(),
            TypeShape::RecordUnion(u) => u.width(),
            TypeShape::Union(u) => 2 * u.simple.options.len() + 1 + u.records.width(),
        }
    }
}

impl TypeShape {
    /// Equality that also requires record fields in the same order, so the
    /// two layouts line up wire by wire. `==` compares fields by name.
    pub fn same_layout(&self, other: &TypeShape) -> bool {
        match (self, other) {
            (TypeShape::Leaf(a), TypeShape::Leaf(b)) => a == b,
            (TypeShape::Record(a), TypeShape::Record(b)) => fields_in_order(&a.fields, &b.fields),
            (TypeShape::Option(a), TypeShape::Option(b)) => a.same_layout(b),
            (TypeShape::SimpleUnion(a), TypeShape::SimpleUnion(b)) => a == b,
            (TypeShape::RecordUnion(a), TypeShape::RecordUnion(b)) => a.same_layout(b),
            (TypeShape::Union(a), TypeShape::Union(b)) => {
                a.simple == b.simple && a.records.same_layout(&b.records)
            }
            _ => false,
        }
    }
}

fn fields_in_order(a: &IndexMap<String, TypeShape>, b: &IndexMap<String, TypeShape>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|((na, sa), (nb, sb))| na == nb && sa.same_layout(sb))
}

impl RecordUnionShape {
    pub fn same_layout(&self, other: &RecordUnionShape) -> bool {
        fields_in_order(&self.shared, &other.shared) && fields_in_order(&self.specific, &other.specific)
    }

    pub fn width(&self) -> usize {
        self.shared.values().map(TypeShape::width).sum::<usize>()
            + self.specific.values().map(|s| 1 + s.width()).sum::<usize>()
    }

    /// Shape of a field as stored, regardless of shared/specific placement.
    pub fn field(&self, name: &str) -> Option<&TypeShape> {
        self.shared.get(name).or_else(|| self.specific.get(name))
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeShape::Leaf(ty) => write!(f, "{}", ty),
            TypeShape::Record(r) => {
                write!(f, "{{")?;
                for (i, (name, shape)) in r.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, shape)?;
                }
                write!(f, "}}")
            }
            TypeShape::Option(inner) => write!(f, "?{}", inner),
            TypeShape::SimpleUnion(u) => write!(f, "({})", u),
            TypeShape::RecordUnion(u) => write!(f, "{}", u),
            TypeShape::Union(u) => write!(f, "({} | {})", u.simple, u.records),
        }
    }
}

impl fmt::Display for SimpleUnionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ty) in self.options.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}", ty)?;
        }
        Ok(())
    }
}

impl fmt::Display for RecordUnionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, shape)) in self.shared.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, shape)?;
        }
        write!(f, ";")?;
        for (name, shape) in &self.specific {
            write!(f, " {}?: {}", name, shape)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s32() -> TypeShape {
        TypeShape::Leaf(ScalarType::Signed(32))
    }

    #[test]
    fn record_equality_is_by_name() {
        let a = TypeShape::record([("x", s32()), ("y", TypeShape::BOOL)]);
        let b = TypeShape::record([("y", TypeShape::BOOL), ("x", s32())]);
        assert_eq!(a, b);
        let c = TypeShape::record([("x", s32()), ("z", TypeShape::BOOL)]);
        assert_ne!(a, c);
    }

    #[test]
    fn layout_equality_is_by_position() {
        let a = TypeShape::record([("x", s32()), ("y", TypeShape::BOOL)]);
        let b = TypeShape::record([("y", TypeShape::BOOL), ("x", s32())]);
        assert!(a.same_layout(&a.clone()));
        assert!(!a.same_layout(&b));
        assert!(!TypeShape::option(a.clone()).same_layout(&TypeShape::option(b)));
    }

    #[test]
    fn union_equality_is_by_position() {
        let a = TypeShape::simple_union(vec![ScalarType::Signed(32), ScalarType::Bool]);
        let b = TypeShape::simple_union(vec![ScalarType::Bool, ScalarType::Signed(32)]);
        assert_ne!(a, b);
    }

    #[test]
    fn width_counts_flags() {
        let u = TypeShape::simple_union(vec![ScalarType::Signed(32), ScalarType::Bool]);
        assert_eq!(u.width(), 4);
        assert_eq!(TypeShape::option(s32()).width(), 2);
        let ru = TypeShape::RecordUnion(RecordUnionShape {
            shared: [("a".to_string(), s32())].into_iter().collect(),
            specific: [("b".to_string(), TypeShape::BOOL)].into_iter().collect(),
        });
        assert_eq!(ru.width(), 3);
    }

    #[test]
    fn display_forms() {
        assert_eq!(s32().to_string(), "s32");
        assert_eq!(
            TypeShape::record([("x", s32()), ("ok", TypeShape::BOOL)]).to_string(),
            "{x: s32, ok: bool}"
        );
        assert_eq!(TypeShape::option(s32()).to_string(), "?s32");
        assert_eq!(
            TypeShape::simple_union(vec![ScalarType::Signed(32), ScalarType::Bool]).to_string(),
            "(s32 | bool)"
        );
        let ru = RecordUnionShape {
            shared: [("a".to_string(), s32())].into_iter().collect(),
            specific: [("b".to_string(), TypeShape::BOOL)].into_iter().collect(),
        };
        assert_eq!(TypeShape::RecordUnion(ru).to_string(), "{a: s32; b?: bool}");
    }
}
