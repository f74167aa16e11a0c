// type_compiler.rs: Source types to canonical type shapes
//
// Compiles the front end's source-level types into `TypeShape`s. Unions are
// flattened and partitioned into their scalar and record parts so that the
// lowering engine only ever sees the canonical layouts.
//
// Preconditions: none.
// Postconditions: the same `SourceType` always yields an equal shape.
// Failure modes: `LowerError::UnsupportedType` for types with no layout.
// Side effects: memoizes successful compilations.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::LowerError;
use crate::shape::{
    RecordShape, RecordUnionShape, ScalarType, SimpleUnionShape, TypeShape, UnionShape,
};

// ── Source types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceType {
    Bool,
    Int { width: u32, signed: bool },
    Record { fields: Vec<FieldType> },
    Union { options: Vec<SourceType> },
    Optional { inner: Box<SourceType> },
    Named { name: String, ty: Box<SourceType> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    pub name: String,
    pub ty: SourceType,
}

impl SourceType {
    pub fn int(width: u32) -> Self {
        SourceType::Int {
            width,
            signed: true,
        }
    }

    pub fn uint(width: u32) -> Self {
        SourceType::Int {
            width,
            signed: false,
        }
    }

    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, SourceType)>,
        S: Into<String>,
    {
        SourceType::Record {
            fields: fields
                .into_iter()
                .map(|(name, ty)| FieldType {
                    name: name.into(),
                    ty,
                })
                .collect(),
        }
    }

    pub fn union(options: Vec<SourceType>) -> Self {
        SourceType::Union { options }
    }

    pub fn optional(inner: SourceType) -> Self {
        SourceType::Optional {
            inner: Box::new(inner),
        }
    }

    pub fn named(name: impl Into<String>, ty: SourceType) -> Self {
        SourceType::Named {
            name: name.into(),
            ty: Box::new(ty),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Bool => write!(f, "bool"),
            SourceType::Int { width, signed } => {
                write!(f, "{}{}", if *signed { "int" } else { "uint" }, width)
            }
            SourceType::Record { fields } => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.ty)?;
                }
                write!(f, "}}")
            }
            SourceType::Union { options } => {
                for (i, opt) in options.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    write!(f, "{}", opt)?;
                }
                Ok(())
            }
            SourceType::Optional { inner } => write!(f, "{}?", inner),
            SourceType::Named { name, .. } => write!(f, "{}", name),
        }
    }
}

// ── Compiler ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TypeCompiler {
    cache: HashMap<SourceType, TypeShape>,
}

impl TypeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&mut self, ty: &SourceType) -> Result<TypeShape, LowerError> {
        if let Some(shape) = self.cache.get(ty) {
            return Ok(shape.clone());
        }
        let shape = self.compile_uncached(ty)?;
        tracing::trace!(ty = %ty, shape = %shape, "compiled type");
        self.cache.insert(ty.clone(), shape.clone());
        Ok(shape)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn compile_uncached(&mut self, ty: &SourceType) -> Result<TypeShape, LowerError> {
        match ty {
            SourceType::Bool => Ok(TypeShape::Leaf(ScalarType::Bool)),
            SourceType::Int { width: 0, .. } => Err(reject(ty, "zero-width integer")),
            SourceType::Int { width, signed } => Ok(TypeShape::Leaf(if *signed {
                ScalarType::Signed(*width)
            } else {
                ScalarType::Unsigned(*width)
            })),
            SourceType::Named { ty: body, .. } => self.compile(body),
            SourceType::Record { fields } => {
                let mut out = IndexMap::with_capacity(fields.len());
                for field in fields {
                    let shape = self.compile(&field.ty)?;
                    if out.insert(field.name.clone(), shape).is_some() {
                        return Err(reject(
                            ty,
                            &format!("duplicate field `{}`", field.name),
                        ));
                    }
                }
                Ok(TypeShape::Record(RecordShape { fields: out }))
            }
            SourceType::Optional { inner } => Ok(TypeShape::option(self.compile(inner)?)),
            SourceType::Union { .. } => self.compile_union(ty),
        }
    }

    fn compile_union(&mut self, ty: &SourceType) -> Result<TypeShape, LowerError> {
        let mut members = Vec::new();
        flatten_union(ty, &mut members);

        let mut shapes: Vec<TypeShape> = Vec::with_capacity(members.len());
        for member in members {
            let shape = self.compile(member)?;
            if !shapes.contains(&shape) {
                shapes.push(shape);
            }
        }

        let mut scalars = Vec::new();
        let mut records = Vec::new();
        for shape in shapes {
            match shape {
                TypeShape::Leaf(s) => scalars.push(s),
                TypeShape::Record(r) => records.push(r),
                other => {
                    return Err(reject(
                        ty,
                        &format!("`{}` cannot be a union member", other),
                    ))
                }
            }
        }

        match (scalars.len(), records.len()) {
            (0, 0) => Err(reject(ty, "empty union")),
            (1, 0) => Ok(TypeShape::Leaf(scalars[0])),
            (_, 0) => Ok(TypeShape::simple_union(scalars)),
            (0, 1) => Ok(TypeShape::Record(records.remove(0))),
            (0, _) => Ok(TypeShape::RecordUnion(record_union(ty, &records)?)),
            _ => Ok(TypeShape::Union(UnionShape {
                simple: SimpleUnionShape { options: scalars },
                records: record_union(ty, &records)?,
            })),
        }
    }
}

fn reject(ty: &SourceType, reason: &str) -> LowerError {
    LowerError::UnsupportedType {
        ty: ty.to_string(),
        reason: reason.to_string(),
    }
}

/// Collect the non-union members of a union, looking through names.
fn flatten_union<'a>(ty: &'a SourceType, out: &mut Vec<&'a SourceType>) {
    match ty {
        SourceType::Union { options } => {
            for opt in options {
                flatten_union(opt, out);
            }
        }
        SourceType::Named { ty: body, .. } if is_union(body) => flatten_union(body, out),
        other => out.push(other),
    }
}

fn is_union(ty: &SourceType) -> bool {
    match ty {
        SourceType::Union { .. } => true,
        SourceType::Named { ty, .. } => is_union(ty),
        _ => false,
    }
}

/// Split record variants into the fields all of them share with one shape
/// and the remaining variant-specific fields.
fn record_union(ty: &SourceType, records: &[RecordShape]) -> Result<RecordUnionShape, LowerError> {
    let mut out = RecordUnionShape::default();
    let Some((first, rest)) = records.split_first() else {
        return Ok(out);
    };

    for (name, shape) in &first.fields {
        if rest.iter().all(|r| r.fields.get(name) == Some(shape)) {
            out.shared.insert(name.clone(), shape.clone());
        }
    }

    for record in records {
        for (name, shape) in &record.fields {
            if out.shared.contains_key(name) {
                continue;
            }
            match out.specific.get(name) {
                Some(existing) if existing != shape => {
                    return Err(reject(
                        ty,
                        &format!("field `{}` has conflicting types across variants", name),
                    ))
                }
                Some(_) => {}
                None => {
                    out.specific.insert(name.clone(), shape.clone());
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(ty: SourceType) -> Result<TypeShape, LowerError> {
        TypeCompiler::new().compile(&ty)
    }

    #[test]
    fn scalars() {
        assert_eq!(compile(SourceType::Bool).unwrap(), TypeShape::BOOL);
        assert_eq!(
            compile(SourceType::int(32)).unwrap(),
            TypeShape::Leaf(ScalarType::Signed(32))
        );
        assert_eq!(
            compile(SourceType::uint(8)).unwrap(),
            TypeShape::Leaf(ScalarType::Unsigned(8))
        );
        assert!(matches!(
            compile(SourceType::int(0)),
            Err(LowerError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn named_types_share_layout() {
        let point = SourceType::record([("x", SourceType::int(32)), ("y", SourceType::int(32))]);
        let named = SourceType::named("Point", point.clone());
        assert_eq!(compile(named).unwrap(), compile(point).unwrap());
    }

    #[test]
    fn duplicate_record_field_rejected() {
        let ty = SourceType::record([("x", SourceType::Bool), ("x", SourceType::int(8))]);
        assert!(compile(ty).is_err());
    }

    #[test]
    fn scalar_union_flattens_and_dedups() {
        let inner = SourceType::union(vec![SourceType::int(32), SourceType::Bool]);
        let ty = SourceType::union(vec![
            SourceType::named("T", inner),
            SourceType::int(32),
            SourceType::uint(8),
        ]);
        assert_eq!(
            compile(ty).unwrap(),
            TypeShape::simple_union(vec![
                ScalarType::Signed(32),
                ScalarType::Bool,
                ScalarType::Unsigned(8)
            ])
        );
    }

    #[test]
    fn single_member_union_collapses() {
        let ty = SourceType::union(vec![SourceType::Bool, SourceType::Bool]);
        assert_eq!(compile(ty).unwrap(), TypeShape::BOOL);
    }

    #[test]
    fn record_union_partitions_fields() {
        let a = SourceType::record([("tag", SourceType::int(8)), ("x", SourceType::int(32))]);
        let b = SourceType::record([("tag", SourceType::int(8)), ("ok", SourceType::Bool)]);
        let TypeShape::RecordUnion(ru) = compile(SourceType::union(vec![a, b])).unwrap() else {
            panic!("expected record union");
        };
        assert_eq!(ru.shared.keys().collect::<Vec<_>>(), ["tag"]);
        assert_eq!(ru.specific.keys().collect::<Vec<_>>(), ["x", "ok"]);
    }

    #[test]
    fn conflicting_specific_field_rejected() {
        let a = SourceType::record([("x", SourceType::int(32))]);
        let b = SourceType::record([("x", SourceType::Bool)]);
        assert!(matches!(
            compile(SourceType::union(vec![a, b])),
            Err(LowerError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn mixed_union_builds_general_union() {
        let rec = SourceType::record([("x", SourceType::int(32))]);
        let TypeShape::Union(u) = compile(SourceType::union(vec![SourceType::Bool, rec])).unwrap()
        else {
            panic!("expected general union");
        };
        assert_eq!(u.simple.options, vec![ScalarType::Bool]);
        assert_eq!(u.records.shared.keys().collect::<Vec<_>>(), ["x"]);
        assert!(u.records.specific.is_empty());
    }

    #[test]
    fn optional_union_member_rejected() {
        let ty = SourceType::union(vec![SourceType::optional(SourceType::Bool), SourceType::Bool]);
        assert!(compile(ty).is_err());
        assert!(compile(SourceType::union(vec![])).is_err());
    }

    #[test]
    fn memoizes() {
        let mut tc = TypeCompiler::new();
        let ty = SourceType::optional(SourceType::int(16));
        let a = tc.compile(&ty).unwrap();
        let n = tc.cached();
        let b = tc.compile(&ty).unwrap();
        assert_eq!(a, b);
        assert_eq!(tc.cached(), n);
    }

    #[test]
    fn deserializes_tagged_json() {
        let json = r#"{"kind":"union","options":[{"kind":"int","width":32,"signed":true},{"kind":"bool"}]}"#;
        let ty: SourceType = serde_json::from_str(json).unwrap();
        assert_eq!(
            compile(ty).unwrap(),
            TypeShape::simple_union(vec![ScalarType::Signed(32), ScalarType::Bool])
        );
    }
}
