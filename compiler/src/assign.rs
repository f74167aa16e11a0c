// assign.rs: Assignment target resolution
//
// An l-value such as `p.pos.x` or `(u as Point).x` is resolved outward-in
// into a chain of steps, each paired with the value currently held at that
// path. Writing walks the chain back: every field step rebuilds its parent
// with exactly one field replaced, and the declaration step rebinds the
// variable.
//
// Preconditions: the chain is resolved against the current environment.
// Postconditions: the rebound value has the variable's declared shape.
// Failure modes: `UnsupportedAssignment` for a field of a non-record or a
//   missing field; coercion and alias errors propagate.
// Side effects: `write` may add constant nodes.

use crate::alias::alias;
use crate::coerce::{coerce, undef};
use crate::error::LowerError;
use crate::graph::DataflowGraph;
use crate::id::{Loc, VarIndex};
use crate::ir::{LValue, LValueKind};
use crate::lower::Environment;
use crate::shape::TypeShape;
use crate::type_compiler::TypeCompiler;
use crate::values::ValueTree;

#[derive(Debug, Clone)]
pub enum StepKind {
    Declaration { index: VarIndex, ident: String },
    FieldLoad { field: String, loc: Loc },
    Alias,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub kind: StepKind,
    /// Shape of the value at this step.
    pub shape: TypeShape,
    /// Value currently held at this step; `None` while unassigned.
    pub value: Option<ValueTree>,
}

/// A resolved chain, outermost (the variable) first.
#[derive(Debug, Clone)]
pub struct AssignTarget {
    steps: Vec<Step>,
}

pub fn resolve(
    lvalue: &LValue,
    env: &Environment,
    types: &mut TypeCompiler,
) -> Result<AssignTarget, LowerError> {
    let mut steps = Vec::new();
    resolve_into(lvalue, env, types, &mut steps)?;
    Ok(AssignTarget { steps })
}

fn resolve_into(
    lvalue: &LValue,
    env: &Environment,
    types: &mut TypeCompiler,
    steps: &mut Vec<Step>,
) -> Result<(), LowerError> {
    match &lvalue.kind {
        LValueKind::Var { index } => {
            let binding = env.get(index).ok_or_else(|| {
                LowerError::compiler(format!("assignment to undeclared variable {}", index))
            })?;
            steps.push(Step {
                kind: StepKind::Declaration {
                    index: *index,
                    ident: binding.ident.clone(),
                },
                shape: binding.shape.clone(),
                value: binding.value.clone(),
            });
        }
        LValueKind::Field { operand, field } => {
            resolve_into(operand, env, types, steps)?;
            let parent = parent_of(steps)?;
            let shape = match &parent.shape {
                TypeShape::Record(r) => r.fields.get(field),
                TypeShape::RecordUnion(ru) => ru.shared.get(field),
                _ => None,
            }
            .cloned()
            .ok_or_else(|| LowerError::UnsupportedAssignment {
                loc: lvalue.loc,
                field: field.clone(),
                value: parent.shape.clone(),
            })?;
            let value = parent.value.as_ref().and_then(|v| v.field(field)).cloned();
            steps.push(Step {
                kind: StepKind::FieldLoad {
                    field: field.clone(),
                    loc: lvalue.loc,
                },
                shape,
                value,
            });
        }
        LValueKind::Alias { operand, ty } => {
            resolve_into(operand, env, types, steps)?;
            let shape = types.compile(ty)?;
            let parent = parent_of(steps)?;
            let value = match &parent.value {
                Some(v) => Some(alias(&shape, v)?),
                None => None,
            };
            steps.push(Step {
                kind: StepKind::Alias,
                shape,
                value,
            });
        }
    }
    Ok(())
}

fn parent_of(steps: &[Step]) -> Result<&Step, LowerError> {
    steps
        .last()
        .ok_or_else(|| LowerError::compiler("assignment target has no variable"))
}

impl AssignTarget {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Store `value` at the target. Returns the variable and its new value.
    pub fn write(
        mut self,
        graph: &mut DataflowGraph,
        value: ValueTree,
    ) -> Result<(VarIndex, ValueTree), LowerError> {
        let mut value = value;
        while let Some(step) = self.steps.pop() {
            match step.kind {
                StepKind::Declaration { index, ident } => {
                    let bound = coerce(graph, &value, &step.shape)?.rename(&ident);
                    return Ok((index, bound));
                }
                StepKind::Alias => {}
                StepKind::FieldLoad { field, loc } => {
                    let parent = parent_of(&self.steps)?;
                    let field_value = coerce(graph, &value, &step.shape)?;
                    let current = match &parent.value {
                        Some(v) => v.clone(),
                        None => undef(graph, &parent.shape),
                    };
                    value = replace_field(current, &field, field_value).ok_or_else(|| {
                        LowerError::UnsupportedAssignment {
                            loc,
                            field: field.clone(),
                            value: parent.shape.clone(),
                        }
                    })?;
                }
            }
        }
        Err(LowerError::compiler("assignment target has no variable"))
    }
}

/// `parent` with exactly `field` replaced by `value`.
fn replace_field(parent: ValueTree, field: &str, value: ValueTree) -> Option<ValueTree> {
    match parent {
        ValueTree::Record(mut fields) => {
            *fields.get_mut(field)? = value;
            Some(ValueTree::Record(fields))
        }
        ValueTree::RecordUnion(mut ru) => {
            *ru.shared.get_mut(field)? = value;
            Some(ValueTree::RecordUnion(ru))
        }
        _ => None,
    }
}
