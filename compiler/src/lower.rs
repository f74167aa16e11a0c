// lower.rs: Control-flow lowering of one function
//
// Walks a function's structured body and builds its dataflow graph. The
// live-variable environment maps every variable to the value tree it holds
// at the current program point; conditionals snapshot it, lower both arms
// and merge the differences through selectors; loops wrap live values in
// loop-input nodes and close them with feedback. Returns on some paths are
// collected in a partial-return tree and merged once every path returned.
//
// Preconditions: `func` is well-formed IR (unique variable indices,
//   parameters at `0..params.len()`).
// Postconditions: on success, the graph has one input per parameter wire and
//   one output per returned wire, named `ret_<i>…`.
// Failure modes: the first `LowerError` aborts the function; it is reported
//   with the last IR location entered.
// Side effects: memoizes compiled types in the shared `TypeCompiler`.

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::alias::alias;
use crate::assign;
use crate::coerce::{coerce, undef};
use crate::diag::Notice;
use crate::error::{LowerError, LowerFailure};
use crate::flow_typing::flow_type;
use crate::graph::{BinaryOp, DataflowGraph, UnaryOp};
use crate::id::{Loc, VarIndex};
use crate::ir::{Expr, ExprKind, Function, IrOp, LValue, SourceType, Stmt, StmtKind};
use crate::merge::{end_if, end_while, start_while};
use crate::partial_return::PartialReturn;
use crate::pipeline::LowerOptions;
use crate::shape::{ScalarType, TypeShape};
use crate::type_compiler::TypeCompiler;
use crate::values::{Signal, ValueTree};

// ── Output types ────────────────────────────────────────────────────────────

/// A variable in scope: its display identifier, declared shape and current
/// value (`None` until first assigned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub ident: String,
    pub shape: TypeShape,
    pub value: Option<ValueTree>,
}

pub type Environment = IndexMap<VarIndex, Binding>;

/// A successfully lowered function.
#[derive(Debug, Clone)]
pub struct FunctionGraph {
    pub graph: DataflowGraph,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IfPhase {
    Entering,
    TrueBranch,
    FalseBranch,
    Merged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopPhase {
    PreLoop,
    HeaderBuilt,
    BodyLowered,
    Closed,
    Infinite,
}

// ── Public entry point ──────────────────────────────────────────────────────

pub fn lower_function(
    func: &Function,
    types: &mut TypeCompiler,
    options: &LowerOptions,
) -> Result<FunctionGraph, LowerFailure> {
    debug!(function = %func.name, "lowering function");
    let mut lowering = FunctionLowering {
        types,
        options,
        graph: DataflowGraph::new(func.name.clone()),
        env: Environment::new(),
        returns: Vec::new(),
        partial: None,
        notices: Vec::new(),
        loop_depth: 0,
        locs: Vec::new(),
        last_loc: None,
    };
    match lowering.lower(func) {
        Ok(()) => {
            debug!(
                function = %func.name,
                nodes = lowering.graph.node_count(),
                edges = lowering.graph.edge_count(),
                "lowered function"
            );
            Ok(FunctionGraph {
                graph: lowering.graph,
                notices: lowering.notices,
            })
        }
        Err(error) => Err(LowerFailure {
            error,
            loc: lowering.last_loc,
        }),
    }
}

// ── Operator table ──────────────────────────────────────────────────────────

pub fn map_unary(op: IrOp) -> Option<UnaryOp> {
    match op {
        IrOp::Neg => Some(UnaryOp::Neg),
        IrOp::Not | IrOp::BitwiseNot => Some(UnaryOp::Not),
        _ => None,
    }
}

pub fn map_binary(op: IrOp) -> Option<BinaryOp> {
    Some(match op {
        IrOp::Add => BinaryOp::Add,
        IrOp::Sub => BinaryOp::Sub,
        IrOp::Mul => BinaryOp::Mul,
        IrOp::Div => BinaryOp::Div,
        IrOp::Rem => BinaryOp::Rem,
        IrOp::Eq => BinaryOp::Eq,
        IrOp::Ne => BinaryOp::Ne,
        IrOp::Lt => BinaryOp::Lt,
        IrOp::Le => BinaryOp::Le,
        IrOp::Gt => BinaryOp::Gt,
        IrOp::Ge => BinaryOp::Ge,
        IrOp::And | IrOp::BitwiseAnd => BinaryOp::And,
        IrOp::Or | IrOp::BitwiseOr => BinaryOp::Or,
        IrOp::BitwiseXor => BinaryOp::Xor,
        IrOp::Neg | IrOp::Not | IrOp::BitwiseNot | IrOp::Shl | IrOp::Shr | IrOp::ArrayLength => {
            return None
        }
    })
}

// ── Internal engine ─────────────────────────────────────────────────────────

struct FunctionLowering<'a> {
    types: &'a mut TypeCompiler,
    options: &'a LowerOptions,
    graph: DataflowGraph,
    env: Environment,
    returns: Vec<TypeShape>,
    /// Open partial-return tree of the current path.
    partial: Option<PartialReturn>,
    notices: Vec<Notice>,
    loop_depth: u32,
    /// Locations of the constructs being lowered, innermost last.
    locs: Vec<Loc>,
    last_loc: Option<Loc>,
}

impl FunctionLowering<'_> {
    fn lower(&mut self, func: &Function) -> Result<(), LowerError> {
        self.enter(func.loc)?;

        for (i, param) in func.params.iter().enumerate() {
            let shape = self.types.compile(&param.ty)?;
            let graph = &mut self.graph;
            let value = ValueTree::build(&shape, &param.name, &mut |path, ty, _| {
                graph.input(path, ty)
            });
            self.env.insert(
                VarIndex(i as u32),
                Binding {
                    ident: param.name.clone(),
                    shape,
                    value: Some(value),
                },
            );
        }
        self.returns = func
            .returns
            .iter()
            .map(|ty| self.types.compile(ty))
            .collect::<Result<_, _>>()?;

        self.lower_stmt(&func.body)?;

        let values = match self.partial.take() {
            None if self.returns.is_empty() => Vec::new(),
            Some(tree) if tree.is_partial() && self.returns.is_empty() => {
                tree.complete(&PartialReturn::Complete(Vec::new()))
                    .resolve(&mut self.graph)
            }
            Some(tree) if !tree.is_partial() => tree.resolve(&mut self.graph),
            _ => {
                return Err(LowerError::compiler(format!(
                    "function `{}` does not return on every path",
                    func.name
                )))
            }
        };

        for (i, value) in values.iter().enumerate() {
            for leaf in value.named_leaves(&format!("ret_{}", i)) {
                self.graph.output(&leaf.ident, &leaf.signal);
            }
        }

        self.leave();
        Ok(())
    }

    fn enter(&mut self, loc: Loc) -> Result<(), LowerError> {
        self.last_loc = Some(loc);
        if self.locs.len() as u32 >= self.options.max_depth {
            return Err(LowerError::compiler(format!(
                "nesting exceeds the maximum depth of {}",
                self.options.max_depth
            )));
        }
        self.locs.push(loc);
        self.graph.set_loc(Some(loc));
        Ok(())
    }

    fn leave(&mut self) {
        self.locs.pop();
        self.graph.set_loc(self.locs.last().copied());
    }

    fn compile(&mut self, ty: &SourceType) -> Result<TypeShape, LowerError> {
        self.types.compile(ty)
    }

    fn notice(&mut self, notice: Notice) {
        warn!(?notice, function = %self.graph.name, "lowering notice");
        self.notices.push(notice);
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), LowerError> {
        self.enter(stmt.loc)?;
        trace!(loc = %stmt.loc, kind = stmt.kind.name(), "lowering statement");
        match &stmt.kind {
            StmtKind::Block { stmts } => {
                for s in stmts {
                    self.lower_stmt(s)?;
                }
            }
            StmtKind::VarDecl {
                index,
                name,
                ty,
                init,
            } => {
                let shape = self.compile(ty)?;
                let value = match init {
                    Some(init) => {
                        let v = self.lower_expr(init)?;
                        Some(coerce(&mut self.graph, &v, &shape)?.rename(name))
                    }
                    None => None,
                };
                self.env.insert(
                    *index,
                    Binding {
                        ident: name.clone(),
                        shape,
                        value,
                    },
                );
            }
            StmtKind::Assign { lhs, rhs } => self.lower_assign(lhs, rhs)?,
            StmtKind::Return { values } => self.lower_return(stmt.loc, values)?,
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => self.lower_if(stmt.loc, cond, then, otherwise.as_deref())?,
            StmtKind::While { cond, body } => self.lower_while(stmt.loc, cond, body)?,
            StmtKind::Skip => {
                if self.options.emit_separations {
                    self.graph.separation();
                }
            }
            StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Assert { .. }
            | StmtKind::Switch { .. } => {
                return Err(LowerError::unsupported(stmt.loc, stmt.kind.name()));
            }
        }
        self.leave();
        Ok(())
    }

    fn lower_assign(&mut self, lhs: &[LValue], rhs: &[Expr]) -> Result<(), LowerError> {
        let values = self.lower_tuple(rhs)?;
        if values.len() != lhs.len() {
            return Err(LowerError::compiler(format!(
                "assignment of {} values to {} targets",
                values.len(),
                lhs.len()
            )));
        }
        for (lvalue, value) in lhs.iter().zip(values) {
            let target = assign::resolve(lvalue, &self.env, self.types)?;
            let (index, bound) = target.write(&mut self.graph, value)?;
            if let Some(binding) = self.env.get_mut(&index) {
                binding.value = Some(bound);
            }
        }
        Ok(())
    }

    fn lower_return(&mut self, loc: Loc, exprs: &[Expr]) -> Result<(), LowerError> {
        if self.loop_depth > 0 {
            return Err(LowerError::unsupported(loc, "return inside a loop"));
        }
        let values = self.lower_tuple(exprs)?;
        if values.len() != self.returns.len() {
            return Err(LowerError::compiler(format!(
                "return of {} values from a function returning {}",
                values.len(),
                self.returns.len()
            )));
        }
        let mut coerced = Vec::with_capacity(values.len());
        for (value, shape) in values.iter().zip(&self.returns) {
            coerced.push(coerce(&mut self.graph, value, shape)?);
        }
        let rest = PartialReturn::Complete(coerced);
        self.partial = Some(match self.partial.take() {
            Some(open) => open.complete(&rest),
            None => rest,
        });
        Ok(())
    }

    fn lower_if(
        &mut self,
        loc: Loc,
        cond: &Expr,
        then: &Stmt,
        otherwise: Option<&Stmt>,
    ) -> Result<(), LowerError> {
        trace!(%loc, phase = ?IfPhase::Entering);
        let cond = self.lower_condition(cond)?;
        let snapshot = self.env.clone();
        let outer = self.partial.take();

        trace!(%loc, phase = ?IfPhase::TrueBranch);
        self.lower_stmt(then)?;
        let true_env = std::mem::replace(&mut self.env, snapshot.clone());
        let true_ret = self.partial.take();

        trace!(%loc, phase = ?IfPhase::FalseBranch);
        if let Some(otherwise) = otherwise {
            self.lower_stmt(otherwise)?;
        }
        let false_env = std::mem::replace(&mut self.env, snapshot);
        let false_ret = self.partial.take();

        let indices: Vec<VarIndex> = self.env.keys().copied().collect();
        for index in indices {
            let before = self.env[&index].value.clone();
            let on_true = true_env.get(&index).and_then(|b| b.value.clone());
            let on_false = false_env.get(&index).and_then(|b| b.value.clone());
            if !changed(&before, &on_true) && !changed(&before, &on_false) {
                continue;
            }
            let binding = &self.env[&index];
            let (shape, ident) = (binding.shape.clone(), binding.ident.clone());
            let on_true = match on_true {
                Some(v) => v,
                None => undef(&mut self.graph, &shape),
            };
            let on_false = match on_false {
                Some(v) => v,
                None => undef(&mut self.graph, &shape),
            };
            let merged = end_if(&mut self.graph, &cond, &on_true, &on_false).rename(&ident);
            debug!(%loc, var = %ident, "merged branch values");
            if let Some(binding) = self.env.get_mut(&index) {
                binding.value = Some(merged);
            }
        }
        trace!(%loc, phase = ?IfPhase::Merged);

        if true_ret.is_none() && false_ret.is_none() {
            self.partial = outer;
            return Ok(());
        }
        let nested = true_ret.as_ref().is_some_and(PartialReturn::is_branch)
            || false_ret.as_ref().is_some_and(PartialReturn::is_branch)
            || outer.as_ref().is_some_and(PartialReturn::is_partial);
        if nested {
            self.notice(Notice::NestedReturn { loc });
        }
        let node = PartialReturn::branch(cond, loc, true_ret, false_ret);
        self.partial = Some(match outer {
            Some(open) => open.complete(&node),
            None => node,
        });
        Ok(())
    }

    fn lower_while(&mut self, loc: Loc, cond: &Expr, body: &Stmt) -> Result<(), LowerError> {
        trace!(%loc, phase = ?LoopPhase::PreLoop);
        let in_scope: Vec<VarIndex> = self.env.keys().copied().collect();
        let mut wrapped = Vec::new();
        for index in &in_scope {
            let binding = &self.env[index];
            let (ident, assigned) = (binding.ident.clone(), binding.value.is_some());
            let entry = match &binding.value {
                Some(value) => value.clone(),
                None => {
                    let shape = binding.shape.clone();
                    undef(&mut self.graph, &shape)
                }
            };
            let pre = start_while(&mut self.graph, &entry).rename(&ident);
            wrapped.push((*index, pre.clone(), assigned));
            if let Some(binding) = self.env.get_mut(index) {
                binding.value = Some(pre);
            }
        }

        let cond = self.lower_condition(cond)?;
        trace!(%loc, phase = ?LoopPhase::HeaderBuilt, wrapped = wrapped.len());

        self.loop_depth += 1;
        let body_result = self.lower_stmt(body);
        self.loop_depth -= 1;
        body_result?;
        self.env.retain(|index, _| in_scope.contains(index));
        trace!(%loc, phase = ?LoopPhase::BodyLowered);

        let mut any_changed = false;
        for (index, pre, assigned) in wrapped {
            let binding = &self.env[&index];
            let ident = binding.ident.clone();
            let post = binding.value.clone().unwrap_or_else(|| pre.clone());
            let exit = end_while(&mut self.graph, &cond, &pre, &post);
            any_changed |= exit.changed;
            // A variable the body never assigns stays unassigned after the loop.
            let value = (assigned || exit.changed).then(|| exit.value.rename(&ident));
            if let Some(binding) = self.env.get_mut(&index) {
                binding.value = value;
            }
        }

        if any_changed {
            trace!(%loc, phase = ?LoopPhase::Closed);
        } else {
            trace!(%loc, phase = ?LoopPhase::Infinite);
            self.notice(Notice::InfiniteLoop { loc });
        }
        Ok(())
    }

    fn lower_condition(&mut self, cond: &Expr) -> Result<Signal, LowerError> {
        let value = self.lower_expr(cond)?;
        match value.as_bool() {
            Some(signal) => Ok(signal.clone()),
            None => Err(LowerError::compiler(format!(
                "condition must be a single boolean, found `{}`",
                value.shape()
            ))),
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    /// Lower a right-hand side tuple; a call contributes all its results.
    fn lower_tuple(&mut self, exprs: &[Expr]) -> Result<Vec<ValueTree>, LowerError> {
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            match &expr.kind {
                ExprKind::Invoke {
                    callee,
                    args,
                    params,
                    returns,
                } => out.extend(self.lower_invoke(expr.loc, callee, args, params, returns)?),
                _ => out.push(self.lower_expr(expr)?),
            }
        }
        Ok(out)
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<ValueTree, LowerError> {
        self.enter(expr.loc)?;
        let value = self.lower_expr_kind(expr)?;
        self.leave();
        Ok(value)
    }

    fn lower_expr_kind(&mut self, expr: &Expr) -> Result<ValueTree, LowerError> {
        let loc = expr.loc;
        match &expr.kind {
            ExprKind::Const { value, ty } => {
                let ty = self.scalar(ty, "constant")?;
                Ok(ValueTree::leaf(ty, self.graph.constant(*value, ty)))
            }
            ExprKind::Var { index } => {
                let binding = self.env.get(index).ok_or_else(|| {
                    LowerError::compiler(format!("use of undeclared variable {}", index))
                })?;
                binding.value.clone().ok_or_else(|| {
                    LowerError::compiler(format!("use of unassigned variable `{}`", binding.ident))
                })
            }
            ExprKind::Field { operand, field } => {
                let value = self.lower_expr(operand)?;
                value.field(field).cloned().ok_or_else(|| {
                    LowerError::unsupported(
                        loc,
                        format!("field `{}` of a value of shape `{}`", field, value.shape()),
                    )
                })
            }
            ExprKind::Alias { operand, ty } => {
                let target = self.compile(ty)?;
                let value = self.lower_expr(operand)?;
                alias(&target, &value)
            }
            ExprKind::Unary { op, operand, ty } => {
                let uop = map_unary(*op).ok_or_else(|| LowerError::UnsupportedOperator {
                    loc,
                    op: op.to_string(),
                })?;
                let rty = self.scalar(ty, "operator result")?;
                let value = self.lower_expr(operand)?;
                let value = coerce(&mut self.graph, &value, &TypeShape::Leaf(rty))?;
                let signal = self.leaf_operand(&value)?;
                Ok(ValueTree::leaf(rty, self.graph.unary(uop, rty, &signal)))
            }
            ExprKind::Binary { op, lhs, rhs, ty } => {
                let bop = map_binary(*op).ok_or_else(|| LowerError::UnsupportedOperator {
                    loc,
                    op: op.to_string(),
                })?;
                let rty = self.scalar(ty, "operator result")?;
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                let l = self.leaf_operand(&l)?;
                let r = self.leaf_operand(&r)?;
                Ok(ValueTree::leaf(rty, self.graph.binary(bop, rty, &l, &r)))
            }
            ExprKind::Is { operand, ty } => {
                let target = self.compile(ty)?;
                let value = self.lower_expr(operand)?;
                let flag = flow_type(
                    &mut self.graph,
                    &target,
                    &value,
                    Some(loc),
                    &mut self.notices,
                )?;
                Ok(ValueTree::leaf(ScalarType::Bool, flag))
            }
            ExprKind::Record { fields, ty } => {
                let shape = self.compile(ty)?;
                let mut record = IndexMap::with_capacity(fields.len());
                for init in fields {
                    let value = self.lower_expr(&init.value)?;
                    record.insert(init.name.clone(), value);
                }
                coerce(&mut self.graph, &ValueTree::Record(record), &shape)
            }
            ExprKind::Invoke {
                callee,
                args,
                params,
                returns,
            } => self
                .lower_invoke(loc, callee, args, params, returns)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    LowerError::compiler(format!(
                        "call to `{}` has no result to use as a value",
                        callee
                    ))
                }),
            ExprKind::ArrayLiteral { .. } | ExprKind::ArrayIndex { .. } | ExprKind::Lambda => {
                Err(LowerError::unsupported(loc, expr.kind.name()))
            }
        }
    }

    fn lower_invoke(
        &mut self,
        loc: Loc,
        callee: &str,
        args: &[Expr],
        params: &[SourceType],
        returns: &[SourceType],
    ) -> Result<Vec<ValueTree>, LowerError> {
        if args.len() != params.len() {
            return Err(LowerError::compiler(format!(
                "call to `{}` passes {} arguments for {} parameters",
                callee,
                args.len(),
                params.len()
            )));
        }
        self.enter(loc)?;
        let mut operands = Vec::new();
        for (k, (arg, ty)) in args.iter().zip(params).enumerate() {
            let shape = self.compile(ty)?;
            let value = self.lower_expr(arg)?;
            let name = format!("arg{}", k);
            let value = coerce(&mut self.graph, &value, &shape)?.rename(&name);
            operands.extend(value.named_leaves(&name).into_iter().map(|l| l.signal));
        }
        let call = self.graph.func_call(callee, &operands);

        let mut results = Vec::with_capacity(returns.len());
        for (k, ty) in returns.iter().enumerate() {
            let shape = self.compile(ty)?;
            let graph = &mut self.graph;
            let value = ValueTree::build(&shape, &format!("ret_{}", k), &mut |path, ty, _| {
                graph.func_return(call, path, ty)
            });
            results.push(value);
        }
        debug!(%loc, callee, args = operands.len(), results = results.len(), "lowered call");
        self.leave();
        Ok(results)
    }

    fn scalar(&mut self, ty: &SourceType, what: &str) -> Result<ScalarType, LowerError> {
        let shape = self.compile(ty)?;
        shape.as_leaf().ok_or_else(|| {
            LowerError::compiler(format!("{} must have a scalar type, found `{}`", what, shape))
        })
    }

    fn leaf_operand(&self, value: &ValueTree) -> Result<Signal, LowerError> {
        value
            .as_leaf()
            .map(|leaf| leaf.signal.clone())
            .ok_or_else(|| {
                LowerError::compiler(format!(
                    "operand must be a scalar, found `{}`",
                    value.shape()
                ))
            })
    }
}

/// Whether a variable's value differs from its value before a scope, by
/// producer identity.
fn changed(before: &Option<ValueTree>, after: &Option<ValueTree>) -> bool {
    match (before, after) {
        (None, None) => false,
        (Some(a), Some(b)) => !a.same_producers(b),
        _ => true,
    }
}
