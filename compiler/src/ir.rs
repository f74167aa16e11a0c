// ir.rs: Imperative intermediate representation
//
// The structured, statically-typed program the lowering engine consumes:
// functions made of blocks, declarations, assignments, conditionals and
// loops over typed expressions. The front end hands it over as JSON; tests
// and benches build it with `IrBuilder`.
//
// Preconditions: variable indices are unique per function and parameters
//   occupy `0..params.len()`.
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{IdAllocator, Loc, VarIndex};
pub use crate::type_compiler::{FieldType, SourceType};

// ── Program ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Function>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub loc: Loc,
    pub params: Vec<Param>,
    #[serde(default)]
    pub returns: Vec<SourceType>,
    pub body: Stmt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: SourceType,
}

// ── Statements ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub loc: Loc,
    #[serde(flatten)]
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StmtKind {
    Block {
        stmts: Vec<Stmt>,
    },
    VarDecl {
        index: VarIndex,
        name: String,
        ty: SourceType,
        #[serde(default)]
        init: Option<Expr>,
    },
    Assign {
        lhs: Vec<LValue>,
        rhs: Vec<Expr>,
    },
    Return {
        #[serde(default)]
        values: Vec<Expr>,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        #[serde(default)]
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    Skip,
    Break,
    Continue,
    Assert {
        cond: Expr,
    },
    Switch {
        value: Expr,
        cases: Vec<SwitchCase>,
        #[serde(default)]
        default: Option<Box<Stmt>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub values: Vec<i64>,
    pub body: Stmt,
}

impl StmtKind {
    pub fn name(&self) -> &'static str {
        match self {
            StmtKind::Block { .. } => "block",
            StmtKind::VarDecl { .. } => "variable declaration",
            StmtKind::Assign { .. } => "assignment",
            StmtKind::Return { .. } => "return",
            StmtKind::If { .. } => "if",
            StmtKind::While { .. } => "while",
            StmtKind::Skip => "skip",
            StmtKind::Break => "break",
            StmtKind::Continue => "continue",
            StmtKind::Assert { .. } => "assert",
            StmtKind::Switch { .. } => "switch",
        }
    }
}

// ── Expressions ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub loc: Loc,
    #[serde(flatten)]
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprKind {
    Const {
        value: i64,
        ty: SourceType,
    },
    Var {
        index: VarIndex,
    },
    Field {
        operand: Box<Expr>,
        field: String,
    },
    Alias {
        operand: Box<Expr>,
        ty: SourceType,
    },
    Unary {
        op: IrOp,
        operand: Box<Expr>,
        ty: SourceType,
    },
    Binary {
        op: IrOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        ty: SourceType,
    },
    Is {
        operand: Box<Expr>,
        ty: SourceType,
    },
    Record {
        fields: Vec<FieldInit>,
        ty: SourceType,
    },
    Invoke {
        callee: String,
        args: Vec<Expr>,
        params: Vec<SourceType>,
        #[serde(default)]
        returns: Vec<SourceType>,
    },
    ArrayLiteral {
        elements: Vec<Expr>,
    },
    ArrayIndex {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Lambda,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInit {
    pub name: String,
    pub value: Expr,
}

impl ExprKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Const { .. } => "constant",
            ExprKind::Var { .. } => "variable",
            ExprKind::Field { .. } => "field access",
            ExprKind::Alias { .. } => "alias",
            ExprKind::Unary { .. } => "unary operation",
            ExprKind::Binary { .. } => "binary operation",
            ExprKind::Is { .. } => "type test",
            ExprKind::Record { .. } => "record construction",
            ExprKind::Invoke { .. } => "invocation",
            ExprKind::ArrayLiteral { .. } => "array literal",
            ExprKind::ArrayIndex { .. } => "array access",
            ExprKind::Lambda => "lambda",
        }
    }
}

/// Operators as spelled by the front end. Not every operator has a
/// hardware counterpart; see `lower::map_unary` / `lower::map_binary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrOp {
    Neg,
    Not,
    BitwiseNot,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    Shl,
    Shr,
    ArrayLength,
}

impl IrOp {
    pub fn as_str(self) -> &'static str {
        match self {
            IrOp::Neg => "neg",
            IrOp::Not => "not",
            IrOp::BitwiseNot => "bitwise_not",
            IrOp::Add => "add",
            IrOp::Sub => "sub",
            IrOp::Mul => "mul",
            IrOp::Div => "div",
            IrOp::Rem => "rem",
            IrOp::Eq => "eq",
            IrOp::Ne => "ne",
            IrOp::Lt => "lt",
            IrOp::Le => "le",
            IrOp::Gt => "gt",
            IrOp::Ge => "ge",
            IrOp::And => "and",
            IrOp::Or => "or",
            IrOp::BitwiseAnd => "bitwise_and",
            IrOp::BitwiseOr => "bitwise_or",
            IrOp::BitwiseXor => "bitwise_xor",
            IrOp::Shl => "shl",
            IrOp::Shr => "shr",
            IrOp::ArrayLength => "array_length",
        }
    }
}

impl fmt::Display for IrOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Assignment targets ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LValue {
    pub loc: Loc,
    #[serde(flatten)]
    pub kind: LValueKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LValueKind {
    Var { index: VarIndex },
    Field { operand: Box<LValue>, field: String },
    Alias { operand: Box<LValue>, ty: SourceType },
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Programmatic IR construction with fresh, increasing locations.
#[derive(Debug, Default)]
pub struct IrBuilder {
    ids: IdAllocator,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next variable index. Allocate parameters first.
    pub fn fresh_var(&mut self) -> VarIndex {
        self.ids.alloc_var()
    }

    pub fn expr(&mut self, kind: ExprKind) -> Expr {
        Expr {
            loc: self.ids.alloc_loc(),
            kind,
        }
    }

    pub fn stmt(&mut self, kind: StmtKind) -> Stmt {
        Stmt {
            loc: self.ids.alloc_loc(),
            kind,
        }
    }

    pub fn var(&mut self, index: VarIndex) -> Expr {
        self.expr(ExprKind::Var { index })
    }

    pub fn constant(&mut self, value: i64, ty: SourceType) -> Expr {
        self.expr(ExprKind::Const { value, ty })
    }

    pub fn int(&mut self, value: i64) -> Expr {
        self.constant(value, SourceType::int(32))
    }

    pub fn boolean(&mut self, value: bool) -> Expr {
        self.constant(value as i64, SourceType::Bool)
    }

    pub fn unary(&mut self, op: IrOp, operand: Expr, ty: SourceType) -> Expr {
        self.expr(ExprKind::Unary {
            op,
            operand: Box::new(operand),
            ty,
        })
    }

    pub fn binary(&mut self, op: IrOp, lhs: Expr, rhs: Expr, ty: SourceType) -> Expr {
        self.expr(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        })
    }

    pub fn field(&mut self, operand: Expr, field: &str) -> Expr {
        self.expr(ExprKind::Field {
            operand: Box::new(operand),
            field: field.to_string(),
        })
    }

    pub fn alias(&mut self, operand: Expr, ty: SourceType) -> Expr {
        self.expr(ExprKind::Alias {
            operand: Box::new(operand),
            ty,
        })
    }

    pub fn is(&mut self, operand: Expr, ty: SourceType) -> Expr {
        self.expr(ExprKind::Is {
            operand: Box::new(operand),
            ty,
        })
    }

    pub fn record(&mut self, fields: Vec<(&str, Expr)>, ty: SourceType) -> Expr {
        let fields = fields
            .into_iter()
            .map(|(name, value)| FieldInit {
                name: name.to_string(),
                value,
            })
            .collect();
        self.expr(ExprKind::Record { fields, ty })
    }

    pub fn call(
        &mut self,
        callee: &str,
        args: Vec<Expr>,
        params: Vec<SourceType>,
        returns: Vec<SourceType>,
    ) -> Expr {
        self.expr(ExprKind::Invoke {
            callee: callee.to_string(),
            args,
            params,
            returns,
        })
    }

    pub fn lvar(&mut self, index: VarIndex) -> LValue {
        LValue {
            loc: self.ids.alloc_loc(),
            kind: LValueKind::Var { index },
        }
    }

    pub fn lfield(&mut self, operand: LValue, field: &str) -> LValue {
        LValue {
            loc: self.ids.alloc_loc(),
            kind: LValueKind::Field {
                operand: Box::new(operand),
                field: field.to_string(),
            },
        }
    }

    pub fn lalias(&mut self, operand: LValue, ty: SourceType) -> LValue {
        LValue {
            loc: self.ids.alloc_loc(),
            kind: LValueKind::Alias {
                operand: Box::new(operand),
                ty,
            },
        }
    }

    pub fn decl(
        &mut self,
        index: VarIndex,
        name: &str,
        ty: SourceType,
        init: Option<Expr>,
    ) -> Stmt {
        self.stmt(StmtKind::VarDecl {
            index,
            name: name.to_string(),
            ty,
            init,
        })
    }

    pub fn assign(&mut self, lhs: LValue, rhs: Expr) -> Stmt {
        self.stmt(StmtKind::Assign {
            lhs: vec![lhs],
            rhs: vec![rhs],
        })
    }

    /// `x = e` for a plain variable target.
    pub fn set(&mut self, index: VarIndex, rhs: Expr) -> Stmt {
        let lhs = self.lvar(index);
        self.assign(lhs, rhs)
    }

    pub fn assign_many(&mut self, lhs: Vec<LValue>, rhs: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Assign { lhs, rhs })
    }

    pub fn ret(&mut self, values: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Return { values })
    }

    pub fn if_(&mut self, cond: Expr, then: Stmt, otherwise: Option<Stmt>) -> Stmt {
        self.stmt(StmtKind::If {
            cond,
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        })
    }

    pub fn while_(&mut self, cond: Expr, body: Stmt) -> Stmt {
        self.stmt(StmtKind::While {
            cond,
            body: Box::new(body),
        })
    }

    pub fn block(&mut self, stmts: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::Block { stmts })
    }

    pub fn skip(&mut self) -> Stmt {
        self.stmt(StmtKind::Skip)
    }

    pub fn function(
        &mut self,
        name: &str,
        params: Vec<(&str, SourceType)>,
        returns: Vec<SourceType>,
        body: Stmt,
    ) -> Function {
        Function {
            name: name.to_string(),
            loc: self.ids.alloc_loc(),
            params: params
                .into_iter()
                .map(|(name, ty)| Param {
                    name: name.to_string(),
                    ty,
                })
                .collect(),
            returns,
            body,
        }
    }
}
