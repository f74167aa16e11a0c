// error.rs: Fatal lowering errors
//
// Every algorithm in the engine returns `Result<_, LowerError>` and
// propagates with `?`. Nothing recovers locally: the per-function driver
// turns the first error into an error diagnostic and drops the function.
//
// Internal defects (merging differently-shaped values, resolving an open
// partial-return tree) are assertions, not variants here.

use thiserror::Error;

use crate::diag::{codes, DiagCode};
use crate::id::Loc;
use crate::shape::TypeShape;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerError {
    #[error("unsupported feature at {loc}: {what}")]
    UnsupportedFeature { loc: Loc, what: String },

    #[error("cannot coerce a value of shape `{value}` to `{target}`")]
    UnrelatedType { target: TypeShape, value: TypeShape },

    #[error("cannot view a value of shape `{value}` as `{target}`")]
    UnsupportedAlias { target: TypeShape, value: TypeShape },

    #[error("cannot assign field `{field}` of a value of shape `{value}` at {loc}")]
    UnsupportedAssignment {
        loc: Loc,
        field: String,
        value: TypeShape,
    },

    #[error("unsupported operator `{op}` at {loc}")]
    UnsupportedOperator { loc: Loc, op: String },

    #[error("cannot test a value of shape `{value}` against `{target}`")]
    UnsupportedFlowTyping { target: TypeShape, value: TypeShape },

    #[error("unsupported type `{ty}`: {reason}")]
    UnsupportedType { ty: String, reason: String },

    #[error("{message}")]
    Compiler { message: String },
}

impl LowerError {
    pub fn compiler(message: impl Into<String>) -> Self {
        LowerError::Compiler {
            message: message.into(),
        }
    }

    pub fn unsupported(loc: Loc, what: impl Into<String>) -> Self {
        LowerError::UnsupportedFeature {
            loc,
            what: what.into(),
        }
    }

    pub fn unrelated(target: &TypeShape, value: &TypeShape) -> Self {
        LowerError::UnrelatedType {
            target: target.clone(),
            value: value.clone(),
        }
    }

    /// Stable diagnostic code for this error kind.
    pub fn code(&self) -> DiagCode {
        match self {
            LowerError::UnsupportedFeature { .. } => codes::E0100,
            LowerError::UnrelatedType { .. } => codes::E0101,
            LowerError::UnsupportedAlias { .. } => codes::E0102,
            LowerError::UnsupportedAssignment { .. } => codes::E0103,
            LowerError::UnsupportedOperator { .. } => codes::E0104,
            LowerError::UnsupportedFlowTyping { .. } => codes::E0105,
            LowerError::UnsupportedType { .. } => codes::E0106,
            LowerError::Compiler { .. } => codes::E0107,
        }
    }
}

/// A lowering error together with the last IR location the lowering entered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct LowerFailure {
    #[source]
    pub error: LowerError,
    pub loc: Option<Loc>,
}
