// diag.rs: Unified diagnostics model
//
// Errors, warnings and notices produced while lowering a program all end up
// here. Fatal `LowerError`s are converted by the driver; non-fatal
// `Notice`s are collected per function and converted the same way.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::id::Loc;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0101`, `N0200`).
///
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    pub const E0100: DiagCode = DiagCode("E0100"); // unsupported feature
    pub const E0101: DiagCode = DiagCode("E0101"); // unrelated type
    pub const E0102: DiagCode = DiagCode("E0102"); // unsupported alias
    pub const E0103: DiagCode = DiagCode("E0103"); // unsupported assignment
    pub const E0104: DiagCode = DiagCode("E0104"); // unsupported operator
    pub const E0105: DiagCode = DiagCode("E0105"); // unsupported flow typing
    pub const E0106: DiagCode = DiagCode("E0106"); // unsupported type
    pub const E0107: DiagCode = DiagCode("E0107"); // compiler error

    pub const N0200: DiagCode = DiagCode("N0200"); // nested return
    pub const N0201: DiagCode = DiagCode("N0201"); // infinite loop
    pub const N0202: DiagCode = DiagCode("N0202"); // incompatible type test
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagLevel {
    Error,
    Warning,
    Notice,
}

impl fmt::Display for DiagLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
            DiagLevel::Notice => "notice",
        })
    }
}

// ── Diagnostic ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub loc: Option<Loc>,
    pub function: Option<String>,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            loc: None,
            function: None,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_loc(mut self, loc: Option<Loc>) -> Self {
        self.loc = loc;
        self
    }

    /// Attribute the diagnostic to the function being lowered.
    pub fn in_function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", self.level, code, self.message)?;
        } else {
            write!(f, "{}: {}", self.level, self.message)?;
        }
        match (&self.function, self.loc) {
            (Some(func), Some(loc)) => write!(f, "\n  --> {} at {}", func, loc)?,
            (Some(func), None) => write!(f, "\n  --> {}", func)?,
            (None, Some(loc)) => write!(f, "\n  --> {}", loc)?,
            (None, None) => {}
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

// ── Notices ──────────────────────────────────────────────────────────────

/// Non-fatal observations recorded while lowering a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// A conditional return nested inside another conditional return.
    NestedReturn { loc: Loc },
    /// A loop whose body changes no live variable.
    InfiniteLoop { loc: Loc },
    /// A runtime type test that can never succeed.
    IncompatibleType { loc: Option<Loc> },
}

impl Notice {
    pub fn code(&self) -> DiagCode {
        match self {
            Notice::NestedReturn { .. } => codes::N0200,
            Notice::InfiniteLoop { .. } => codes::N0201,
            Notice::IncompatibleType { .. } => codes::N0202,
        }
    }

    pub fn loc(&self) -> Option<Loc> {
        match self {
            Notice::NestedReturn { loc } | Notice::InfiniteLoop { loc } => Some(*loc),
            Notice::IncompatibleType { loc } => *loc,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let (message, hint) = match self {
            Notice::NestedReturn { .. } => (
                "nested conditional return",
                "every path now selects its return value through a chain of selectors",
            ),
            Notice::InfiniteLoop { .. } => (
                "loop body changes no variable; the loop never terminates",
                "assign a variable the loop condition depends on",
            ),
            Notice::IncompatibleType { .. } => (
                "type test can never succeed",
                "the tested value's type has no alternative of the target type",
            ),
        };
        Diagnostic::new(DiagLevel::Notice, message)
            .with_code(self.code())
            .with_loc(self.loc())
            .with_hint(hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code_and_location() {
        let d = Diagnostic::new(DiagLevel::Error, "bad operator")
            .with_code(codes::E0104)
            .with_loc(Some(Loc(7)))
            .in_function("f");
        assert_eq!(format!("{d}"), "error[E0104]: bad operator\n  --> f at #7");
    }

    #[test]
    fn notice_conversion() {
        let d = Notice::InfiniteLoop { loc: Loc(2) }.to_diagnostic();
        assert_eq!(d.level, DiagLevel::Notice);
        assert_eq!(d.code, Some(codes::N0201));
        assert_eq!(d.loc, Some(Loc(2)));
        assert!(!d.is_error());
        assert!(d.hint.is_some());
    }
}
