// pipeline.rs: Program driver, options and provenance
//
// Lowers every function of a program independently into its own dataflow
// graph. A function that fails is reported and omitted; the others are
// still produced.
//
// Preconditions: none.
// Postconditions: `graphs` holds one entry per successfully lowered
//   function, in program order; every failure and notice is a diagnostic.
// Failure modes: none at program level; per-function errors become
//   error-level diagnostics.
// Side effects: logging only.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{error, info};

use crate::diag::{DiagLevel, Diagnostic};
use crate::graph::DataflowGraph;
use crate::ir::Program;
use crate::lower::lower_function;
use crate::type_compiler::TypeCompiler;

// ── Options ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowerOptions {
    /// Maximum nesting of statements and expressions.
    pub max_depth: u32,
    /// Emit a separation marker for every `skip`.
    pub emit_separations: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        LowerOptions {
            max_depth: 256,
            emit_separations: true,
        }
    }
}

// ── Program driver ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgramResult {
    pub graphs: IndexMap<String, DataflowGraph>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ProgramResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn notice_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagLevel::Notice)
            .count()
    }
}

pub fn lower_program(program: &Program, options: &LowerOptions) -> ProgramResult {
    let mut types = TypeCompiler::new();
    let mut result = ProgramResult::default();

    for func in &program.functions {
        match lower_function(func, &mut types, options) {
            Ok(lowered) => {
                info!(
                    function = %func.name,
                    nodes = lowered.graph.node_count(),
                    edges = lowered.graph.edge_count(),
                    notices = lowered.notices.len(),
                    "function lowered"
                );
                result.diagnostics.extend(
                    lowered
                        .notices
                        .iter()
                        .map(|n| n.to_diagnostic().in_function(&func.name)),
                );
                result.graphs.insert(func.name.clone(), lowered.graph);
            }
            Err(failure) => {
                error!(function = %func.name, error = %failure, "function dropped");
                result.diagnostics.push(
                    Diagnostic::new(DiagLevel::Error, failure.to_string())
                        .with_code(failure.error.code())
                        .with_loc(failure.loc)
                        .in_function(&func.name),
                );
            }
        }
    }
    result
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Build metadata for `--emit build-info`.
///
/// `source_hash`: SHA-256 of the raw IR text, serialized as hex.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    #[serde(serialize_with = "serialize_hex")]
    pub source_hash: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

fn serialize_hex<S: serde::Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&bytes_to_hex(bytes))
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

pub fn compute_provenance(source: &str) -> Provenance {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let mut source_hash = [0u8; 32];
    source_hash.copy_from_slice(&hasher.finalize());

    Provenance {
        source_hash,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}
