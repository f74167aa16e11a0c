// CLI tests: run the `dfgc` binary on IR programs written to temp files.
//
// Programs are built with `IrBuilder` and serialized with serde_json, so the
// tests exercise the same JSON shape the binary decodes.

use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};

use dfgc::ir::{IrBuilder, Program, SourceType, StmtKind};

fn dfgc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dfgc"))
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Unique counter for temp file names (avoids collisions in parallel tests).
static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn temp_path(ext: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("dfgc_cli_{}_{}.{}", std::process::id(), n, ext))
}

fn write_program(program: &Program) -> PathBuf {
    let path = temp_path("json");
    std::fs::write(&path, serde_json::to_string(program).unwrap()).unwrap();
    path
}

fn run(input: &PathBuf, args: &[&str]) -> Output {
    Command::new(dfgc_binary())
        .arg(input)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run dfgc")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

/// `neg(x: int) -> int { return -x }`
fn negate() -> Program {
    let mut b = IrBuilder::new();
    let x = b.fresh_var();
    let read = b.var(x);
    let neg = b.unary(dfgc::ir::IrOp::Neg, read, SourceType::int(32));
    let ret = b.ret(vec![neg]);
    Program {
        functions: vec![b.function("neg", vec![("x", SourceType::int(32))], vec![SourceType::int(32)], ret)],
    }
}

/// `spin() { while true { skip } }`
fn spin() -> Program {
    let mut b = IrBuilder::new();
    let t = b.boolean(true);
    let skip = b.skip();
    let w = b.while_(t, skip);
    Program {
        functions: vec![b.function("spin", vec![], vec![], w)],
    }
}

/// `broken() { break }` next to a valid function.
fn broken() -> Program {
    let mut program = negate();
    let mut b = IrBuilder::new();
    let brk = b.stmt(StmtKind::Break);
    program.functions.push(b.function("broken", vec![], vec![], brk));
    program
}

// ── Emit stages ─────────────────────────────────────────────────────────────

#[test]
fn emits_graph_listing_by_default() {
    let input = write_program(&negate());
    let out = run(&input, &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(
        stdout(&out),
        "graph neg (3 nodes, 2 edges)\n  n0 = input x : s32\n  n1 = neg(n0) : s32\n  n2 = output ret_0(n1) : s32\n"
    );
}

#[test]
fn emits_dot() {
    let input = write_program(&negate());
    let out = run(&input, &["--emit", "dot"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.starts_with("digraph dfgc {"));
    assert!(text.contains("subgraph cluster_neg {"));
}

#[test]
fn emits_json() {
    let input = write_program(&negate());
    let out = run(&input, &["--emit", "json"]);
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    let nodes = json["graphs"]["neg"]["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[1]["kind"], "unary");
    assert_eq!(nodes[1]["op"], "neg");
    assert_eq!(json["diagnostics"].as_array().unwrap().len(), 0);
}

#[test]
fn emits_build_info() {
    let input = write_program(&negate());
    let out = run(&input, &["--emit", "build-info"]);
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(json["source_hash"].as_str().unwrap().len(), 64);
    assert_eq!(json["compiler_version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn writes_output_file() {
    let input = write_program(&negate());
    let output = temp_path("txt");
    let out = run(&input, &["-o", output.to_str().unwrap()]);
    assert!(out.status.success());
    assert!(stdout(&out).is_empty());
    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("graph neg"));
}

#[test]
fn no_separations_flag_drops_markers() {
    let input = write_program(&spin());
    let with = stdout(&run(&input, &[]));
    let without = stdout(&run(&input, &["--no-separations"]));
    assert!(with.contains("separation"));
    assert!(!without.contains("separation"));
}

// ── Exit codes ──────────────────────────────────────────────────────────────

#[test]
fn missing_input_exits_2() {
    let out = run(&temp_path("missing"), &[]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("dfgc: error:"));
}

#[test]
fn invalid_json_exits_2() {
    let input = temp_path("json");
    std::fs::write(&input, "{ not json").unwrap();
    let out = run(&input, &[]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("invalid IR"));
}

#[test]
fn lowering_error_exits_1_and_keeps_other_functions() {
    let input = write_program(&broken());
    let out = run(&input, &[]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("error[E0100]: unsupported feature"));
    assert!(stderr(&out).contains("--> broken at #"));
    assert!(stdout(&out).starts_with("graph neg"));
}

#[test]
fn notices_fail_only_when_requested() {
    let input = write_program(&spin());
    let lenient = run(&input, &[]);
    assert_eq!(lenient.status.code(), Some(0));
    assert!(stderr(&lenient).contains("notice[N0201]"));

    let strict = run(&input, &["--fail-on-notice"]);
    assert_eq!(strict.status.code(), Some(1));
}

#[test]
fn max_depth_flag_is_applied() {
    let input = write_program(&negate());
    let out = run(&input, &["--max-depth", "2"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("maximum depth of 2"));
}
