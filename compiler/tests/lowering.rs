// Lowering scenarios through the library API.
//
// Each test builds IR with `IrBuilder`, lowers it with `lower_program` or
// `lower_function`, and checks the resulting graph structure. Two graphs are
// locked with inline `insta` snapshots of their Display form.

use dfgc::diag::{codes, DiagLevel};
use dfgc::graph::{BinaryOp, DataflowGraph, NodeKind};
use dfgc::id::NodeId;
use dfgc::ir::{Function, IrBuilder, IrOp, Program, SourceType};
use dfgc::lower::{lower_function, FunctionGraph};
use dfgc::pipeline::{lower_program, LowerOptions};
use dfgc::type_compiler::TypeCompiler;

// ── Test helpers ────────────────────────────────────────────────────────────

fn int() -> SourceType {
    SourceType::int(32)
}

fn lower(func: &Function) -> FunctionGraph {
    lower_function(func, &mut TypeCompiler::new(), &LowerOptions::default())
        .unwrap_or_else(|e| panic!("lowering `{}` failed: {}", func.name, e))
}

fn count(g: &DataflowGraph, kind: fn(&NodeKind) -> bool) -> usize {
    g.count_kind(kind)
}

/// The node feeding the output named `name`.
fn output_source(g: &DataflowGraph, name: &str) -> NodeId {
    let out = g
        .outputs()
        .find(|n| n.kind == NodeKind::Output { name: name.to_string() })
        .unwrap_or_else(|| panic!("no output `{}`", name));
    g.operands(out.id)[0]
}

/// f(x: int) -> int { if x > 0 { return x } else { return -x } }
fn abs_function() -> Function {
    let mut b = IrBuilder::new();
    let x = b.fresh_var();
    let lhs = b.var(x);
    let zero = b.int(0);
    let cond = b.binary(IrOp::Gt, lhs, zero, SourceType::Bool);
    let pos = b.var(x);
    let ret_pos = b.ret(vec![pos]);
    let operand = b.var(x);
    let neg = b.unary(IrOp::Neg, operand, int());
    let ret_neg = b.ret(vec![neg]);
    let body = b.if_(cond, ret_pos, Some(ret_neg));
    b.function("abs", vec![("x", int())], vec![int()], body)
}

/// f(x: int) -> int { while true { x = x } return x }
fn spin_function() -> Function {
    let mut b = IrBuilder::new();
    let x = b.fresh_var();
    let t = b.boolean(true);
    let read = b.var(x);
    let set = b.set(x, read);
    let w = b.while_(t, set);
    let read = b.var(x);
    let ret = b.ret(vec![read]);
    let body = b.block(vec![w, ret]);
    b.function("spin", vec![("x", int())], vec![int()], body)
}

// ── Conditionals ────────────────────────────────────────────────────────────

#[test]
fn abs_selects_between_branch_returns() {
    let out = lower(&abs_function());
    let g = &out.graph;
    assert_eq!(g.inputs().count(), 1);
    assert_eq!(g.outputs().count(), 1);
    assert_eq!(count(g, |k| matches!(k, NodeKind::BranchSelect)), 1);
    assert!(out.notices.is_empty());

    let select = output_source(g, "ret_0");
    assert_eq!(g.node(select).kind, NodeKind::BranchSelect);
    let gate = g.operands(select)[0];
    assert_eq!(g.node(gate).kind, NodeKind::Binary { op: BinaryOp::Gt });
}

#[test]
fn abs_graph_snapshot() {
    let out = lower(&abs_function());
    insta::assert_snapshot!(out.graph.to_string(), @r"
    graph abs (6 nodes, 7 edges)
      n0 = input x : s32
      n1 = const 0 : s32
      n2 = gt(n0, n1) : bool
      n3 = neg(n0) : s32
      n4 = select(n2, n0, n3) : s32
      n5 = output ret_0(n4) : s32
    ");
}

#[test]
fn nested_conditional_returns_are_noticed() {
    // f(a, b) { if a { if b { return 1 } } return 0 }
    let mut b = IrBuilder::new();
    let a = b.fresh_var();
    let c = b.fresh_var();
    let cond_b = b.var(c);
    let one = b.int(1);
    let ret_one = b.ret(vec![one]);
    let inner = b.if_(cond_b, ret_one, None);
    let cond_a = b.var(a);
    let outer = b.if_(cond_a, inner, None);
    let zero = b.int(0);
    let ret_zero = b.ret(vec![zero]);
    let body = b.block(vec![outer, ret_zero]);
    let f = b.function(
        "f",
        vec![("a", SourceType::Bool), ("b", SourceType::Bool)],
        vec![int()],
        body,
    );
    let out = lower(&f);
    assert_eq!(out.notices.len(), 1);
    assert_eq!(out.notices[0].code(), codes::N0200);
    assert_eq!(count(&out.graph, |k| matches!(k, NodeKind::BranchSelect)), 2);
    assert_eq!(out.graph.outputs().count(), 1);
}

#[test]
fn early_return_then_fallthrough() {
    // f(x, c) { if c { return x } x = x + 1; return x }
    let mut b = IrBuilder::new();
    let x = b.fresh_var();
    let c = b.fresh_var();
    let cond = b.var(c);
    let early = b.var(x);
    let ret_early = b.ret(vec![early]);
    let iff = b.if_(cond, ret_early, None);
    let lhs = b.var(x);
    let one = b.int(1);
    let sum = b.binary(IrOp::Add, lhs, one, int());
    let set = b.set(x, sum);
    let late = b.var(x);
    let ret_late = b.ret(vec![late]);
    let body = b.block(vec![iff, set, ret_late]);
    let f = b.function("f", vec![("x", int()), ("c", SourceType::Bool)], vec![int()], body);
    let out = lower(&f);
    assert!(out.notices.is_empty());
    let select = output_source(&out.graph, "ret_0");
    let ops = out.graph.operands(select);
    assert_eq!(out.graph.node(ops[1]).kind, NodeKind::Input { name: "x".to_string() });
    assert_eq!(out.graph.node(ops[2]).kind, NodeKind::Binary { op: BinaryOp::Add });
}

// ── Loops ───────────────────────────────────────────────────────────────────

#[test]
fn unchanged_loop_is_infinite_and_has_no_feedback() {
    let out = lower(&spin_function());
    assert_eq!(out.notices.len(), 1);
    assert_eq!(out.notices[0].code(), codes::N0201);
    assert_eq!(count(&out.graph, |k| matches!(k, NodeKind::LoopFeedback)), 0);
    let src = output_source(&out.graph, "ret_0");
    assert_eq!(out.graph.node(src).kind, NodeKind::Input { name: "x".to_string() });
}

#[test]
fn spin_graph_snapshot() {
    let out = lower(&spin_function());
    insta::assert_snapshot!(out.graph.to_string(), @r"
    graph spin (4 nodes, 2 edges)
      n0 = input x : s32
      n1 = loop_in(n0) : s32
      n2 = true : bool
      n3 = output ret_0(n0) : s32
    ");
}

#[test]
fn counting_loop_feeds_back_changed_variable() {
    // f(n) { var i = 0; while i < n { i = i + 1 } return i }
    let mut b = IrBuilder::new();
    let n = b.fresh_var();
    let i = b.fresh_var();
    let zero = b.int(0);
    let decl = b.decl(i, "i", int(), Some(zero));
    let lhs = b.var(i);
    let rhs = b.var(n);
    let cond = b.binary(IrOp::Lt, lhs, rhs, SourceType::Bool);
    let cur = b.var(i);
    let one = b.int(1);
    let next = b.binary(IrOp::Add, cur, one, int());
    let step = b.set(i, next);
    let w = b.while_(cond, step);
    let read = b.var(i);
    let ret = b.ret(vec![read]);
    let body = b.block(vec![decl, w, ret]);
    let f = b.function("count", vec![("n", int())], vec![int()], body);
    let out = lower(&f);
    assert!(out.notices.is_empty());
    let g = &out.graph;
    // `n` never changes but the condition reads its loop input, so it still
    // needs a feedback.
    assert_eq!(count(g, |k| matches!(k, NodeKind::LoopInput)), 2);
    assert_eq!(count(g, |k| matches!(k, NodeKind::LoopFeedback)), 2);
    let fb = output_source(g, "ret_0");
    assert_eq!(g.node(fb).kind, NodeKind::LoopFeedback);
    let ops = g.operands(fb);
    assert_eq!(g.node(ops[0]).kind, NodeKind::Binary { op: BinaryOp::Lt });
    assert_eq!(g.node(ops[1]).kind, NodeKind::LoopInput);
    assert_eq!(g.node(ops[2]).kind, NodeKind::Binary { op: BinaryOp::Add });
}

#[test]
fn outer_loop_around_untouched_inner_loop_has_no_feedback() {
    // f(x) { while true { while true { skip } } return x }
    let mut b = IrBuilder::new();
    let x = b.fresh_var();
    let t = b.boolean(true);
    let skip = b.skip();
    let inner = b.while_(t, skip);
    let t = b.boolean(true);
    let outer = b.while_(t, inner);
    let read = b.var(x);
    let ret = b.ret(vec![read]);
    let body = b.block(vec![outer, ret]);
    let f = b.function("nest", vec![("x", int())], vec![int()], body);
    let out = lower(&f);
    let g = &out.graph;
    assert_eq!(count(g, |k| matches!(k, NodeKind::LoopFeedback)), 0);
    assert_eq!(
        g.node(output_source(g, "ret_0")).kind,
        NodeKind::Input { name: "x".to_string() }
    );
    let found: Vec<_> = out.notices.iter().map(|n| n.code()).collect();
    assert_eq!(found, [codes::N0201, codes::N0201]);
}

#[test]
fn variable_first_assigned_in_loop_is_fed_back() {
    // f(n) { var y: int; while n > 0 { y = n; n = n - 1 } return y }
    let mut b = IrBuilder::new();
    let n = b.fresh_var();
    let y = b.fresh_var();
    let decl = b.decl(y, "y", int(), None);
    let lhs = b.var(n);
    let zero = b.int(0);
    let cond = b.binary(IrOp::Gt, lhs, zero, SourceType::Bool);
    let cur = b.var(n);
    let set_y = b.set(y, cur);
    let cur = b.var(n);
    let one = b.int(1);
    let dec = b.binary(IrOp::Sub, cur, one, int());
    let set_n = b.set(n, dec);
    let step = b.block(vec![set_y, set_n]);
    let w = b.while_(cond, step);
    let read = b.var(y);
    let ret = b.ret(vec![read]);
    let body = b.block(vec![decl, w, ret]);
    let f = b.function("last", vec![("n", int())], vec![int()], body);
    let out = lower(&f);
    assert!(out.notices.is_empty());
    let g = &out.graph;
    assert_eq!(count(g, |k| matches!(k, NodeKind::LoopFeedback)), 2);
    let fb = output_source(g, "ret_0");
    assert_eq!(g.node(fb).kind, NodeKind::LoopFeedback);
    let ops = g.operands(fb);
    // Entering value is undefined; the body stores the loop input of `n`.
    assert_eq!(g.node(ops[1]).kind, NodeKind::LoopInput);
    assert_eq!(g.node(g.operands(ops[1])[0]).kind, NodeKind::UndefConst);
    assert_eq!(g.node(ops[2]).kind, NodeKind::LoopInput);
    assert_eq!(
        g.node(g.operands(ops[2])[0]).kind,
        NodeKind::Input { name: "n".to_string() }
    );
}

// ── Types ───────────────────────────────────────────────────────────────────

#[test]
fn record_literal_in_other_field_order_merges_by_name() {
    // f(p: {x, y}, c) -> {x, y} { if c { p = {y: p.y, x: p.x} } return p }
    let mut b = IrBuilder::new();
    let p = b.fresh_var();
    let c = b.fresh_var();
    let point = SourceType::record([("x", int()), ("y", int())]);
    let cond = b.var(c);
    let read = b.var(p);
    let py = b.field(read, "y");
    let read = b.var(p);
    let px = b.field(read, "x");
    let swapped = b.record(vec![("y", py), ("x", px)], point.clone());
    let set = b.set(p, swapped);
    let iff = b.if_(cond, set, None);
    let read = b.var(p);
    let ret = b.ret(vec![read]);
    let body = b.block(vec![iff, ret]);
    let f = b.function(
        "keep",
        vec![("p", point.clone()), ("c", SourceType::Bool)],
        vec![point],
        body,
    );
    let out = lower(&f);
    let g = &out.graph;
    assert_eq!(count(g, |k| matches!(k, NodeKind::BranchSelect)), 0);
    let outs: Vec<String> = g.outputs().map(|n| n.kind.label()).collect();
    assert_eq!(outs, ["output ret_0_x", "output ret_0_y"]);
    assert_eq!(
        g.node(output_source(g, "ret_0_x")).kind,
        NodeKind::Input { name: "p_x".to_string() }
    );
    assert_eq!(
        g.node(output_source(g, "ret_0_y")).kind,
        NodeKind::Input { name: "p_y".to_string() }
    );
}

#[test]
fn int_returned_as_int_or_bool_union() {
    let mut b = IrBuilder::new();
    let x = b.fresh_var();
    let read = b.var(x);
    let ret = b.ret(vec![read]);
    let either = SourceType::union(vec![int(), SourceType::Bool]);
    let f = b.function("widen", vec![("x", int())], vec![either], ret);
    let out = lower(&f);
    let g = &out.graph;
    assert_eq!(g.outputs().count(), 4);
    assert_eq!(
        g.node(output_source(g, "ret_0_s32_has")).kind,
        NodeKind::ExternConst { value: true }
    );
    assert_eq!(
        g.node(output_source(g, "ret_0_s32_val")).kind,
        NodeKind::Input { name: "x".to_string() }
    );
    assert_eq!(
        g.node(output_source(g, "ret_0_bool_has")).kind,
        NodeKind::ExternConst { value: false }
    );
    assert_eq!(g.node(output_source(g, "ret_0_bool_val")).kind, NodeKind::UndefConst);
}

#[test]
fn type_test_on_known_alternative_folds() {
    // f(x: int) -> bool { var u: int|bool = x; return u is int }
    let mut b = IrBuilder::new();
    let x = b.fresh_var();
    let u = b.fresh_var();
    let either = SourceType::union(vec![int(), SourceType::Bool]);
    let init = b.var(x);
    let decl = b.decl(u, "u", either, Some(init));
    let read = b.var(u);
    let test = b.is(read, int());
    let ret = b.ret(vec![test]);
    let body = b.block(vec![decl, ret]);
    let f = b.function("f", vec![("x", int())], vec![SourceType::Bool], body);
    let out = lower(&f);
    let g = &out.graph;
    assert_eq!(
        g.node(output_source(g, "ret_0")).kind,
        NodeKind::ExternConst { value: true }
    );
}

#[test]
fn field_assignment_rebuilds_record() {
    // f(p: {x, y}) -> {x, y} { p.x = 7; return p }
    let mut b = IrBuilder::new();
    let p = b.fresh_var();
    let point = SourceType::record([("x", int()), ("y", int())]);
    let target = b.lvar(p);
    let target = b.lfield(target, "x");
    let seven = b.int(7);
    let set = b.assign(target, seven);
    let read = b.var(p);
    let ret = b.ret(vec![read]);
    let body = b.block(vec![set, ret]);
    let f = b.function("f", vec![("p", point.clone())], vec![point], body);
    let out = lower(&f);
    let g = &out.graph;
    assert_eq!(g.node(output_source(g, "ret_0_x")).kind, NodeKind::Const { value: 7 });
    assert_eq!(
        g.node(output_source(g, "ret_0_y")).kind,
        NodeKind::Input { name: "p_y".to_string() }
    );
}

#[test]
fn record_construction_and_field_read() {
    // f(a) -> int { var r = {lo: a, hi: 0}; return r.lo }
    let mut b = IrBuilder::new();
    let a = b.fresh_var();
    let r = b.fresh_var();
    let pair = SourceType::record([("lo", int()), ("hi", int())]);
    let lo = b.var(a);
    let hi = b.int(0);
    let rec = b.record(vec![("lo", lo), ("hi", hi)], pair.clone());
    let decl = b.decl(r, "r", pair, Some(rec));
    let read = b.var(r);
    let field = b.field(read, "lo");
    let ret = b.ret(vec![field]);
    let body = b.block(vec![decl, ret]);
    let f = b.function("f", vec![("a", int())], vec![int()], body);
    let out = lower(&f);
    let g = &out.graph;
    assert_eq!(
        g.node(output_source(g, "ret_0")).kind,
        NodeKind::Input { name: "a".to_string() }
    );
}

// ── Calls ───────────────────────────────────────────────────────────────────

#[test]
fn invoke_expands_arguments_and_results() {
    // f(p: {x, y}) -> int { return g(p) }
    let mut b = IrBuilder::new();
    let p = b.fresh_var();
    let point = SourceType::record([("x", int()), ("y", int())]);
    let arg = b.var(p);
    let call = b.call("g", vec![arg], vec![point.clone()], vec![int()]);
    let ret = b.ret(vec![call]);
    let f = b.function("f", vec![("p", point)], vec![int()], ret);
    let out = lower(&f);
    let g = &out.graph;
    let call = g
        .nodes()
        .iter()
        .find(|n| n.kind == NodeKind::FuncCall { callee: "g".to_string() })
        .expect("call node");
    assert_eq!(call.inputs.len(), 2);
    let idents: Vec<Option<&str>> = call
        .inputs
        .iter()
        .map(|e| g.edge(*e).ident.as_deref())
        .collect();
    assert_eq!(idents, [Some("arg0_x"), Some("arg0_y")]);
    assert_eq!(
        g.node(output_source(g, "ret_0")).kind,
        NodeKind::FuncReturn { name: "ret_0".to_string() }
    );
}

#[test]
fn multi_result_call_assigns_tuple() {
    // f() -> (int, int) { var a; var c; a, c = pair(); return c, a }
    let mut b = IrBuilder::new();
    let a = b.fresh_var();
    let c = b.fresh_var();
    let da = b.decl(a, "a", int(), None);
    let dc = b.decl(c, "c", int(), None);
    let call = b.call("pair", vec![], vec![], vec![int(), int()]);
    let la = b.lvar(a);
    let lc = b.lvar(c);
    let set = b.assign_many(vec![la, lc], vec![call]);
    let rc = b.var(c);
    let ra = b.var(a);
    let ret = b.ret(vec![rc, ra]);
    let body = b.block(vec![da, dc, set, ret]);
    let f = b.function("f", vec![], vec![int(), int()], body);
    let out = lower(&f);
    let g = &out.graph;
    assert_eq!(
        g.node(output_source(g, "ret_0")).kind,
        NodeKind::FuncReturn { name: "ret_1".to_string() }
    );
    assert_eq!(
        g.node(output_source(g, "ret_1")).kind,
        NodeKind::FuncReturn { name: "ret_0".to_string() }
    );
}

// ── Program driver ──────────────────────────────────────────────────────────

#[test]
fn failing_function_does_not_stop_the_program() {
    let mut b = IrBuilder::new();
    let x = b.fresh_var();
    let read = b.var(x);
    let ret = b.ret(vec![read]);
    // Returning an int where a record is expected cannot be coerced.
    let bad = b.function(
        "bad",
        vec![("x", int())],
        vec![SourceType::record([("a", SourceType::Bool)])],
        ret,
    );
    let program = Program {
        functions: vec![bad, abs_function(), spin_function()],
    };
    let result = lower_program(&program, &LowerOptions::default());
    assert!(result.has_errors());
    assert_eq!(result.graphs.len(), 2);
    assert!(!result.graphs.contains_key("bad"));

    let error = &result.diagnostics[0];
    assert_eq!(error.level, DiagLevel::Error);
    assert_eq!(error.code, Some(codes::E0101));
    assert!(error.to_string().starts_with("error[E0101]: cannot coerce"));
    assert_eq!(result.notice_count(), 1);
}

#[test]
fn program_decodes_from_json() {
    let json = r#"{
        "functions": [{
            "name": "id",
            "loc": 0,
            "params": [{"name": "x", "ty": {"kind": "int", "width": 8, "signed": false}}],
            "returns": [{"kind": "int", "width": 8, "signed": false}],
            "body": {"loc": 1, "kind": "return", "values": [{"loc": 2, "kind": "var", "index": 0}]}
        }]
    }"#;
    let program: Program = serde_json::from_str(json).unwrap();
    let result = lower_program(&program, &LowerOptions::default());
    assert!(!result.has_errors());
    let g = &result.graphs["id"];
    assert_eq!(g.node_count(), 2);
    assert_eq!(g.to_string(), "graph id (2 nodes, 1 edges)\n  n0 = input x : u8\n  n1 = output ret_0(n0) : u8\n");
}
