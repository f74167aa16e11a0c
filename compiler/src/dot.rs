// dot.rs: Graphviz DOT output for lowered dataflow graphs
//
// Renders every function's graph as one cluster of a single digraph,
// suitable for `dot` or other Graphviz layout engines. Arrows carrying a
// named signal are labelled with its identifier; loop-feedback arrows are
// highlighted.
//
// Preconditions: none.
// Postconditions: returns a valid DOT string; output is deterministic.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::{self, Write};

use indexmap::IndexMap;

use crate::graph::{DataflowGraph, NodeKind};
use crate::id::NodeId;

/// Emit the lowered graphs as a Graphviz DOT string.
pub fn emit_dot(graphs: &IndexMap<String, DataflowGraph>) -> String {
    let mut buf = String::new();
    // Writing into a `String` cannot fail.
    let _ = write_dot(&mut buf, graphs);
    buf
}

fn write_dot(buf: &mut String, graphs: &IndexMap<String, DataflowGraph>) -> fmt::Result {
    writeln!(buf, "digraph dfgc {{")?;
    writeln!(buf, "    rankdir=TB;")?;
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];")?;
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];")?;

    for (name, graph) in graphs {
        let func = sanitize(name);
        writeln!(buf)?;
        writeln!(buf, "    subgraph cluster_{func} {{")?;
        writeln!(buf, "        label=\"function: {}\";", escape(name))?;
        writeln!(buf, "        style=rounded;")?;
        writeln!(buf, "        color=gray50;")?;
        write_graph_contents(buf, &func, graph, "        ")?;
        writeln!(buf, "    }}")?;
    }

    writeln!(buf, "}}")
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn dot_node_id(func: &str, node: NodeId) -> String {
    format!("{func}_n{}", node.0)
}

fn node_attrs(graph: &DataflowGraph, node: NodeId) -> String {
    let node = graph.node(node);
    let (shape, color) = match node.kind {
        NodeKind::Input { .. } | NodeKind::Output { .. } => ("ellipse", "lightblue"),
        NodeKind::Const { .. } | NodeKind::ExternConst { .. } => ("plaintext", "white"),
        NodeKind::UndefConst => ("plaintext", "gray90"),
        NodeKind::Unary { .. } | NodeKind::Binary { .. } => ("box", "lightyellow"),
        NodeKind::FuncCall { .. } | NodeKind::FuncReturn { .. } => ("box3d", "lightsalmon"),
        NodeKind::BranchSelect => ("invtrapezium", "lightgreen"),
        NodeKind::LoopInput | NodeKind::LoopFeedback => ("house", "plum"),
        NodeKind::Separation => ("point", "black"),
    };
    let mut label = node.kind.label();
    if let Some(ty) = node.ty {
        let _ = write!(label, " : {}", ty);
    }
    format!(
        "shape={shape}, style=filled, fillcolor={color}, label=\"{}\"",
        escape(&label)
    )
}

fn write_graph_contents(
    buf: &mut String,
    func: &str,
    graph: &DataflowGraph,
    indent: &str,
) -> fmt::Result {
    for node in graph.nodes() {
        let id = dot_node_id(func, node.id);
        writeln!(buf, "{indent}{id} [{}];", node_attrs(graph, node.id))?;
    }

    writeln!(buf)?;

    for edge in graph.edges() {
        let src = dot_node_id(func, edge.source);
        let tgt = dot_node_id(func, edge.target);
        let mut attrs = Vec::new();
        if let Some(ident) = &edge.ident {
            attrs.push(format!("label=\"{}\"", escape(ident)));
        }
        if graph.node(edge.source).kind == NodeKind::LoopFeedback {
            attrs.push("style=bold, color=blue, constraint=false".to_string());
        }
        if attrs.is_empty() {
            writeln!(buf, "{indent}{src} -> {tgt};")?;
        } else {
            writeln!(buf, "{indent}{src} -> {tgt} [{}];", attrs.join(", "))?;
        }
    }
    Ok(())
}
