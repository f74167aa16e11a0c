// graph.rs: Arena dataflow graph for one lowered function
//
// Nodes and arrows live in append-only vectors addressed by `NodeId` /
// `EdgeId`. An arrow is created only when a signal handle is consumed as an
// operand of a new node; it carries the handle's identifier as its label and
// registers itself on both endpoints.
//
// Preconditions: operand signals refer to nodes of this graph.
// Postconditions: every edge appears in its source's `outputs` and its
//   target's `inputs`, in creation order.
// Failure modes: none (an out-of-range `NodeId` is a defect and panics).
// Side effects: none.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::id::{EdgeId, Loc, NodeId};
use crate::shape::ScalarType;
use crate::values::Signal;

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
        }
    }
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
        }
    }
}

/// The kind of a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// A function parameter leaf.
    Input { name: String },
    /// A returned leaf.
    Output { name: String },
    Const { value: i64 },
    /// The "don't care" value of a scalar type.
    UndefConst,
    /// The shared `true` / `false` constant.
    ExternConst { value: bool },
    Unary { op: UnaryOp },
    Binary { op: BinaryOp },
    /// A call to another function; consumes every argument leaf.
    FuncCall { callee: String },
    /// One leaf of a call's result, fed by the call node.
    FuncReturn { name: String },
    /// Selector over two leaves from mutually exclusive paths:
    /// operands are (condition, if-true, if-false).
    BranchSelect,
    /// Value entering a loop body; operand is the pre-loop value.
    LoopInput,
    /// Value re-entering a loop: operands are (condition, loop input, post-body value).
    LoopFeedback,
    /// Statement boundary marker.
    Separation,
}

impl NodeKind {
    pub fn label(&self) -> String {
        match self {
            NodeKind::Input { name } => format!("input {}", name),
            NodeKind::Output { name } => format!("output {}", name),
            NodeKind::Const { value } => format!("const {}", value),
            NodeKind::UndefConst => "undef".to_string(),
            NodeKind::ExternConst { value } => value.to_string(),
            NodeKind::Unary { op } => op.as_str().to_string(),
            NodeKind::Binary { op } => op.as_str().to_string(),
            NodeKind::FuncCall { callee } => format!("call {}", callee),
            NodeKind::FuncReturn { name } => format!("return {}", name),
            NodeKind::BranchSelect => "select".to_string(),
            NodeKind::LoopInput => "loop_in".to_string(),
            NodeKind::LoopFeedback => "loop_feedback".to_string(),
            NodeKind::Separation => "separation".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ty: Option<ScalarType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<Loc>,
    pub inputs: Vec<EdgeId>,
    pub outputs: Vec<EdgeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataflowGraph {
    pub name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    #[serde(skip)]
    cursor: Option<Loc>,
    #[serde(skip)]
    undefs: HashMap<ScalarType, NodeId>,
    #[serde(skip)]
    bools: [Option<NodeId>; 2],
    /// Loop inputs closed without feedback; they no longer carry a value.
    #[serde(skip)]
    elided: HashSet<NodeId>,
}

// ── Construction ────────────────────────────────────────────────────────────

impl DataflowGraph {
    pub fn new(name: impl Into<String>) -> Self {
        DataflowGraph {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            cursor: None,
            undefs: HashMap::new(),
            bools: [None, None],
            elided: HashSet::new(),
        }
    }

    /// Location attached to nodes created from now on.
    pub fn set_loc(&mut self, loc: Option<Loc>) {
        self.cursor = loc;
    }

    fn add_node(&mut self, kind: NodeKind, ty: Option<ScalarType>, loc: Option<Loc>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            kind,
            ty,
            loc,
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        id
    }

    fn add_edge(&mut self, source: NodeId, target: NodeId, ident: Option<String>) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge {
            id,
            source,
            target,
            ident,
        });
        self.nodes[source.0 as usize].outputs.push(id);
        self.nodes[target.0 as usize].inputs.push(id);
        id
    }

    /// Create a node and consume `operands` in order.
    fn emit(&mut self, kind: NodeKind, ty: Option<ScalarType>, operands: &[&Signal]) -> NodeId {
        let id = self.add_node(kind, ty, self.cursor);
        for operand in operands {
            self.add_edge(operand.node, id, operand.ident.clone());
        }
        id
    }

    pub fn input(&mut self, name: &str, ty: ScalarType) -> Signal {
        let id = self.emit(NodeKind::Input { name: name.to_string() }, Some(ty), &[]);
        Signal::named(id, name)
    }

    pub fn output(&mut self, name: &str, value: &Signal) -> NodeId {
        let ty = self.node(value.node).ty;
        self.emit(NodeKind::Output { name: name.to_string() }, ty, &[value])
    }

    pub fn constant(&mut self, value: i64, ty: ScalarType) -> Signal {
        if ty.is_bool() {
            return self.boolean(value != 0);
        }
        Signal::anonymous(self.emit(NodeKind::Const { value }, Some(ty), &[]))
    }

    /// The undefined constant of `ty`; one node per scalar type.
    pub fn undef(&mut self, ty: ScalarType) -> Signal {
        if let Some(&id) = self.undefs.get(&ty) {
            return Signal::anonymous(id);
        }
        let id = self.add_node(NodeKind::UndefConst, Some(ty), None);
        self.undefs.insert(ty, id);
        Signal::anonymous(id)
    }

    /// The shared `true` or `false` constant.
    pub fn boolean(&mut self, value: bool) -> Signal {
        let slot = value as usize;
        if let Some(id) = self.bools[slot] {
            return Signal::anonymous(id);
        }
        let id = self.add_node(NodeKind::ExternConst { value }, Some(ScalarType::Bool), None);
        self.bools[slot] = Some(id);
        Signal::anonymous(id)
    }

    pub fn unary(&mut self, op: UnaryOp, ty: ScalarType, operand: &Signal) -> Signal {
        Signal::anonymous(self.emit(NodeKind::Unary { op }, Some(ty), &[operand]))
    }

    pub fn binary(&mut self, op: BinaryOp, ty: ScalarType, lhs: &Signal, rhs: &Signal) -> Signal {
        Signal::anonymous(self.emit(NodeKind::Binary { op }, Some(ty), &[lhs, rhs]))
    }

    pub fn func_call(&mut self, callee: &str, args: &[Signal]) -> NodeId {
        let operands: Vec<&Signal> = args.iter().collect();
        self.emit(
            NodeKind::FuncCall {
                callee: callee.to_string(),
            },
            None,
            &operands,
        )
    }

    pub fn func_return(&mut self, call: NodeId, name: &str, ty: ScalarType) -> Signal {
        let from_call = Signal::named(call, name);
        let id = self.emit(
            NodeKind::FuncReturn {
                name: name.to_string(),
            },
            Some(ty),
            &[&from_call],
        );
        Signal::named(id, name)
    }

    pub fn branch_select(&mut self, cond: &Signal, on_true: &Signal, on_false: &Signal) -> Signal {
        let ty = self.node(on_true.node).ty;
        Signal::anonymous(self.emit(NodeKind::BranchSelect, ty, &[cond, on_true, on_false]))
    }

    pub fn loop_input(&mut self, pre: &Signal) -> Signal {
        let ty = self.node(pre.node).ty;
        let id = self.emit(NodeKind::LoopInput, ty, &[pre]);
        Signal {
            node: id,
            ident: pre.ident.clone(),
        }
    }

    pub fn loop_feedback(&mut self, cond: &Signal, input: &Signal, post: &Signal) -> Signal {
        let ty = self.node(input.node).ty;
        Signal::anonymous(self.emit(NodeKind::LoopFeedback, ty, &[cond, input, post]))
    }

    pub fn separation(&mut self) -> NodeId {
        self.emit(NodeKind::Separation, None, &[])
    }
}

// ── Queries ─────────────────────────────────────────────────────────────────

impl DataflowGraph {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0 as usize]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of arrows leaving `id`.
    pub fn consumers(&self, id: NodeId) -> usize {
        self.node(id).outputs.len()
    }

    /// Arrows leaving `id` that feed a live node. Elided loop inputs are
    /// not counted.
    pub fn live_consumers(&self, id: NodeId) -> usize {
        self.node(id)
            .outputs
            .iter()
            .filter(|&&e| !self.elided.contains(&self.edge(e).target))
            .count()
    }

    /// Mark a loop input as closed without feedback.
    pub fn elide_loop_input(&mut self, id: NodeId) {
        self.elided.insert(id);
    }

    /// Producers feeding `id`, in operand order.
    pub fn operands(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .inputs
            .iter()
            .map(|&e| self.edge(e).source)
            .collect()
    }

    pub fn count_kind(&self, pred: impl Fn(&NodeKind) -> bool) -> usize {
        self.nodes.iter().filter(|n| pred(&n.kind)).count()
    }

    pub fn is_true(&self, signal: &Signal) -> bool {
        self.bools[1] == Some(signal.node)
    }

    pub fn is_false(&self, signal: &Signal) -> bool {
        self.bools[0] == Some(signal.node)
    }

    pub fn is_undef(&self, signal: &Signal) -> bool {
        matches!(self.node(signal.node).kind, NodeKind::UndefConst)
    }

    /// The pre-loop handle that feeds a loop-input node.
    pub fn loop_origin(&self, id: NodeId) -> Option<Signal> {
        let node = self.node(id);
        if node.kind != NodeKind::LoopInput {
            return None;
        }
        let edge = self.edge(*node.inputs.first()?);
        Some(Signal {
            node: edge.source,
            ident: edge.ident.clone(),
        })
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Input { .. }))
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Output { .. }))
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for DataflowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "graph {} ({} nodes, {} edges)",
            self.name,
            self.nodes.len(),
            self.edges.len()
        )?;
        for node in &self.nodes {
            write!(f, "  {} = {}", node.id, node.kind.label())?;
            if !node.inputs.is_empty() {
                let operands: Vec<String> = self
                    .operands(node.id)
                    .iter()
                    .map(|id| id.to_string())
                    .collect();
                write!(f, "({})", operands.join(", "))?;
            }
            if let Some(ty) = node.ty {
                write!(f, " : {}", ty)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
