// dfgc: Dataflow graph compiler
//
// Library root. Lowers structured imperative IR into per-function dataflow
// graphs; modules are listed leaves first.

pub mod id;
pub mod shape;
pub mod type_compiler;
pub mod ir;
pub mod graph;
pub mod values;
pub mod coerce;
pub mod merge;
pub mod flow_typing;
pub mod alias;
pub mod partial_return;
pub mod assign;
pub mod lower;
pub mod pipeline;
pub mod diag;
pub mod error;
pub mod dot;
