use std::collections::BTreeMap;

use serde::Serialize;

use crate::compiler::ast::{Expr, FilterCall};

/// A single instruction of a compiled template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Instruction {
    /// Emits literal text without escaping.
    EmitText(String),
    /// Evaluates an expression, runs it through the filter pipeline and
    /// emits the result.
    Emit { expr: Expr, filters: Vec<FilterCall> },
    /// Evaluates conditions in order and runs the body of the first arm
    /// that holds; falls through to the default body.
    Branch {
        arms: Vec<(Expr, Vec<Instruction>)>,
        default: Vec<Instruction>,
    },
    /// Iterates a collection, binding `target` and the `loop` record in a
    /// fresh scope frame.  The `empty` body runs instead when the
    /// collection has no elements.
    ForLoop {
        target: String,
        iter: Expr,
        body: Vec<Instruction>,
        empty: Vec<Instruction>,
    },
    /// Assigns into the innermost scope frame.
    Assign { name: String, expr: Expr },
    /// Invokes a named block from the program's block table.
    CallBlock(String),
}

/// A fully linked template program.
///
/// Inheritance is resolved at compile time: `root` is the root ancestor's
/// body and `blocks` holds the winning override for every block name, so
/// rendering never needs to consult another template.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Program {
    /// The top-level instruction sequence.
    pub root: Vec<Instruction>,
    /// Block bodies by name, after override resolution.
    pub blocks: BTreeMap<String, Vec<Instruction>>,
    /// Inheritance chain from this template up to the root ancestor, by
    /// template name.  Empty for templates without `extends`.
    pub ancestors: Vec<String>,
}
