//! The expression tree produced by the expression parser.

use serde::Serialize;

use crate::value::Value;

/// A compiled expression.
///
/// Literals (including array and object literals, whose contents must be
/// literal themselves) fold into [`Expr::Const`] at parse time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// A constant value known at compile time.
    Const(Value),
    /// A variable reference with an optional access path.
    Var(VarPath),
    /// A unary operation.
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// A binary operation.
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// A variable root plus the chain of accesses applied to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarPath {
    /// The root identifier looked up in the scope stack.
    pub name: String,
    /// Attribute and subscript accesses, applied left to right.
    pub path: Vec<Segment>,
}

/// One step of an access path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Segment {
    /// Dotted attribute access, `a.b`.
    Attr(String),
    /// Subscript by a literal, `a[0]` or `a["b"]`.
    Index(Value),
    /// Subscript by another variable, `a[b]`; the name resolves against the
    /// scope stack at evaluation time and its value becomes the key.
    Lookup(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
}

/// A single filter invocation in an output pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterCall {
    pub name: String,
    /// Extra arguments after the piped value; literals only.
    pub args: Vec<Value>,
}
