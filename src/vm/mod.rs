//! The instruction interpreter.
//!
//! Rendering walks a linked [`Program`] with a [`Context`] scope stack and
//! appends to an output string.  Expression evaluation is infallible; the
//! only runtime error is a filter pipeline naming a filter the environment
//! does not know.

mod context;

pub use self::context::Context;

use std::collections::BTreeMap;

use crate::compiler::ast::{BinOp, Expr, FilterCall, Segment, UnaryOp};
use crate::compiler::instructions::{Instruction, Program};
use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::filters::BoxedFilter;
use crate::value::{ops, Value, ValueMap};

pub struct Vm<'env> {
    env: &'env Environment,
    extra_filters: Option<&'env BTreeMap<String, BoxedFilter>>,
}

impl<'env> Vm<'env> {
    pub fn new(env: &'env Environment) -> Vm<'env> {
        Vm {
            env,
            extra_filters: None,
        }
    }

    /// Creates a vm with an additional filter registry consulted before
    /// the environment's own.
    pub fn with_filters(
        env: &'env Environment,
        filters: &'env BTreeMap<String, BoxedFilter>,
    ) -> Vm<'env> {
        Vm {
            env,
            extra_filters: Some(filters),
        }
    }

    fn lookup_filter(&self, name: &str) -> Option<&BoxedFilter> {
        self.extra_filters
            .and_then(|filters| filters.get(name))
            .or_else(|| self.env.get_filter(name))
    }

    /// Renders a program over the given root context.
    ///
    /// `auto_escape` names the filter applied to every output that does not
    /// opt out; `None` disables automatic escaping.
    pub fn render(
        &self,
        program: &Program,
        root: Value,
        auto_escape: Option<&str>,
    ) -> Result<String, Error> {
        let mut ctx = Context::new(root);
        let mut out = String::new();
        ok!(self.eval_body(program, &program.root, &mut ctx, &mut out, auto_escape));
        Ok(out)
    }

    fn eval_body(
        &self,
        program: &Program,
        body: &[Instruction],
        ctx: &mut Context,
        out: &mut String,
        auto_escape: Option<&str>,
    ) -> Result<(), Error> {
        for instruction in body {
            match instruction {
                Instruction::EmitText(text) => out.push_str(text),
                Instruction::Emit { expr, filters } => {
                    let value = self.eval_expr(ctx, expr);
                    let value = ok!(self.apply_pipeline(value, filters, auto_escape));
                    out.push_str(&value.to_string());
                }
                Instruction::Branch { arms, default } => {
                    let mut taken = false;
                    for (cond, arm) in arms {
                        if self.eval_expr(ctx, cond).is_true() {
                            ok!(self.eval_body(program, arm, ctx, out, auto_escape));
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        ok!(self.eval_body(program, default, ctx, out, auto_escape));
                    }
                }
                Instruction::ForLoop {
                    target,
                    iter,
                    body,
                    empty,
                } => {
                    let items = self.eval_expr(ctx, iter).iter_items();
                    ctx.push_frame();
                    if items.is_empty() {
                        ctx.store("loop", loop_record(&items, None));
                        ok!(self.eval_body(program, empty, ctx, out, auto_escape));
                    } else {
                        for (idx, item) in items.iter().enumerate() {
                            ctx.store("loop", loop_record(&items, Some(idx)));
                            ctx.store(target, item.clone());
                            ok!(self.eval_body(program, body, ctx, out, auto_escape));
                        }
                    }
                    ctx.pop_frame();
                }
                Instruction::Assign { name, expr } => {
                    let value = self.eval_expr(ctx, expr);
                    ctx.store(name, value);
                }
                Instruction::CallBlock(name) => {
                    if let Some(block) = program.blocks.get(name) {
                        ctx.push_frame();
                        ok!(self.eval_body(program, block, ctx, out, auto_escape));
                        ctx.pop_frame();
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_pipeline(
        &self,
        value: Value,
        filters: &[FilterCall],
        auto_escape: Option<&str>,
    ) -> Result<Value, Error> {
        let mut value = value;
        for call in filters {
            let filter = match self.lookup_filter(&call.name) {
                Some(filter) => filter,
                None => {
                    return Err(Error::new(
                        ErrorKind::UnknownFilter,
                        format!("filter {} is unknown", call.name),
                    ))
                }
            };
            value = filter.apply(&value, &call.args);
        }
        if let Some(escape) = auto_escape {
            let last = filters.last().map(|call| call.name.as_str());
            if last != Some("safe") && last != Some(escape) {
                if let Some(filter) = self.lookup_filter(escape) {
                    value = filter.apply(&value, &[]);
                }
            }
        }
        Ok(value)
    }

    fn eval_expr(&self, ctx: &Context, expr: &Expr) -> Value {
        match expr {
            Expr::Const(value) => value.clone(),
            Expr::Var(var) => {
                let mut value = ctx.load(&var.name);
                for segment in &var.path {
                    value = match segment {
                        Segment::Attr(name) => value.get_attr(name),
                        Segment::Index(key) => value.get_item(key),
                        Segment::Lookup(name) => {
                            let key = ctx.load(name);
                            value.get_item(&key)
                        }
                    };
                }
                value
            }
            Expr::Unary { op, expr } => {
                let value = self.eval_expr(ctx, expr);
                match op {
                    UnaryOp::Not => Value::from(!value.is_true()),
                    UnaryOp::Neg => ops::neg(&value),
                }
            }
            Expr::Binary { op, left, right } => match op {
                // and/or yield their operands, not booleans
                BinOp::And => {
                    let left = self.eval_expr(ctx, left);
                    if left.is_true() {
                        self.eval_expr(ctx, right)
                    } else {
                        left
                    }
                }
                BinOp::Or => {
                    let left = self.eval_expr(ctx, left);
                    if left.is_true() {
                        left
                    } else {
                        self.eval_expr(ctx, right)
                    }
                }
                _ => {
                    let left = self.eval_expr(ctx, left);
                    let right = self.eval_expr(ctx, right);
                    ops::bin_op(*op, &left, &right)
                }
            },
        }
    }
}

/// Builds the `loop` record bound inside `for` bodies.
///
/// `length`, `first` and `last` describe the collection (`first` and `last`
/// are elements, not flags); `index` and `index0` describe the current
/// iteration and are absent when the else body of an empty loop runs.
fn loop_record(items: &[Value], idx: Option<usize>) -> Value {
    let mut record = ValueMap::new();
    record.insert("length".into(), Value::from(items.len() as i64));
    record.insert(
        "first".into(),
        items.first().cloned().unwrap_or(Value::NULL),
    );
    record.insert("last".into(), items.last().cloned().unwrap_or(Value::NULL));
    if let Some(idx) = idx {
        record.insert("index".into(), Value::from(idx as i64 + 1));
        record.insert("index0".into(), Value::from(idx as i64));
    }
    Value::from(record)
}
