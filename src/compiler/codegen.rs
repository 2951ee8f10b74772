//! The directive dispatcher and inheritance linker.
//!
//! Compilation walks the token stream with a frame stack: every open
//! directive (`if`, `for`, `block`) pushes a frame that collects the
//! instructions of its body, and the matching end directive pops it and
//! emits a single structured instruction into the frame below.
//!
//! Inheritance resolves here as well.  When a template opens with
//! `extends`, the rest of it becomes silent: nothing it emits at the top
//! level survives, but its blocks overwrite entries in the program's block
//! table.  The ancestor chain is walked immediately, so ancestors register
//! their defaults first and every descendant processed afterwards wins by
//! overwriting.  `include` also resolves here, splicing the included
//! template's instructions into the inclusion point so it shares the
//! surrounding scope.  The linked [`Program`] is self-contained and never
//! consults another template at render time.

use std::collections::{HashMap, HashSet};

use crate::compiler::ast::{Expr, FilterCall};
use crate::compiler::instructions::{Instruction, Program};
use crate::compiler::lexer::tokenize;
use crate::compiler::parser::{parse_expr, parse_filter};
use crate::compiler::tokens::Token;
use crate::error::{Error, ErrorKind};

/// Callback used to fetch ancestor template sources by name.
pub type SourceResolver<'a> = &'a dyn Fn(&str) -> Result<String, Error>;

fn syntax_error(detail: String) -> Error {
    Error::new(ErrorKind::SyntaxError, detail)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// One open construct during compilation.
enum Frame {
    /// The template's top-level body.
    Body(Vec<Instruction>),
    /// An open `if`; `default` switches to `Some` once `else` is seen.
    Branch {
        arms: Vec<(Expr, Vec<Instruction>)>,
        cond: Expr,
        body: Vec<Instruction>,
        default: Option<Vec<Instruction>>,
    },
    /// An open `for`; `empty` switches to `Some` once `else` is seen.
    Loop {
        target: String,
        iter: Expr,
        body: Vec<Instruction>,
        empty: Option<Vec<Instruction>>,
    },
    /// An open `block`.
    Block { name: String, body: Vec<Instruction> },
}

impl Frame {
    fn sink(&mut self) -> &mut Vec<Instruction> {
        match self {
            Frame::Body(body) => body,
            Frame::Branch {
                body,
                default: None,
                ..
            } => body,
            Frame::Branch {
                default: Some(default),
                ..
            } => default,
            Frame::Loop {
                body, empty: None, ..
            } => body,
            Frame::Loop {
                empty: Some(empty), ..
            } => empty,
            Frame::Block { body, .. } => body,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Frame::Body(_) => "template",
            Frame::Branch { .. } => "`if` tag",
            Frame::Loop { .. } => "`for` tag",
            Frame::Block { .. } => "`block` tag",
        }
    }
}

/// How a template entered the compiler.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ParseMode {
    /// The template compilation started with.
    Entry,
    /// An ancestor reached through `extends`; its blocks provide defaults
    /// and its top level becomes the program root.
    Parent,
    /// A template pulled in by `include`; its instructions splice into the
    /// including template.
    Include,
}

/// Per-template compilation state; every template of an extends or include
/// chain gets a fresh one, so recursive re-entry cannot leak flags.
struct TemplateState {
    mode: ParseMode,
    /// The template itself opened with `extends`.
    has_parent: bool,
    /// Top-level output of this template is suppressed; implied by
    /// `has_parent`.
    silent: bool,
    /// A non-comment, non-whitespace token has been dispatched, which
    /// forecloses `extends`.
    seen_content: bool,
    frames: Vec<Frame>,
    block_names: HashSet<String>,
    /// Ordinal for auto-naming anonymous blocks, counted per template so
    /// the n-th anonymous block of a child pairs with the n-th of its
    /// parent.
    anon_blocks: usize,
}

impl TemplateState {
    fn new(mode: ParseMode) -> TemplateState {
        TemplateState {
            mode,
            has_parent: false,
            silent: false,
            seen_content: false,
            frames: vec![Frame::Body(Vec::new())],
            block_names: HashSet::new(),
            anon_blocks: 0,
        }
    }

    /// Blocks register in the program's table instead of rendering inline.
    fn blocks_register(&self) -> bool {
        self.mode == ParseMode::Parent || self.has_parent
    }

    fn emit(&mut self, instruction: Instruction) {
        if self.silent && self.frames.len() == 1 {
            return;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.sink().push(instruction);
        }
    }
}

/// Compiles and links one entry template into a [`Program`].
pub struct CodeGenerator<'a> {
    resolve: SourceResolver<'a>,
    /// Ancestor sources fetched during this compilation.
    sources: HashMap<String, String>,
    /// Names currently being compiled, innermost last.
    in_flight: Vec<String>,
    program: Program,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(resolve: SourceResolver<'a>) -> CodeGenerator<'a> {
        CodeGenerator {
            resolve,
            sources: HashMap::new(),
            in_flight: Vec::new(),
            program: Program::default(),
        }
    }

    /// Compiles the given source, walking `extends` and `include` chains
    /// through the resolver.
    pub fn compile(mut self, name: &str, source: &str) -> Result<Program, Error> {
        ok!(self.process_template(name, source, ParseMode::Entry));
        Ok(self.program)
    }

    fn process_template(
        &mut self,
        name: &str,
        source: &str,
        mode: ParseMode,
    ) -> Result<Vec<Instruction>, Error> {
        if self.in_flight.iter().any(|other| other == name) {
            return Err(Error::new(
                ErrorKind::CircularReference,
                format!("template {name:?} resolves through itself"),
            ));
        }
        self.in_flight.push(name.to_string());

        let tokens = ok!(tokenize(source, name));

        let mut state = TemplateState::new(mode);
        for (token, lineno) in tokens {
            ok!(self.dispatch(&mut state, name, token, lineno));
        }

        if state.frames.len() > 1 {
            let frame = &state.frames[state.frames.len() - 1];
            let mut err = syntax_error(format!("unclosed {}", frame.describe()));
            err.set_location_if_unset(name, 0);
            return Err(err);
        }
        let body = match state.frames.pop() {
            Some(Frame::Body(body)) => body,
            _ => Vec::new(),
        };

        self.in_flight.pop();
        match mode {
            // included instructions splice into the including template
            ParseMode::Include => Ok(body),
            _ if !state.has_parent => {
                self.program.root = body;
                Ok(Vec::new())
            }
            // a template with a parent contributes blocks only; the root
            // body comes from its deepest ancestor
            _ => Ok(Vec::new()),
        }
    }

    fn dispatch(
        &mut self,
        state: &mut TemplateState,
        name: &str,
        token: Token,
        lineno: usize,
    ) -> Result<(), Error> {
        let significant = !matches!(
            token,
            Token::Comment
        ) && !matches!(token, Token::Text(ref text) if text.trim().is_empty());

        let rv = match token {
            Token::Text(text) => {
                state.emit(Instruction::EmitText(text));
                Ok(())
            }
            Token::Raw(text) => {
                if !text.is_empty() {
                    state.emit(Instruction::EmitText(text));
                }
                Ok(())
            }
            Token::Comment => Ok(()),
            Token::Output { expr, filters } => self.output(state, &expr, &filters),
            Token::Directive { name: tag, args } => self.directive(state, name, &tag, &args),
        };

        if significant {
            state.seen_content = true;
        }
        rv.map_err(|mut err| {
            err.set_location_if_unset(name, lineno);
            err
        })
    }

    fn output(
        &mut self,
        state: &mut TemplateState,
        expr: &str,
        filters: &[String],
    ) -> Result<(), Error> {
        let expr = ok!(parse_expr(expr));
        let filters = ok!(filters
            .iter()
            .map(|segment| parse_filter(segment))
            .collect::<Result<Vec<FilterCall>, Error>>());
        state.emit(Instruction::Emit { expr, filters });
        Ok(())
    }

    fn directive(
        &mut self,
        state: &mut TemplateState,
        template: &str,
        tag: &str,
        args: &str,
    ) -> Result<(), Error> {
        match tag {
            "if" => {
                let cond = ok!(parse_expr(args));
                state.frames.push(Frame::Branch {
                    arms: Vec::new(),
                    cond,
                    body: Vec::new(),
                    default: None,
                });
                Ok(())
            }
            "elseif" | "elif" => {
                let next_cond = ok!(parse_expr(args));
                match state.frames.last_mut() {
                    Some(Frame::Branch {
                        arms,
                        cond,
                        body,
                        default: None,
                    }) => {
                        arms.push((
                            std::mem::replace(cond, next_cond),
                            std::mem::take(body),
                        ));
                        Ok(())
                    }
                    Some(Frame::Branch { .. }) => {
                        Err(syntax_error(format!("`{tag}` after `else`")))
                    }
                    _ => Err(syntax_error(format!("`{tag}` outside of `if` tag"))),
                }
            }
            "else" => {
                ok!(expect_no_args(tag, args));
                match state.frames.last_mut() {
                    Some(Frame::Branch { default, .. }) => {
                        if default.is_some() {
                            Err(syntax_error("duplicate `else` tag".into()))
                        } else {
                            *default = Some(Vec::new());
                            Ok(())
                        }
                    }
                    Some(Frame::Loop { empty, .. }) => {
                        if empty.is_some() {
                            Err(syntax_error("duplicate `else` tag".into()))
                        } else {
                            *empty = Some(Vec::new());
                            Ok(())
                        }
                    }
                    _ => Err(syntax_error(
                        "`else` outside of `if` or `for` tag".into(),
                    )),
                }
            }
            "endif" => match state.frames.pop() {
                Some(Frame::Branch {
                    mut arms,
                    cond,
                    body,
                    default,
                }) => {
                    arms.push((cond, body));
                    state.emit(Instruction::Branch {
                        arms,
                        default: default.unwrap_or_default(),
                    });
                    Ok(())
                }
                other => Err(unbalanced_end(state, "endif", other)),
            },
            "for" => {
                let (target, iter) = ok!(parse_loop_args(tag, args));
                state.frames.push(Frame::Loop {
                    target,
                    iter,
                    body: Vec::new(),
                    empty: None,
                });
                Ok(())
            }
            "endfor" => match state.frames.pop() {
                Some(Frame::Loop {
                    target,
                    iter,
                    body,
                    empty,
                }) => {
                    state.emit(Instruction::ForLoop {
                        target,
                        iter,
                        body,
                        empty: empty.unwrap_or_default(),
                    });
                    Ok(())
                }
                other => Err(unbalanced_end(state, tag, other)),
            },
            "set" | "assign" => {
                let (name, expr) = ok!(parse_set_args(tag, args));
                state.emit(Instruction::Assign { name, expr });
                Ok(())
            }
            "block" => {
                let name = if args.is_empty() {
                    state.anon_blocks += 1;
                    format!("block_{}", state.anon_blocks)
                } else if is_identifier(args) {
                    args.to_string()
                } else {
                    return Err(syntax_error(format!(
                        "`block` requires an identifier name, got `{args}`"
                    )));
                };
                if !state.block_names.insert(name.clone()) {
                    return Err(syntax_error(format!(
                        "duplicate block `{name}` in template"
                    )));
                }
                state.frames.push(Frame::Block {
                    name,
                    body: Vec::new(),
                });
                Ok(())
            }
            "endblock" => match state.frames.pop() {
                Some(Frame::Block { name, body }) => {
                    if state.blocks_register() {
                        // descendants are processed after their ancestors,
                        // so the last insert is the nearest override
                        self.program.blocks.insert(name.clone(), body);
                        state.emit(Instruction::CallBlock(name));
                    } else {
                        // standalone blocks render in place, without a
                        // scope frame of their own
                        let suppress = state.silent && state.frames.len() == 1;
                        if !suppress {
                            if let Some(frame) = state.frames.last_mut() {
                                frame.sink().extend(body);
                            }
                        }
                    }
                    Ok(())
                }
                other => Err(unbalanced_end(state, "endblock", other)),
            },
            "extends" => self.extends(state, template, args),
            "include" => self.include(state, args),
            "endraw" => Err(syntax_error("`endraw` without matching `raw`".into())),
            _ => Err(syntax_error(format!("unknown `{tag}` tag"))),
        }
    }

    fn extends(
        &mut self,
        state: &mut TemplateState,
        template: &str,
        args: &str,
    ) -> Result<(), Error> {
        if state.mode == ParseMode::Include {
            return Err(syntax_error(
                "`extends` is not allowed in included templates".into(),
            ));
        }
        if state.has_parent {
            return Err(syntax_error("multiple `extends` tags in one template".into()));
        }
        if state.seen_content {
            return Err(syntax_error(
                "`extends` must come before any other content".into(),
            ));
        }
        let parent = ok!(parse_template_name("extends", args));
        if parent == template {
            return Err(Error::new(
                ErrorKind::CircularReference,
                format!("template {template:?} extends itself"),
            ));
        }
        state.has_parent = true;
        state.silent = true;
        self.program.ancestors.push(parent.clone());

        let source = ok!(self.fetch_source(&parent));
        ok!(self.process_template(&parent, &source, ParseMode::Parent));
        Ok(())
    }

    fn include(&mut self, state: &mut TemplateState, args: &str) -> Result<(), Error> {
        let name = ok!(parse_template_name("include", args));
        let source = ok!(self.fetch_source(&name));
        let body = ok!(self.process_template(&name, &source, ParseMode::Include));
        for instruction in body {
            state.emit(instruction);
        }
        Ok(())
    }

    fn fetch_source(&mut self, name: &str) -> Result<String, Error> {
        if let Some(source) = self.sources.get(name) {
            return Ok(source.clone());
        }
        let source = ok!((self.resolve)(name));
        self.sources.insert(name.to_string(), source.clone());
        Ok(source)
    }
}

fn expect_no_args(tag: &str, args: &str) -> Result<(), Error> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(syntax_error(format!("`{tag}` takes no arguments")))
    }
}

fn unbalanced_end(state: &mut TemplateState, tag: &str, frame: Option<Frame>) -> Error {
    let detail = match frame {
        Some(frame) => {
            let detail = format!("`{tag}` does not close {}", frame.describe());
            state.frames.push(frame);
            detail
        }
        None => format!("`{tag}` without open tag"),
    };
    syntax_error(detail)
}

/// Parses `item in collection` loop arguments.
fn parse_loop_args(tag: &str, args: &str) -> Result<(String, Expr), Error> {
    let (target, rest) = match args.split_once(|c: char| c.is_ascii_whitespace()) {
        Some(split) => split,
        None => {
            return Err(syntax_error(format!(
                "`{tag}` requires `item in collection`, got `{args}`"
            )))
        }
    };
    if !is_identifier(target) {
        return Err(syntax_error(format!(
            "`{tag}` loop variable must be an identifier, got `{target}`"
        )));
    }
    let rest = rest.trim_start();
    let iter_source = match rest.strip_prefix("in") {
        Some(iter) if iter.starts_with(|c: char| c.is_ascii_whitespace() || c == '(') => iter,
        _ => {
            return Err(syntax_error(format!(
                "`{tag}` requires `item in collection`, got `{args}`"
            )))
        }
    };
    Ok((target.to_string(), ok!(parse_expr(iter_source))))
}

/// Parses `name = expression` assignment arguments.
fn parse_set_args(tag: &str, args: &str) -> Result<(String, Expr), Error> {
    let (name, expr_source) = match args.split_once('=') {
        Some(split) => split,
        None => {
            return Err(syntax_error(format!(
                "`{tag}` requires `name = expression`, got `{args}`"
            )))
        }
    };
    let name = name.trim();
    if !is_identifier(name) {
        return Err(syntax_error(format!(
            "`{tag}` target must be an identifier, got `{name}`"
        )));
    }
    if expr_source.starts_with('=') {
        return Err(syntax_error(format!(
            "`{tag}` requires `name = expression`, got `{args}`"
        )));
    }
    Ok((name.to_string(), ok!(parse_expr(expr_source))))
}

/// Parses the quoted template name of an `extends` or `include` tag.
fn parse_template_name(tag: &str, args: &str) -> Result<String, Error> {
    let expr = ok!(parse_expr(args));
    match expr {
        Expr::Const(value) => match value.as_str() {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => Err(syntax_error(format!(
                "`{tag}` requires a quoted template name, got `{args}`"
            ))),
        },
        _ => Err(syntax_error(format!(
            "`{tag}` requires a quoted template name, got `{args}`"
        ))),
    }
}
