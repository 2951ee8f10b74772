//! Recursive descent parser for tag expressions.
//!
//! Expressions are parsed into an [`Expr`] tree at compile time; anything
//! the grammar does not admit (empty subscripts, stray `&`, numeric
//! attributes and the like) is rejected here with an
//! [`InvalidExpression`](ErrorKind::InvalidExpression) error rather than
//! surfacing at render time.

use std::fmt;

use crate::compiler::ast::{BinOp, Expr, FilterCall, Segment, UnaryOp, VarPath};
use crate::error::{Error, ErrorKind};
use crate::utils::unescape;
use crate::value::{Value, ValueKind, ValueMap};

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Ident(String),
    Lit(Value),
    Op(BinOp),
    Not,
    Is,
    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    BraceOpen,
    BraceClose,
    Dot,
    Comma,
    Colon,
}

impl fmt::Display for ExprToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprToken::Ident(name) => write!(f, "`{name}`"),
            ExprToken::Lit(_) => f.write_str("literal"),
            ExprToken::Op(op) => {
                let sym = match op {
                    BinOp::Eq => "==",
                    BinOp::Ne => "!=",
                    BinOp::Lt => "<",
                    BinOp::Lte => "<=",
                    BinOp::Gt => ">",
                    BinOp::Gte => ">=",
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::Rem => "%",
                    BinOp::And => "&&",
                    BinOp::Or => "||",
                };
                write!(f, "`{sym}`")
            }
            ExprToken::Not => f.write_str("`not`"),
            ExprToken::Is => f.write_str("`is`"),
            ExprToken::ParenOpen => f.write_str("`(`"),
            ExprToken::ParenClose => f.write_str("`)`"),
            ExprToken::BracketOpen => f.write_str("`[`"),
            ExprToken::BracketClose => f.write_str("`]`"),
            ExprToken::BraceOpen => f.write_str("`{`"),
            ExprToken::BraceClose => f.write_str("`}`"),
            ExprToken::Dot => f.write_str("`.`"),
            ExprToken::Comma => f.write_str("`,`"),
            ExprToken::Colon => f.write_str("`:`"),
        }
    }
}

fn syntax_error<D: Into<std::borrow::Cow<'static, str>>>(detail: D) -> Error {
    Error::new(ErrorKind::InvalidExpression, detail)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn lex(expr: &str) -> Result<Vec<ExprToken>, Error> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();
    while let Some(&(idx, c)) = chars.peek() {
        match c {
            c if c.is_ascii_whitespace() => {
                chars.next();
            }
            c if is_ident_start(c) => {
                let mut end = idx;
                while let Some(&(i, c)) = chars.peek() {
                    if is_ident_continue(c) {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match &expr[idx..end] {
                    "and" => ExprToken::Op(BinOp::And),
                    "or" => ExprToken::Op(BinOp::Or),
                    "not" => ExprToken::Not,
                    "is" => ExprToken::Is,
                    "isnot" => ExprToken::Op(BinOp::Ne),
                    "true" => ExprToken::Lit(Value::from(true)),
                    "false" => ExprToken::Lit(Value::from(false)),
                    "null" | "none" => ExprToken::Lit(Value::NULL),
                    ident => ExprToken::Ident(ident.to_string()),
                });
            }
            c if c.is_ascii_digit() => {
                let mut end = idx;
                let mut is_float = false;
                while let Some(&(i, c)) = chars.peek() {
                    // a point only belongs to the number if digits follow
                    let starts_fraction = c == '.'
                        && !is_float
                        && expr[i + 1..].starts_with(|c: char| c.is_ascii_digit());
                    if c.is_ascii_digit() || starts_fraction {
                        if c == '.' {
                            is_float = true;
                        }
                        end = i + 1;
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num = &expr[idx..end];
                let value = if is_float {
                    num.parse::<f64>().ok().map(Value::from)
                } else {
                    num.parse::<i64>().ok().map(Value::from)
                };
                match value {
                    Some(value) => tokens.push(ExprToken::Lit(value)),
                    None => return Err(syntax_error(format!("invalid number `{num}`"))),
                }
            }
            quote @ ('\'' | '"') => {
                chars.next();
                let start = idx + 1;
                let mut end = None;
                while let Some((i, c)) = chars.next() {
                    if c == '\\' {
                        chars.next();
                    } else if c == quote {
                        end = Some(i);
                        break;
                    }
                }
                match end {
                    Some(end) => {
                        let unescaped = ok!(unescape(&expr[start..end]));
                        tokens.push(ExprToken::Lit(Value::from(unescaped)));
                    }
                    None => return Err(syntax_error("unterminated string literal")),
                }
            }
            _ => {
                chars.next();
                let rest = &expr[idx + c.len_utf8()..];
                let mut eat = |n: usize| {
                    for _ in 0..n {
                        chars.next();
                    }
                };
                match c {
                    '(' => tokens.push(ExprToken::ParenOpen),
                    ')' => tokens.push(ExprToken::ParenClose),
                    '[' => tokens.push(ExprToken::BracketOpen),
                    ']' => tokens.push(ExprToken::BracketClose),
                    '{' => tokens.push(ExprToken::BraceOpen),
                    '}' => tokens.push(ExprToken::BraceClose),
                    '.' => tokens.push(ExprToken::Dot),
                    ',' => tokens.push(ExprToken::Comma),
                    ':' => tokens.push(ExprToken::Colon),
                    '+' => tokens.push(ExprToken::Op(BinOp::Add)),
                    '-' => tokens.push(ExprToken::Op(BinOp::Sub)),
                    '*' => tokens.push(ExprToken::Op(BinOp::Mul)),
                    '/' => tokens.push(ExprToken::Op(BinOp::Div)),
                    '%' => tokens.push(ExprToken::Op(BinOp::Rem)),
                    '&' if rest.starts_with('&') => {
                        eat(1);
                        tokens.push(ExprToken::Op(BinOp::And));
                    }
                    '|' if rest.starts_with('|') => {
                        eat(1);
                        tokens.push(ExprToken::Op(BinOp::Or));
                    }
                    '=' if rest.starts_with("==") => {
                        eat(2);
                        tokens.push(ExprToken::Op(BinOp::Eq));
                    }
                    '=' if rest.starts_with('=') => {
                        eat(1);
                        tokens.push(ExprToken::Op(BinOp::Eq));
                    }
                    '!' if rest.starts_with("==") => {
                        eat(2);
                        tokens.push(ExprToken::Op(BinOp::Ne));
                    }
                    '!' if rest.starts_with('=') => {
                        eat(1);
                        tokens.push(ExprToken::Op(BinOp::Ne));
                    }
                    '!' => tokens.push(ExprToken::Not),
                    '<' if rest.starts_with('=') => {
                        eat(1);
                        tokens.push(ExprToken::Op(BinOp::Lte));
                    }
                    '<' => tokens.push(ExprToken::Op(BinOp::Lt)),
                    '>' if rest.starts_with('=') => {
                        eat(1);
                        tokens.push(ExprToken::Op(BinOp::Gte));
                    }
                    '>' => tokens.push(ExprToken::Op(BinOp::Gt)),
                    _ => return Err(syntax_error(format!("unexpected `{c}` in expression"))),
                }
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<ExprToken>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<ExprToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &ExprToken) -> Result<(), Error> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(syntax_error(format!(
                "expected {expected}, found {token}"
            ))),
            None => Err(syntax_error(format!(
                "expected {expected}, found end of expression"
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut left = ok!(self.parse_and());
        while self.peek() == Some(&ExprToken::Op(BinOp::Or)) {
            self.next();
            let right = ok!(self.parse_and());
            left = Expr::Binary {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut left = ok!(self.parse_equality());
        while self.peek() == Some(&ExprToken::Op(BinOp::And)) {
            self.next();
            let right = ok!(self.parse_equality());
            left = Expr::Binary {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, Error> {
        let mut left = ok!(self.parse_comparison());
        loop {
            let op = match self.peek() {
                Some(ExprToken::Op(op @ (BinOp::Eq | BinOp::Ne))) => {
                    let op = *op;
                    self.next();
                    op
                }
                Some(ExprToken::Is) => {
                    self.next();
                    if self.peek() == Some(&ExprToken::Not) {
                        self.next();
                        BinOp::Ne
                    } else {
                        BinOp::Eq
                    }
                }
                _ => break,
            };
            let right = ok!(self.parse_comparison());
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Error> {
        let mut left = ok!(self.parse_additive());
        while let Some(ExprToken::Op(op @ (BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte))) =
            self.peek()
        {
            let op = *op;
            self.next();
            let right = ok!(self.parse_additive());
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, Error> {
        let mut left = ok!(self.parse_multiplicative());
        while let Some(ExprToken::Op(op @ (BinOp::Add | BinOp::Sub))) = self.peek() {
            let op = *op;
            self.next();
            let right = ok!(self.parse_multiplicative());
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Error> {
        let mut left = ok!(self.parse_unary());
        while let Some(ExprToken::Op(op @ (BinOp::Mul | BinOp::Div | BinOp::Rem))) = self.peek() {
            let op = *op;
            self.next();
            let right = ok!(self.parse_unary());
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        match self.peek() {
            Some(ExprToken::Not) => {
                self.next();
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(ok!(self.parse_unary())),
                })
            }
            Some(ExprToken::Op(BinOp::Sub)) => {
                self.next();
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(ok!(self.parse_unary())),
                })
            }
            // unary plus is part of the number grammar, not an operator
            Some(ExprToken::Op(BinOp::Add)) => {
                self.next();
                match self.next() {
                    Some(ExprToken::Lit(value)) if value.kind() == ValueKind::Number => {
                        Ok(Expr::Const(value))
                    }
                    Some(token) => Err(syntax_error(format!(
                        "expected number after `+`, found {token}"
                    ))),
                    None => Err(syntax_error("expected number after `+`")),
                }
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        match self.next() {
            Some(ExprToken::Lit(value)) => Ok(Expr::Const(value)),
            Some(ExprToken::Ident(name)) => {
                let path = ok!(self.parse_path());
                Ok(Expr::Var(VarPath { name, path }))
            }
            Some(ExprToken::ParenOpen) => {
                let expr = ok!(self.parse_or());
                ok!(self.expect(&ExprToken::ParenClose));
                Ok(expr)
            }
            Some(ExprToken::BracketOpen) => Ok(Expr::Const(ok!(self.parse_array_literal()))),
            Some(ExprToken::BraceOpen) => Ok(Expr::Const(ok!(self.parse_object_literal()))),
            Some(token) => Err(syntax_error(format!("unexpected {token} in expression"))),
            None => Err(syntax_error("unexpected end of expression")),
        }
    }

    /// Parses the access path after a variable root.  Attributes must be
    /// identifiers (`item.2` is rejected) and subscripts must be a single
    /// literal or identifier (`a.b[]` is rejected).
    fn parse_path(&mut self) -> Result<Vec<Segment>, Error> {
        let mut path = Vec::new();
        loop {
            match self.peek() {
                Some(ExprToken::Dot) => {
                    self.next();
                    match self.next() {
                        Some(ExprToken::Ident(name)) => path.push(Segment::Attr(name)),
                        Some(token) => {
                            return Err(syntax_error(format!(
                                "expected attribute name after `.`, found {token}"
                            )))
                        }
                        None => {
                            return Err(syntax_error("expected attribute name after `.`"))
                        }
                    }
                }
                Some(ExprToken::BracketOpen) => {
                    self.next();
                    let segment = match self.next() {
                        Some(ExprToken::Lit(value)) => Segment::Index(value),
                        Some(ExprToken::Ident(name)) => Segment::Lookup(name),
                        Some(token) => {
                            return Err(syntax_error(format!(
                                "expected literal or variable in subscript, found {token}"
                            )))
                        }
                        None => return Err(syntax_error("unterminated subscript")),
                    };
                    ok!(self.expect(&ExprToken::BracketClose));
                    path.push(segment);
                }
                _ => return Ok(path),
            }
        }
    }

    /// A literal in a position that does not admit variables: filter
    /// arguments and the contents of array and object literals.
    fn parse_literal(&mut self) -> Result<Value, Error> {
        match self.next() {
            Some(ExprToken::Lit(value)) => Ok(value),
            Some(ExprToken::Op(BinOp::Sub)) => match self.next() {
                Some(ExprToken::Lit(value)) => Ok(crate::value::ops::neg(&value)),
                Some(token) => Err(syntax_error(format!(
                    "expected number after `-`, found {token}"
                ))),
                None => Err(syntax_error("expected number after `-`")),
            },
            Some(ExprToken::Op(BinOp::Add)) => match self.next() {
                Some(ExprToken::Lit(value)) if value.kind() == ValueKind::Number => Ok(value),
                Some(token) => Err(syntax_error(format!(
                    "expected number after `+`, found {token}"
                ))),
                None => Err(syntax_error("expected number after `+`")),
            },
            Some(ExprToken::BracketOpen) => self.parse_array_literal(),
            Some(ExprToken::BraceOpen) => self.parse_object_literal(),
            Some(token) => Err(syntax_error(format!("expected literal, found {token}"))),
            None => Err(syntax_error("expected literal, found end of expression")),
        }
    }

    fn parse_array_literal(&mut self) -> Result<Value, Error> {
        let mut elements = Vec::new();
        if self.peek() == Some(&ExprToken::BracketClose) {
            self.next();
            return Ok(Value::from(elements));
        }
        loop {
            elements.push(ok!(self.parse_literal()));
            match self.next() {
                Some(ExprToken::Comma) => continue,
                Some(ExprToken::BracketClose) => return Ok(Value::from(elements)),
                Some(token) => {
                    return Err(syntax_error(format!(
                        "expected `,` or `]` in array literal, found {token}"
                    )))
                }
                None => return Err(syntax_error("unterminated array literal")),
            }
        }
    }

    fn parse_object_literal(&mut self) -> Result<Value, Error> {
        let mut map = ValueMap::new();
        if self.peek() == Some(&ExprToken::BraceClose) {
            self.next();
            return Ok(Value::from(map));
        }
        loop {
            let key = match self.next() {
                Some(ExprToken::Ident(name)) => name,
                Some(ExprToken::Lit(value)) => value.as_key_string(),
                Some(token) => {
                    return Err(syntax_error(format!(
                        "expected key in object literal, found {token}"
                    )))
                }
                None => return Err(syntax_error("unterminated object literal")),
            };
            ok!(self.expect(&ExprToken::Colon));
            map.insert(key, ok!(self.parse_literal()));
            match self.next() {
                Some(ExprToken::Comma) => continue,
                Some(ExprToken::BraceClose) => return Ok(Value::from(map)),
                Some(token) => {
                    return Err(syntax_error(format!(
                        "expected `,` or `}}` in object literal, found {token}"
                    )))
                }
                None => return Err(syntax_error("unterminated object literal")),
            }
        }
    }

    fn finish(&mut self) -> Result<(), Error> {
        match self.next() {
            None => Ok(()),
            Some(token) => Err(syntax_error(format!(
                "unexpected {token} after expression"
            ))),
        }
    }
}

/// Parses a complete expression.
pub fn parse_expr(expr: &str) -> Result<Expr, Error> {
    let tokens = ok!(lex(expr));
    if tokens.is_empty() {
        return Err(syntax_error("empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let rv = ok!(parser.parse_or());
    ok!(parser.finish());
    Ok(rv)
}

/// Parses a single filter segment of an output pipeline.
///
/// Both argument styles are accepted: `join: ', '` and `join(', ')`.
/// Arguments must be literals.
pub fn parse_filter(segment: &str) -> Result<FilterCall, Error> {
    let segment = segment.trim();
    let name_end = segment
        .char_indices()
        .find(|&(_, c)| !is_ident_continue(c))
        .map(|(i, _)| i)
        .unwrap_or(segment.len());
    let name = &segment[..name_end];
    if name.is_empty() || !name.starts_with(is_ident_start) {
        return Err(syntax_error(format!("invalid filter name in `{segment}`")));
    }
    let rest = segment[name_end..].trim();
    let arg_source = if rest.is_empty() {
        None
    } else if let Some(args) = rest.strip_prefix(':') {
        Some(args)
    } else if rest.starts_with('(') && rest.ends_with(')') {
        Some(&rest[1..rest.len() - 1])
    } else {
        return Err(syntax_error(format!("malformed filter arguments in `{segment}`")));
    };

    let mut args = Vec::new();
    if let Some(arg_source) = arg_source {
        let tokens = ok!(lex(arg_source));
        if !tokens.is_empty() {
            let mut parser = Parser { tokens, pos: 0 };
            loop {
                args.push(ok!(parser.parse_literal()));
                match parser.next() {
                    Some(ExprToken::Comma) => continue,
                    None => break,
                    Some(token) => {
                        return Err(syntax_error(format!(
                            "expected `,` between filter arguments, found {token}"
                        )))
                    }
                }
            }
        }
    }

    Ok(FilterCall {
        name: name.to_string(),
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn var(name: &str, path: Vec<Segment>) -> Expr {
        Expr::Var(VarPath {
            name: name.into(),
            path,
        })
    }

    #[test]
    fn test_paths() {
        assert_eq!(parse_expr("user").unwrap(), var("user", vec![]));
        assert_eq!(
            parse_expr("user.name").unwrap(),
            var("user", vec![Segment::Attr("name".into())])
        );
        assert_eq!(
            parse_expr("items[0]").unwrap(),
            var("items", vec![Segment::Index(Value::from(0))])
        );
        assert_eq!(
            parse_expr("items[key]").unwrap(),
            var("items", vec![Segment::Lookup("key".into())])
        );
        assert_eq!(
            parse_expr("a.b['c']").unwrap(),
            var(
                "a",
                vec![
                    Segment::Attr("b".into()),
                    Segment::Index(Value::from("c"))
                ]
            )
        );
    }

    #[test]
    fn test_rejected_expressions() {
        assert!(parse_expr("a.b[]").is_err());
        assert!(parse_expr("a.b & a.c").is_err());
        assert!(parse_expr("item.2").is_err());
        assert!(parse_expr("").is_err());
        assert!(parse_expr("a +").is_err());
        assert!(parse_expr("(a").is_err());
        assert!(parse_expr("a b").is_err());
        // a point must be followed by digits
        assert!(parse_expr("1.").is_err());
        assert!(parse_expr("1. + 2").is_err());
        // unary plus applies to numbers only
        assert!(parse_expr("+'a'").is_err());
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse_expr("1 + 2 * 3").unwrap(),
            Expr::Binary {
                op: BinOp::Add,
                left: Box::new(Expr::Const(Value::from(1))),
                right: Box::new(Expr::Binary {
                    op: BinOp::Mul,
                    left: Box::new(Expr::Const(Value::from(2))),
                    right: Box::new(Expr::Const(Value::from(3))),
                }),
            }
        );
    }

    #[test]
    fn test_keywords_and_symbols_agree() {
        assert_eq!(
            parse_expr("a and b").unwrap(),
            parse_expr("a && b").unwrap()
        );
        assert_eq!(parse_expr("a or b").unwrap(), parse_expr("a || b").unwrap());
        assert_eq!(parse_expr("a is b").unwrap(), parse_expr("a == b").unwrap());
        assert_eq!(
            parse_expr("a is not b").unwrap(),
            parse_expr("a != b").unwrap()
        );
        assert_eq!(
            parse_expr("a isnot b").unwrap(),
            parse_expr("a != b").unwrap()
        );
        assert_eq!(
            parse_expr("a === b").unwrap(),
            parse_expr("a == b").unwrap()
        );
        assert_eq!(parse_expr("not a").unwrap(), parse_expr("!a").unwrap());
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_expr("true").unwrap(), Expr::Const(Value::from(true)));
        assert_eq!(parse_expr("null").unwrap(), Expr::Const(Value::NULL));
        assert_eq!(parse_expr("1.5").unwrap(), Expr::Const(Value::from(1.5)));
        assert_eq!(parse_expr("+5").unwrap(), Expr::Const(Value::from(5)));
        assert_eq!(parse_expr("+1.5").unwrap(), Expr::Const(Value::from(1.5)));
        assert_eq!(
            parse_expr("'a\\nb'").unwrap(),
            Expr::Const(Value::from("a\nb"))
        );
        assert_eq!(
            parse_expr("[1, 'two', [3]]").unwrap(),
            Expr::Const(Value::from(vec![
                Value::from(1),
                Value::from("two"),
                Value::from(vec![Value::from(3)]),
            ]))
        );
        let parsed = parse_expr("{a: 1, 'b': 2}").unwrap();
        let mut map = ValueMap::new();
        map.insert("a".into(), Value::from(1));
        map.insert("b".into(), Value::from(2));
        assert_eq!(parsed, Expr::Const(Value::from(map)));
    }

    #[test]
    fn test_object_literals_take_literals_only() {
        assert!(parse_expr("{a: b}").is_err());
        assert!(parse_expr("[a]").is_err());
    }

    #[test]
    fn test_filters() {
        assert_eq!(
            parse_filter("upper").unwrap(),
            FilterCall {
                name: "upper".into(),
                args: vec![],
            }
        );
        assert_eq!(
            parse_filter("join: ', '").unwrap(),
            FilterCall {
                name: "join".into(),
                args: vec![Value::from(", ")],
            }
        );
        assert_eq!(
            parse_filter("slice(1, -2)").unwrap(),
            FilterCall {
                name: "slice".into(),
                args: vec![Value::from(1), Value::from(-2)],
            }
        );
        assert!(parse_filter("1bad").is_err());
        assert!(parse_filter("join: a").is_err());
        assert!(parse_filter("join(', '").is_err());
    }
}
