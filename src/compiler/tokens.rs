use std::fmt;

/// Represents a token produced by the template tokenizer.
///
/// Unlike a per-character token stream, a whole tag is one token: its
/// contents are parsed afterwards by the expression parser or the directive
/// dispatcher.  Tokens come out in source order together with the line they
/// start on.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Raw template text, emitted verbatim (minus trimmed whitespace).
    Text(String),
    /// An output tag: the leading expression plus the filter pipeline
    /// segments split on `|`.  The unescaped triple-brace form arrives here
    /// rewritten with a trailing `safe` filter.
    Output {
        expr: String,
        filters: Vec<String>,
    },
    /// A `{% ... %}` directive with its keyword and argument string.
    Directive {
        name: String,
        args: String,
    },
    /// A `{# ... #}` comment; carried so the dispatcher can ignore it while
    /// still treating it as "nothing seen yet" for `extends` placement.
    Comment,
    /// The verbatim contents of a `{% raw %} ... {% endraw %}` region.
    Raw(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Text(_) => f.write_str("template text"),
            Token::Output { .. } => f.write_str("output tag"),
            Token::Directive { name, .. } => write!(f, "`{name}` tag"),
            Token::Comment => f.write_str("comment"),
            Token::Raw(_) => f.write_str("raw block"),
        }
    }
}
