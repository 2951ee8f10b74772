use std::borrow::Cow;
use std::fmt;

/// Represents template errors.
///
/// Compilation errors carry the name of the template they were raised in
/// (when the template came from a loader) and a line number.  Errors raised
/// while resolving an ancestor or included template propagate unchanged, so
/// a broken ancestor fails every template that extends it.
///
/// # Example
///
/// ```rust
/// # let env = tinyjinja::Environment::new();
/// match env.render_str("{{ user.name }}", ()) {
///     Ok(result) => println!("{}", result),
///     Err(err) => eprintln!("could not render: {}", err),
/// }
/// ```
pub struct Error {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    name: Option<String>,
    lineno: usize,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("detail", &self.detail)
            .field("name", &self.name)
            .field("lineno", &self.lineno)
            .field("source", &self.source)
            .finish()
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for Error {}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A tag could not be parsed: unknown directive, unbalanced nesting,
    /// misplaced `else`/`endif`, unterminated tag and similar.
    SyntaxError,
    /// An expression was rejected by the expression grammar.
    InvalidExpression,
    /// The loader had no template under the requested name.
    TemplateNotFound,
    /// An `extends`/`include` chain referenced a template already being
    /// resolved.
    CircularReference,
    /// A filter pipeline referenced a name missing from the registry.
    UnknownFilter,
    /// A string literal contained an invalid backslash escape.
    BadEscape,
    /// The operation is not supported (for instance a failing loader).
    InvalidOperation,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::InvalidExpression => "invalid expression",
            ErrorKind::TemplateNotFound => "template not found",
            ErrorKind::CircularReference => "circular template reference",
            ErrorKind::UnknownFilter => "unknown filter",
            ErrorKind::BadEscape => "bad string escape",
            ErrorKind::InvalidOperation => "invalid operation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref detail) = self.detail {
            write!(f, "{}: {}", self.kind, detail)?;
        } else {
            write!(f, "{}", self.kind)?;
        }
        if let Some(ref name) = self.name {
            if self.lineno > 0 {
                write!(f, " (in {}:{})", name, self.lineno)?;
            } else {
                write!(f, " (in {})", name)?;
            }
        }
        Ok(())
    }
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        Error {
            kind,
            detail: Some(detail.into()),
            name: None,
            lineno: 0,
            source: None,
        }
    }

    pub(crate) fn new_not_found(name: &str) -> Error {
        Error::new(
            ErrorKind::TemplateNotFound,
            format!("template {name:?} does not exist"),
        )
    }

    pub(crate) fn set_location_if_unset(&mut self, name: &str, lineno: usize) {
        if self.name.is_none() {
            self.name = Some(name.into());
            self.lineno = lineno;
        }
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the detail message if one was set.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the name of the template the error was raised in.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the line the error was raised on.
    pub fn line(&self) -> Option<usize> {
        self.name.as_ref().map(|_| self.lineno)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            detail: None,
            name: None,
            lineno: 0,
            source: None,
        }
    }
}
