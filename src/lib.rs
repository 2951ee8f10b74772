//! <div align=center>
//!   <strong>tinyjinja: a tiny engine for a Jinja-flavored template dialect</strong>
//! </div>
//!
//! tinyjinja compiles and renders templates written in a restricted
//! Jinja2/Liquid dialect: output tags with filter pipelines, `if`/`for`
//! directives, `set` assignments, raw blocks, comments, `include`
//! partials and template inheritance through `extends` and `block`.
//! Inheritance and inclusion link at compile time, so a compiled
//! [`Template`] is self-contained.
//!
//! Rendering is forgiving by design: missing variables, attributes and
//! intermediate nulls resolve to empty output, expression operators follow
//! loose coercion rules and the only runtime error is a reference to an
//! unknown filter.  Outputs are HTML escaped unless a pipeline ends in
//! `safe`.
//!
//! # Example
//!
//! ```rust
//! use tinyjinja::{Environment, context};
//!
//! let mut env = Environment::new();
//! env.add_template("hello.html", "Hello {{ name }}!");
//! let template = env.get_template("hello.html").unwrap();
//! println!("{}", template.render(context! { name => "World" }).unwrap());
//! ```
//!
//! # Expressions
//!
//! Expressions support variable paths (`user.name`, `items[0]`,
//! `items[key]`), arithmetic, comparisons and boolean logic with both
//! keyword (`and`, `or`, `not`, `is`) and symbol (`&&`, `||`, `!`, `==`)
//! spellings.  Array and object literals must have literal contents;
//! filter arguments accept both `join: ', '` and `join(', ')` styles.
//!
//! # Learn more
//!
//! * [`Environment`]: the engine configuration
//! * [`Template`]: compiled templates
//! * [`value`]: the data model templates render
//! * [`filters`]: builtin filters and how to add your own
#![warn(missing_docs)]

#[macro_use]
mod macros;

mod compiler;
mod environment;
mod error;
mod loader;
mod template;
mod utils;
mod vm;

pub mod filters;
pub mod value;

pub use self::environment::Environment;
pub use self::error::{Error, ErrorKind};
pub use self::loader::path_loader;
pub use self::template::{RenderOptions, Template};
pub use self::value::Value;

#[doc(hidden)]
pub use self::macros::__context;
