use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::compiler::codegen::CodeGenerator;
use crate::error::Error;
use crate::filters::{self, BoxedFilter};
use crate::template::Template;
use crate::value::Value;

type LoadFunc = dyn Fn(&str) -> Result<Option<String>, Error> + Send + Sync;

/// An abstraction that holds the engine configuration.
///
/// The environment owns the template sources, the filter registry, the
/// auto-escape setting and the optional loader.  Templates compile against
/// the environment they came from, so an `extends` chain resolves through
/// the same sources and loader.
///
/// There are generally two ways to construct this object:
///
/// * [`Environment::new`] creates an environment with the default filters
///   (`html` and `safe`) and HTML auto-escaping.
/// * [`Environment::empty`] creates one without any filters, for callers
///   that want full control over the registry.
///
/// # Example
///
/// ```rust
/// use tinyjinja::{Environment, context};
///
/// let mut env = Environment::new();
/// env.add_template("hello.txt", "Hello {{ name }}!");
/// let template = env.get_template("hello.txt").unwrap();
/// assert_eq!(template.render(context! { name => "World" }).unwrap(), "Hello World!");
/// ```
#[derive(Clone)]
pub struct Environment {
    templates: BTreeMap<String, String>,
    filters: BTreeMap<String, BoxedFilter>,
    auto_escape: Option<String>,
    loader: Option<Arc<LoadFunc>>,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("templates", &self.templates.keys())
            .field("filters", &self.filters.keys())
            .field("auto_escape", &self.auto_escape)
            .finish()
    }
}

impl Environment {
    /// Creates a new environment with the default filters and HTML
    /// auto-escaping.
    pub fn new() -> Environment {
        Environment {
            templates: BTreeMap::new(),
            filters: filters::builtins(),
            auto_escape: Some("html".to_string()),
            loader: None,
        }
    }

    /// Creates an environment without any filters or auto-escaping.
    pub fn empty() -> Environment {
        Environment {
            templates: BTreeMap::new(),
            filters: BTreeMap::new(),
            auto_escape: None,
            loader: None,
        }
    }

    /// Registers a template under a name.
    ///
    /// The source is compiled lazily when the template is first fetched or
    /// referenced by an `extends` tag, so ancestors can be registered in
    /// any order.
    pub fn add_template(&mut self, name: &str, source: &str) {
        self.templates.insert(name.to_string(), source.to_string());
    }

    /// Removes a registered template.
    pub fn remove_template(&mut self, name: &str) {
        self.templates.remove(name);
    }

    /// Registers a loader consulted for template names that were not
    /// registered directly.
    ///
    /// The loader returns `Ok(None)` when it has no source under the name,
    /// which surfaces as a
    /// [`TemplateNotFound`](crate::ErrorKind::TemplateNotFound) error.  See
    /// [`path_loader`](crate::path_loader) for a loader serving a
    /// directory.
    pub fn set_loader<F>(&mut self, f: F)
    where
        F: Fn(&str) -> Result<Option<String>, Error> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(f));
    }

    /// Sets the name of the filter applied to outputs that do not opt out,
    /// or `None` to disable automatic escaping.
    ///
    /// Defaults to `"html"`.  A pipeline ending in `safe` or in the
    /// configured filter itself is left alone.
    pub fn set_auto_escape(&mut self, filter: Option<&str>) {
        self.auto_escape = filter.map(String::from);
    }

    pub(crate) fn auto_escape(&self) -> Option<&str> {
        self.auto_escape.as_deref()
    }

    /// Adds a new filter function.
    pub fn add_filter<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Value, &[Value]) -> Value + Sync + Send + 'static,
    {
        self.filters.insert(name.to_string(), BoxedFilter::new(f));
    }

    /// Removes a filter by name.
    pub fn remove_filter(&mut self, name: &str) {
        self.filters.remove(name);
    }

    pub(crate) fn get_filter(&self, name: &str) -> Option<&BoxedFilter> {
        self.filters.get(name)
    }

    /// Fetches and compiles a template by name.
    pub fn get_template(&self, name: &str) -> Result<Template<'_>, Error> {
        let source = ok!(self.resolve_source(name));
        self.compile(name, &source)
    }

    /// Compiles a template from a string without registering it.
    ///
    /// `extends` tags inside it still resolve through the environment.
    pub fn template_from_str(&self, source: &str) -> Result<Template<'_>, Error> {
        self.compile("<string>", source)
    }

    /// Compiles and renders a template from a string in one go.
    pub fn render_str<S: Serialize>(&self, source: &str, ctx: S) -> Result<String, Error> {
        ok!(self.template_from_str(source)).render(ctx)
    }

    fn compile(&self, name: &str, source: &str) -> Result<Template<'_>, Error> {
        let resolve = |name: &str| self.resolve_source(name);
        let program = ok!(CodeGenerator::new(&resolve).compile(name, source));
        Ok(Template::new(self, name.to_string(), program))
    }

    pub(crate) fn resolve_source(&self, name: &str) -> Result<String, Error> {
        if let Some(source) = self.templates.get(name) {
            return Ok(source.clone());
        }
        if let Some(ref loader) = self.loader {
            if let Some(source) = ok!(loader(name)) {
                return Ok(source);
            }
        }
        Err(Error::new_not_found(name))
    }
}
