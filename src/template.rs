use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::compiler::instructions::Program;
use crate::environment::Environment;
use crate::error::Error;
use crate::filters::BoxedFilter;
use crate::value::Value;
use crate::vm::Vm;

/// Per-render overrides for [`Template::render_with`].
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Name of the filter applied to outputs that do not opt out; `None`
    /// disables automatic escaping for this render only.
    pub auto_escape: Option<String>,
    filters: BTreeMap<String, BoxedFilter>,
}

impl Default for RenderOptions {
    fn default() -> RenderOptions {
        RenderOptions {
            auto_escape: Some("html".to_string()),
            filters: BTreeMap::new(),
        }
    }
}

impl RenderOptions {
    /// Registers a filter for this render only.
    ///
    /// Filters added here take precedence over the environment's filters
    /// of the same name.
    pub fn add_filter<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Value, &[Value]) -> Value + Sync + Send + 'static,
    {
        self.filters.insert(name.to_string(), BoxedFilter::new(f));
    }
}

/// A compiled and linked template, ready to render.
///
/// Templates are compiled by the [`Environment`]; inheritance is already
/// resolved, so rendering never touches the loader.  A template borrows
/// its environment for the filter registry.
pub struct Template<'env> {
    env: &'env Environment,
    name: String,
    program: Program,
}

impl fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("ancestors", &self.program.ancestors)
            .finish()
    }
}

impl<'env> Template<'env> {
    pub(crate) fn new(env: &'env Environment, name: String, program: Program) -> Template<'env> {
        Template { env, name, program }
    }

    /// Returns the name of the template.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the names of the templates this one extends, nearest first.
    pub fn ancestors(&self) -> &[String] {
        &self.program.ancestors
    }

    /// Renders the template with the given context.
    ///
    /// The context can be any serializable value; missing variables render
    /// as empty rather than failing.
    ///
    /// ```rust
    /// # use tinyjinja::{Environment, context};
    /// let env = Environment::new();
    /// let template = env.template_from_str("Hello {{ name }}!").unwrap();
    /// assert_eq!(template.render(context! { name => "John" }).unwrap(), "Hello John!");
    /// ```
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, Error> {
        self.render_value(Vm::new(self.env), ctx, self.env.auto_escape())
    }

    /// Renders the template with per-render options.
    pub fn render_with<S: Serialize>(
        &self,
        ctx: S,
        options: &RenderOptions,
    ) -> Result<String, Error> {
        self.render_value(
            Vm::with_filters(self.env, &options.filters),
            ctx,
            options.auto_escape.as_deref(),
        )
    }

    fn render_value<S: Serialize>(
        &self,
        vm: Vm<'_>,
        ctx: S,
        auto_escape: Option<&str>,
    ) -> Result<String, Error> {
        vm.render(&self.program, Value::from_serialize(&ctx), auto_escape)
            .map_err(|mut err| {
                err.set_location_if_unset(&self.name, 0);
                err
            })
    }
}
