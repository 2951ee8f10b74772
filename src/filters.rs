//! Filter functions and abstractions.
//!
//! Filters transform the value piped into them; they never fail.  A
//! pipeline naming a filter the environment does not know raises an
//! [`UnknownFilter`](crate::ErrorKind::UnknownFilter) error at render time
//! instead.
//!
//! # Custom Filters
//!
//! A filter is any `Fn(&Value, &[Value]) -> Value` that is `Send` and
//! `Sync`.  The first argument is the piped value, the slice holds the
//! literal arguments written after the filter name:
//!
//! ```rust
//! # use tinyjinja::{Environment, Value};
//! let mut env = Environment::new();
//! env.add_filter("upper", |value: &Value, _args: &[Value]| {
//!     Value::from(value.to_string().to_uppercase())
//! });
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::utils::HtmlEscape;
use crate::value::Value;

type FilterFn = dyn Fn(&Value, &[Value]) -> Value + Sync + Send;

/// A boxed filter stored in the environment.
#[derive(Clone)]
pub struct BoxedFilter(Arc<FilterFn>);

impl fmt::Debug for BoxedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("filter")
    }
}

impl BoxedFilter {
    pub(crate) fn new<F>(f: F) -> BoxedFilter
    where
        F: Fn(&Value, &[Value]) -> Value + Sync + Send + 'static,
    {
        BoxedFilter(Arc::new(f))
    }

    /// Applies the filter to a value.
    pub fn apply(&self, value: &Value, args: &[Value]) -> Value {
        (self.0)(value, args)
    }
}

/// HTML escapes the string form of a value.
///
/// This is the default auto-escape filter; it escapes `&`, `<`, `>` and
/// `"`.
pub fn html(value: &Value, _args: &[Value]) -> Value {
    Value::from(HtmlEscape(&value.to_string()).to_string())
}

/// Marks a value as safe by passing it through unchanged.
///
/// Ending a pipeline in `safe` suppresses the automatic escape for that
/// output.
pub fn safe(value: &Value, _args: &[Value]) -> Value {
    value.clone()
}

pub(crate) fn builtins() -> BTreeMap<String, BoxedFilter> {
    let mut rv = BTreeMap::new();
    rv.insert("html".to_string(), BoxedFilter::new(html));
    rv.insert("safe".to_string(), BoxedFilter::new(safe));
    rv
}
