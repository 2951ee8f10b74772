use std::fmt;
use std::sync::Mutex;

use crate::value::{Value, ValueMap};

/// A trait for dynamic objects exposed to templates.
///
/// Dynamic objects participate in attribute lookup (`user.name`,
/// `user["name"]`) and in `for` loops, which iterate their [`fields`]
/// (`Object::fields`) like mapping keys.
pub trait Object: fmt::Debug + Send + Sync {
    /// Looks up an attribute on the object.
    ///
    /// Returning `None` makes the lookup resolve to null.
    fn get_attr(&self, name: &str) -> Option<Value>;

    /// Returns the field names a loop over this object yields.
    fn fields(&self) -> Vec<String> {
        Vec::new()
    }
}

/// The capability for values that compute missing properties on demand.
///
/// When [`LazyObject`] cannot find a property among its concrete fields it
/// asks the provider once and caches whatever comes back (including null),
/// so the provider is never invoked twice for the same name.
pub trait LazyPropertyProvider: fmt::Debug + Send + Sync {
    /// Produces the value for a property that has no concrete field.
    fn resolve(&self, name: &str) -> Value;
}

/// An [`Object`] with concrete fields backed by a [`LazyPropertyProvider`].
#[derive(Debug)]
pub struct LazyObject<P> {
    fields: Mutex<ValueMap>,
    provider: P,
}

impl<P: LazyPropertyProvider> LazyObject<P> {
    /// Creates a lazy object without concrete fields.
    pub fn new(provider: P) -> LazyObject<P> {
        LazyObject::with_fields(ValueMap::new(), provider)
    }

    /// Creates a lazy object with concrete fields checked before the provider.
    pub fn with_fields(fields: ValueMap, provider: P) -> LazyObject<P> {
        LazyObject {
            fields: Mutex::new(fields),
            provider,
        }
    }
}

impl<P: LazyPropertyProvider> Object for LazyObject<P> {
    fn get_attr(&self, name: &str) -> Option<Value> {
        let mut fields = self.fields.lock().unwrap();
        if let Some(value) = fields.get(name) {
            return Some(value.clone());
        }
        let value = self.provider.resolve(name);
        fields.insert(name.to_string(), value.clone());
        Some(value)
    }

    fn fields(&self) -> Vec<String> {
        // only concrete (or already resolved) fields enumerate
        self.fields.lock().unwrap().keys().cloned().collect()
    }
}
