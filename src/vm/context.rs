use crate::value::{Value, ValueMap};

/// The scope stack used while rendering.
///
/// The render context supplied by the caller sits below the stack as a
/// read-only base; every frame above it holds locals created by `set`,
/// loop bindings and block invocations.  Lookups walk the frames from the
/// innermost outwards and fall back to the base; names that resolve
/// nowhere yield null.
pub struct Context {
    base: Value,
    stack: Vec<ValueMap>,
}

impl Context {
    /// Creates a context over the given base value with one root frame for
    /// top-level assignments.
    pub fn new(base: Value) -> Context {
        Context {
            base,
            stack: vec![ValueMap::new()],
        }
    }

    /// Pushes a fresh scope frame.
    pub fn push_frame(&mut self) {
        self.stack.push(ValueMap::new());
    }

    /// Pops the innermost scope frame; the root frame stays.
    pub fn pop_frame(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Stores a value in the innermost frame.
    pub fn store(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.stack.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    /// Looks up a name, innermost frame first, then the base context.
    pub fn load(&self, name: &str) -> Value {
        for frame in self.stack.iter().rev() {
            if let Some(value) = frame.get(name) {
                return value.clone();
            }
        }
        self.base.get_attr(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::value::ValueMap;

    #[test]
    fn test_frames_shadow_and_unwind() {
        let mut base = ValueMap::new();
        base.insert("name".into(), Value::from("base"));
        let mut ctx = Context::new(Value::from(base));

        assert_eq!(ctx.load("name"), Value::from("base"));
        ctx.push_frame();
        ctx.store("name", Value::from("inner"));
        assert_eq!(ctx.load("name"), Value::from("inner"));
        ctx.pop_frame();
        assert_eq!(ctx.load("name"), Value::from("base"));
        assert_eq!(ctx.load("missing"), Value::NULL);
    }

    #[test]
    fn test_root_frame_survives_pop() {
        let mut ctx = Context::new(Value::NULL);
        ctx.store("x", Value::from(1));
        ctx.pop_frame();
        assert_eq!(ctx.load("x"), Value::from(1));
    }
}
