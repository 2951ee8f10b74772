use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;

use serde::ser::{self, Serialize, Serializer};

use crate::value::{Value, ValueMap, ValueRepr};

/// Newtype struct name used to smuggle values through serde unchanged.
///
/// When a [`Value`] is serialized while [`to_value`] runs, it stashes
/// itself in a thread local and emits a newtype struct with this marker
/// name instead of its data.  [`ValueSerializer`] picks the stash back up,
/// so values (dynamic objects in particular) survive the round trip with
/// their identity intact instead of being flattened into plain maps.
const VALUE_HANDLE: &str = "$__tinyjinja::value";

thread_local! {
    static INTERNAL_SERIALIZATION: Cell<bool> = const { Cell::new(false) };
    static STASHED_VALUE: RefCell<Option<Value>> = const { RefCell::new(None) };
}

fn in_internal_serialization() -> bool {
    INTERNAL_SERIALIZATION.with(Cell::get)
}

/// Converts a serializable value into a [`Value`].
///
/// Serialization failures degrade to null; absent data is indistinguishable
/// from unrepresentable data inside a template anyway.
pub fn to_value<T: Serialize>(value: &T) -> Value {
    INTERNAL_SERIALIZATION.with(|flag| {
        let outer = flag.replace(true);
        let rv = value.serialize(ValueSerializer);
        flag.set(outer);
        rv.unwrap_or(Value::NULL)
    })
}

/// Error type used while value serialization runs.
#[derive(Debug)]
pub struct InvalidValue(String);

impl fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvalidValue {}

impl ser::Error for InvalidValue {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        InvalidValue(msg.to_string())
    }
}

struct ValueSerializer;

impl Serializer for ValueSerializer {
    type Ok = Value;
    type Error = InvalidValue;

    type SerializeSeq = SerializeSeq;
    type SerializeTuple = SerializeSeq;
    type SerializeTupleStruct = SerializeSeq;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeStruct;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, InvalidValue> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<Value, InvalidValue> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<Value, InvalidValue> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::I64(v)))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, InvalidValue> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u16(self, v: u16) -> Result<Value, InvalidValue> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u32(self, v: u32) -> Result<Value, InvalidValue> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u64(self, v: u64) -> Result<Value, InvalidValue> {
        if v <= i64::MAX as u64 {
            self.serialize_i64(v as i64)
        } else {
            self.serialize_f64(v as f64)
        }
    }

    fn serialize_f32(self, v: f32) -> Result<Value, InvalidValue> {
        self.serialize_f64(v as f64)
    }

    fn serialize_f64(self, v: f64) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::F64(v)))
    }

    fn serialize_char(self, v: char) -> Result<Value, InvalidValue> {
        Ok(Value::from(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, InvalidValue> {
        Ok(Value::from(v))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, InvalidValue> {
        Ok(Value::from(String::from_utf8_lossy(v).into_owned()))
    }

    fn serialize_none(self) -> Result<Value, InvalidValue> {
        Ok(Value::NULL)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, InvalidValue> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, InvalidValue> {
        Ok(Value::NULL)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, InvalidValue> {
        Ok(Value::NULL)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, InvalidValue> {
        Ok(Value::from(variant))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Value, InvalidValue> {
        if name == VALUE_HANDLE {
            if let Some(stashed) = STASHED_VALUE.with(|slot| slot.borrow_mut().take()) {
                return Ok(stashed);
            }
        }
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, InvalidValue> {
        let mut map = ValueMap::new();
        map.insert(variant.to_string(), ok!(value.serialize(ValueSerializer)));
        Ok(Value::from(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeSeq, InvalidValue> {
        Ok(SerializeSeq {
            elements: Vec::with_capacity(len.unwrap_or(0).min(1024)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeSeq, InvalidValue> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SerializeSeq, InvalidValue> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SerializeTupleVariant, InvalidValue> {
        Ok(SerializeTupleVariant {
            variant,
            elements: Vec::with_capacity(len.min(1024)),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<SerializeMap, InvalidValue> {
        Ok(SerializeMap {
            entries: ValueMap::new(),
            key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<SerializeStruct, InvalidValue> {
        Ok(SerializeStruct {
            fields: ValueMap::new(),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<SerializeStructVariant, InvalidValue> {
        Ok(SerializeStructVariant {
            variant,
            fields: ValueMap::new(),
        })
    }
}

pub struct SerializeSeq {
    elements: Vec<Value>,
}

impl ser::SerializeSeq for SerializeSeq {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), InvalidValue> {
        self.elements.push(ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::Seq(Arc::new(self.elements))))
    }
}

impl ser::SerializeTuple for SerializeSeq {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), InvalidValue> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, InvalidValue> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeSeq {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), InvalidValue> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, InvalidValue> {
        ser::SerializeSeq::end(self)
    }
}

pub struct SerializeTupleVariant {
    variant: &'static str,
    elements: Vec<Value>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), InvalidValue> {
        self.elements.push(ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, InvalidValue> {
        let mut map = ValueMap::new();
        map.insert(self.variant.to_string(), Value::from(self.elements));
        Ok(Value::from(map))
    }
}

pub struct SerializeMap {
    entries: ValueMap,
    key: Option<String>,
}

impl ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), InvalidValue> {
        let key = ok!(key.serialize(ValueSerializer));
        self.key = Some(key.as_key_string());
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), InvalidValue> {
        let key = self.key.take().unwrap_or_default();
        self.entries.insert(key, ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, InvalidValue> {
        Ok(Value::from(self.entries))
    }
}

pub struct SerializeStruct {
    fields: ValueMap,
}

impl ser::SerializeStruct for SerializeStruct {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), InvalidValue> {
        self.fields
            .insert(key.to_string(), ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, InvalidValue> {
        Ok(Value::from(self.fields))
    }
}

pub struct SerializeStructVariant {
    variant: &'static str,
    fields: ValueMap,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), InvalidValue> {
        self.fields
            .insert(key.to_string(), ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, InvalidValue> {
        let mut map = ValueMap::new();
        map.insert(self.variant.to_string(), Value::from(self.fields));
        Ok(Value::from(map))
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if in_internal_serialization() {
            STASHED_VALUE.with(|slot| *slot.borrow_mut() = Some(self.clone()));
            return serializer.serialize_newtype_struct(VALUE_HANDLE, &());
        }
        match self.0 {
            ValueRepr::Null => serializer.serialize_unit(),
            ValueRepr::Bool(val) => serializer.serialize_bool(val),
            ValueRepr::I64(val) => serializer.serialize_i64(val),
            ValueRepr::F64(val) => serializer.serialize_f64(val),
            ValueRepr::String(ref val) => serializer.serialize_str(val),
            ValueRepr::Seq(ref values) => values.serialize(serializer),
            ValueRepr::Map(ref map) => {
                use serde::ser::SerializeMap;
                let mut s = ok!(serializer.serialize_map(Some(map.len())));
                for (key, value) in map.iter() {
                    ok!(s.serialize_entry(key, value));
                }
                s.end()
            }
            ValueRepr::Dynamic(ref obj) => {
                use serde::ser::SerializeMap;
                let fields = obj.fields();
                let mut s = ok!(serializer.serialize_map(Some(fields.len())));
                for field in fields {
                    let value = obj.get_attr(&field).unwrap_or(Value::NULL);
                    ok!(s.serialize_entry(&field, &value));
                }
                s.end()
            }
        }
    }
}
