//! Encode engine: a serde `Serializer` that turns any `Serialize` value into
//! its primitive [`Value`] form.
//!
//! Dispatch follows the runtime shape serde reports:
//! - scalars map to themselves, `None` and `()` to null;
//! - structs (records) become mappings in field order;
//! - sequences, tuples and sets become lists;
//! - maps become mappings when every key has a text form, otherwise lists
//!   of `[key, value]` pairs;
//! - unit enum variants become their name;
//! - newtype wrappers are transparent.
//!
//! Named containers (structs, newtypes, enums) first check the
//! [`Context`]'s encoder registry by serde name. Data-carrying enum variants
//! have no default representation and require a registered encoder.

use serde::ser::{self, Serialize};

use crate::context::Context;
use crate::error::EncodeError;
use crate::value::{Map, Value};

impl Context {
    /// Encodes `value` into primitive form.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Value, EncodeError> {
        value.serialize(ValueSerializer { ctx: self })
    }
}

#[derive(Clone, Copy)]
struct ValueSerializer<'a> {
    ctx: &'a Context,
}

impl ValueSerializer<'_> {
    /// Applies a registered encoder for `name`, if any.
    fn custom(self, name: &str, value: Value) -> Result<Value, EncodeError> {
        match self.ctx.registered_encoder(name) {
            Some(encoder) => encoder(value),
            None => Ok(value),
        }
    }

    /// Data-carrying variants: a registered encoder is mandatory.
    fn required(self, name: &str, variant: &str, payload: Value) -> Result<Value, EncodeError> {
        let mut tagged = Map::with_capacity(1);
        tagged.insert(variant.to_string(), payload);
        let tagged = Value::Map(tagged);
        match self.ctx.registered_encoder(name) {
            Some(encoder) => encoder(tagged),
            None => Err(EncodeError::Unregistered {
                type_name: format!("{name}::{variant}"),
                value: tagged.to_string(),
            }),
        }
    }
}

impl<'a> ser::Serializer for ValueSerializer<'a> {
    type Ok = Value;
    type Error = EncodeError;
    type SerializeSeq = SeqSerializer<'a>;
    type SerializeTuple = SeqSerializer<'a>;
    type SerializeTupleStruct = SeqSerializer<'a>;
    type SerializeTupleVariant = SeqSerializer<'a>;
    type SerializeMap = MapSerializer<'a>;
    type SerializeStruct = StructSerializer<'a>;
    type SerializeStructVariant = StructSerializer<'a>;

    fn serialize_bool(self, v: bool) -> Result<Value, EncodeError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, EncodeError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, EncodeError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, EncodeError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, EncodeError> {
        Ok(Value::Int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, EncodeError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, EncodeError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, EncodeError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, EncodeError> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| EncodeError::IntegerOverflow(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, EncodeError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, EncodeError> {
        Ok(Value::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, EncodeError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, EncodeError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, EncodeError> {
        Ok(Value::List(v.iter().map(|b| Value::Int(i64::from(*b))).collect()))
    }

    fn serialize_none(self) -> Result<Value, EncodeError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, EncodeError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, EncodeError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<Value, EncodeError> {
        self.custom(name, Value::Null)
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, EncodeError> {
        self.custom(name, Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Value, EncodeError> {
        let inner = value.serialize(self)?;
        self.custom(name, inner)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, EncodeError> {
        let payload = value.serialize(self)?;
        self.required(name, variant, payload)
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqSerializer<'a>, EncodeError> {
        Ok(SeqSerializer {
            ser: self,
            items: Vec::with_capacity(len.unwrap_or(0)),
            name: None,
            variant: None,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqSerializer<'a>, EncodeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<SeqSerializer<'a>, EncodeError> {
        let mut seq = self.serialize_seq(Some(len))?;
        seq.name = Some(name);
        Ok(seq)
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SeqSerializer<'a>, EncodeError> {
        let mut seq = self.serialize_seq(Some(len))?;
        seq.name = Some(name);
        seq.variant = Some(variant);
        Ok(seq)
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapSerializer<'a>, EncodeError> {
        Ok(MapSerializer {
            ser: self,
            entries: Vec::with_capacity(len.unwrap_or(0)),
            pending_key: None,
        })
    }

    fn serialize_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<StructSerializer<'a>, EncodeError> {
        Ok(StructSerializer {
            ser: self,
            fields: Map::with_capacity(len),
            name,
            variant: None,
        })
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<StructSerializer<'a>, EncodeError> {
        Ok(StructSerializer {
            ser: self,
            fields: Map::with_capacity(len),
            name,
            variant: Some(variant),
        })
    }
}

struct SeqSerializer<'a> {
    ser: ValueSerializer<'a>,
    items: Vec<Value>,
    name: Option<&'static str>,
    variant: Option<&'static str>,
}

impl SeqSerializer<'_> {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.items.push(value.serialize(self.ser)?);
        Ok(())
    }

    fn finish(self) -> Result<Value, EncodeError> {
        let list = Value::List(self.items);
        match (self.name, self.variant) {
            (Some(name), Some(variant)) => self.ser.required(name, variant, list),
            (Some(name), None) => self.ser.custom(name, list),
            _ => Ok(list),
        }
    }
}

impl ser::SerializeSeq for SeqSerializer<'_> {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, EncodeError> {
        self.finish()
    }
}

impl ser::SerializeTuple for SeqSerializer<'_> {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, EncodeError> {
        self.finish()
    }
}

impl ser::SerializeTupleStruct for SeqSerializer<'_> {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, EncodeError> {
        self.finish()
    }
}

impl ser::SerializeTupleVariant for SeqSerializer<'_> {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, EncodeError> {
        self.finish()
    }
}

struct MapSerializer<'a> {
    ser: ValueSerializer<'a>,
    entries: Vec<(Value, Value)>,
    pending_key: Option<Value>,
}

impl ser::SerializeMap for MapSerializer<'_> {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), EncodeError> {
        self.pending_key = Some(key.serialize(self.ser)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| EncodeError::Custom("map value serialized before its key".into()))?;
        self.entries.push((key, value.serialize(self.ser)?));
        Ok(())
    }

    fn end(self) -> Result<Value, EncodeError> {
        if self.entries.iter().all(|(key, _)| key.key_string().is_some()) {
            let mut map = Map::with_capacity(self.entries.len());
            for (key, value) in self.entries {
                if let Some(key) = key.key_string() {
                    map.insert(key, value);
                }
            }
            Ok(Value::Map(map))
        } else {
            Ok(Value::List(
                self.entries
                    .into_iter()
                    .map(|(key, value)| Value::List(vec![key, value]))
                    .collect(),
            ))
        }
    }
}

struct StructSerializer<'a> {
    ser: ValueSerializer<'a>,
    fields: Map,
    name: &'static str,
    variant: Option<&'static str>,
}

impl StructSerializer<'_> {
    fn finish(self) -> Result<Value, EncodeError> {
        let map = Value::Map(self.fields);
        match self.variant {
            Some(variant) => self.ser.required(self.name, variant, map),
            None => self.ser.custom(self.name, map),
        }
    }
}

impl ser::SerializeStruct for StructSerializer<'_> {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EncodeError> {
        self.fields.insert(key.to_string(), value.serialize(self.ser)?);
        Ok(())
    }

    fn end(self) -> Result<Value, EncodeError> {
        self.finish()
    }
}

impl ser::SerializeStructVariant for StructSerializer<'_> {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EncodeError> {
        self.fields.insert(key.to_string(), value.serialize(self.ser)?);
        Ok(())
    }

    fn end(self) -> Result<Value, EncodeError> {
        self.finish()
    }
}
