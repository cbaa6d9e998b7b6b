//! Serde `Deserializer` over an owned [`Value`].
//!
//! This is the last step of decoding: once a raw value has been normalized
//! for its declared type, serde's derived `Deserialize` builds the Rust
//! instance from it. Mapping keys are text, so they are parsed back into
//! integers, floats or booleans when the target key type asks for one.
//! Mappings stored as lists of `[key, value]` pairs are accepted wherever a
//! map is expected.
//!
//! A deserializer built with [`ValueDeserializer::typed`] follows the
//! declared type down into records and containers, so a failure inside a
//! record field (say, `300` for a `u8`) is reported as a
//! [`DecodeError::Field`] naming the record, field, type and raw value.

use serde::de::{
    self, DeserializeSeed, Deserializer, EnumAccess, IntoDeserializer, MapAccess, SeqAccess,
    Unexpected, VariantAccess, Visitor,
};
use serde::forward_to_deserialize_any;

use crate::error::DecodeError;
use crate::schema::RecordSchema;
use crate::types::{RecordType, TypeExpr};
use crate::value::{Map, Value};

pub struct ValueDeserializer {
    value: Value,
    ty: Option<TypeExpr>,
}

impl ValueDeserializer {
    pub fn new(value: Value) -> Self {
        Self { value, ty: None }
    }

    /// Deserializer that knows the declared type of `value`.
    pub fn typed(value: Value, ty: &TypeExpr) -> Self {
        Self {
            value,
            ty: Some(ty.clone()),
        }
    }

    fn with_type(value: Value, ty: Option<TypeExpr>) -> Self {
        Self { value, ty }
    }
}

impl<'de> IntoDeserializer<'de, DecodeError> for Value {
    type Deserializer = ValueDeserializer;

    fn into_deserializer(self) -> ValueDeserializer {
        ValueDeserializer::new(self)
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Int(i) => Unexpected::Signed(*i),
        Value::Float(x) => Unexpected::Float(*x),
        Value::String(s) => Unexpected::Str(s),
        Value::List(_) => Unexpected::Seq,
        Value::Map(_) => Unexpected::Map,
    }
}

/// `T | none` narrowed to `T` once the value is known not to be null.
fn strip_none(ty: TypeExpr) -> TypeExpr {
    let narrowed = match ty.resolved() {
        TypeExpr::Union(branches) => {
            let rest: Vec<&TypeExpr> = branches.iter().filter(|b| **b != TypeExpr::None).collect();
            match rest.as_slice() {
                [only] => Some(only.concrete()),
                _ => None,
            }
        }
        _ => None,
    };
    narrowed.unwrap_or(ty)
}

fn record_of(ty: &TypeExpr) -> Option<RecordType> {
    match ty.resolved() {
        TypeExpr::Record(record) => Some(*record),
        other => other.record_arg(),
    }
}

fn element_type(ty: Option<&TypeExpr>, index: usize) -> Option<TypeExpr> {
    match ty?.resolved() {
        TypeExpr::Tuple(items) => items.get(index).map(TypeExpr::concrete),
        other => other.item_type(),
    }
}

fn map_value_type(ty: Option<&TypeExpr>) -> Option<TypeExpr> {
    match ty?.resolved() {
        TypeExpr::Map(_, value) => Some(value.concrete()),
        _ => None,
    }
}

fn visit_map<'de, V: Visitor<'de>>(
    map: Map,
    ty: Option<&TypeExpr>,
    visitor: V,
) -> Result<V::Value, DecodeError> {
    let len = map.len();
    let mut access = MapAccessor {
        iter: map.into_iter(),
        value: None,
        value_ty: map_value_type(ty),
    };
    let out = visitor.visit_map(&mut access)?;
    match access.iter.len() {
        0 => Ok(out),
        remaining => Err(de::Error::invalid_length(len - remaining, &"fewer map entries")),
    }
}

fn visit_record<'de, V: Visitor<'de>>(
    map: Map,
    schema: RecordSchema,
    visitor: V,
) -> Result<V::Value, DecodeError> {
    let len = map.len();
    let mut access = RecordAccessor {
        schema,
        iter: map.into_iter(),
        pending: None,
    };
    let out = visitor.visit_map(&mut access)?;
    match access.iter.len() {
        0 => Ok(out),
        remaining => Err(de::Error::invalid_length(len - remaining, &"fewer fields")),
    }
}

fn visit_list<'de, V: Visitor<'de>>(
    items: Vec<Value>,
    ty: Option<TypeExpr>,
    visitor: V,
) -> Result<V::Value, DecodeError> {
    let len = items.len();
    let mut access = SeqAccessor {
        iter: items.into_iter(),
        ty,
        index: 0,
    };
    let out = visitor.visit_seq(&mut access)?;
    match access.iter.len() {
        0 => Ok(out),
        remaining => Err(de::Error::invalid_length(len - remaining, &"fewer elements")),
    }
}

impl<'de> Deserializer<'de> for ValueDeserializer {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Int(i) => visitor.visit_i64(i),
            Value::Float(x) => visitor.visit_f64(x),
            Value::String(s) => visitor.visit_string(s),
            Value::List(items) => visit_list(items, self.ty, visitor),
            Value::Map(map) => visit_map(map, self.ty.as_ref(), visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Null => visitor.visit_none(),
            value => visitor.visit_some(Self::with_type(value, self.ty.map(strip_none))),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            ref other => Err(de::Error::invalid_type(unexpected(other), &visitor)),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        let record = self.ty.as_ref().and_then(record_of);
        match (self.value, record) {
            (Value::Map(map), Some(record)) => visit_record(map, record.schema(), visitor),
            (value, _) => Self::with_type(value, self.ty).deserialize_any(visitor),
        }
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_f64(visitor)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Int(i) => visitor.visit_f64(i as f64),
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::String(s) => visitor.visit_byte_buf(s.into_bytes()),
            Value::List(items) => {
                let bytes = items
                    .iter()
                    .map(|item| match item {
                        Value::Int(b) => u8::try_from(*b)
                            .map_err(|_| de::Error::invalid_value(unexpected(item), &"a byte")),
                        other => Err(de::Error::invalid_type(unexpected(other), &"a byte")),
                    })
                    .collect::<Result<Vec<u8>, DecodeError>>()?;
                visitor.visit_byte_buf(bytes)
            }
            other => Err(de::Error::invalid_type(unexpected(&other), &visitor)),
        }
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Map(map) => visit_map(map, self.ty.as_ref(), visitor),
            Value::List(items) => visitor.visit_map(PairsAccessor {
                iter: items.into_iter(),
                value: None,
                value_ty: map_value_type(self.ty.as_ref()),
            }),
            other => Err(de::Error::invalid_type(unexpected(&other), &visitor)),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::String(variant) => visitor.visit_enum(variant.into_deserializer()),
            Value::Map(map) if map.len() == 1 => {
                let mut iter = map.into_iter();
                match iter.next() {
                    Some((variant, value)) => visitor.visit_enum(VariantAccessor { variant, value }),
                    None => Err(de::Error::custom("expected a single-key map for an enum")),
                }
            }
            other => Err(de::Error::invalid_type(unexpected(&other), &"an enum variant")),
        }
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 char str string
        seq tuple tuple_struct identifier ignored_any
    }
}

struct SeqAccessor {
    iter: std::vec::IntoIter<Value>,
    ty: Option<TypeExpr>,
    index: usize,
}

impl<'de> SeqAccess<'de> for SeqAccessor {
    type Error = DecodeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, DecodeError> {
        let Some(value) = self.iter.next() else {
            return Ok(None);
        };
        let ty = element_type(self.ty.as_ref(), self.index);
        self.index += 1;
        seed.deserialize(ValueDeserializer::with_type(value, ty)).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapAccessor {
    iter: indexmap::map::IntoIter<String, Value>,
    value: Option<Value>,
    value_ty: Option<TypeExpr>,
}

impl<'de> MapAccess<'de> for MapAccessor {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, DecodeError> {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(KeyDeserializer { key }).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<T::Value, DecodeError> {
        match self.value.take() {
            Some(value) => seed.deserialize(ValueDeserializer::with_type(value, self.value_ty.clone())),
            None => Err(de::Error::custom("value requested before key")),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

/// Map access over the fields of a record. A failure inside a field is
/// reported against that field.
struct RecordAccessor {
    schema: RecordSchema,
    iter: indexmap::map::IntoIter<String, Value>,
    pending: Option<(String, Value)>,
}

impl<'de> MapAccess<'de> for RecordAccessor {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, DecodeError> {
        match self.iter.next() {
            Some((key, value)) => {
                self.pending = Some((key.clone(), value));
                seed.deserialize(KeyDeserializer { key }).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<T::Value, DecodeError> {
        let Some((field, value)) = self.pending.take() else {
            return Err(de::Error::custom("value requested before key"));
        };
        let ty = self.schema.field(&field).map(|f| f.ty().clone());
        let raw = value.clone();
        seed.deserialize(ValueDeserializer::with_type(value, ty.clone()))
            .map_err(|err| {
                if err.is_parsing_error() {
                    return err;
                }
                DecodeError::Field {
                    record: self.schema.name().to_string(),
                    field,
                    ty: ty.map_or_else(|| TypeExpr::Any.to_string(), |ty| ty.to_string()),
                    raw,
                    source: Box::new(err),
                }
            })
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

/// Map access over a list of `[key, value]` pairs.
struct PairsAccessor {
    iter: std::vec::IntoIter<Value>,
    value: Option<Value>,
    value_ty: Option<TypeExpr>,
}

impl<'de> MapAccess<'de> for PairsAccessor {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, DecodeError> {
        let Some(item) = self.iter.next() else {
            return Ok(None);
        };
        match item {
            Value::List(pair) if pair.len() == 2 => {
                let mut pair = pair.into_iter();
                let key = pair.next().unwrap_or_default();
                self.value = pair.next();
                seed.deserialize(ValueDeserializer::new(key)).map(Some)
            }
            other => Err(de::Error::invalid_type(unexpected(&other), &"a [key, value] pair")),
        }
    }

    fn next_value_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<T::Value, DecodeError> {
        match self.value.take() {
            Some(value) => seed.deserialize(ValueDeserializer::with_type(value, self.value_ty.clone())),
            None => Err(de::Error::custom("value requested before key")),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct VariantAccessor {
    variant: String,
    value: Value,
}

impl<'de> EnumAccess<'de> for VariantAccessor {
    type Error = DecodeError;
    type Variant = ValueDeserializer;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, ValueDeserializer), DecodeError> {
        let variant = seed.deserialize(KeyDeserializer { key: self.variant })?;
        Ok((variant, ValueDeserializer::new(self.value)))
    }
}

impl<'de> VariantAccess<'de> for ValueDeserializer {
    type Error = DecodeError;

    fn unit_variant(self) -> Result<(), DecodeError> {
        match self.value {
            Value::Null => Ok(()),
            other => Err(de::Error::invalid_type(unexpected(&other), &"a unit variant")),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, DecodeError> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_map(visitor)
    }
}

/// Deserializes a mapping key, parsing it when the target is not a string.
struct KeyDeserializer {
    key: String,
}

macro_rules! parse_key {
    ($($method:ident => $visit:ident($ty:ty)),+ $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
                match self.key.parse::<$ty>() {
                    Ok(parsed) => visitor.$visit(parsed),
                    Err(_) => Err(de::Error::invalid_value(Unexpected::Str(&self.key), &visitor)),
                }
            }
        )+
    };
}

impl<'de> Deserializer<'de> for KeyDeserializer {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_string(self.key)
    }

    parse_key! {
        deserialize_bool => visit_bool(bool),
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_enum(self.key.into_deserializer())
    }

    forward_to_deserialize_any! {
        i128 u128 char str string bytes byte_buf unit unit_struct
        seq tuple tuple_struct map struct identifier ignored_any
    }
}
