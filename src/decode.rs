//! Decode engine: turns raw values into values normalized for a declared
//! [`TypeExpr`], then into typed Rust values.
//!
//! Decoders are resolved once per annotation and cached on the
//! [`Context`]. Resolution follows a fixed order:
//!
//! 1. a registered decoder for the exact type (or an ancestor registered
//!    with `include_subclasses`);
//! 2. records, decoded field by field;
//! 3. `any`, passed through unchanged;
//! 4. mappings, sets, tuples and lists, built from the decoders of their
//!    type arguments;
//! 5. unions, trying each branch in declaration order;
//! 6. enums, by member name;
//! 7. bounded type variables, via their bound.
//!
//! Anything else is [`DecodeError::Unresolvable`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::context::{Context, Decoder};
use crate::de::ValueDeserializer;
use crate::error::DecodeError;
use crate::schema::{Record, RecordSchema};
use crate::types::{EnumType, PATH, RecordType, TypeExpr, Typed};
use crate::value::{Map, Value};

impl Context {
    /// Returns the (cached) decoder for `ty`.
    pub fn resolve_decoder(&self, ty: &TypeExpr) -> Result<Decoder, DecodeError> {
        if let Some(decoder) = self.cached_decoder(ty) {
            return Ok(decoder);
        }
        let decoder = self.build_decoder(ty)?;
        self.cache_decoder(ty.clone(), decoder.clone());
        Ok(decoder)
    }

    /// Decodes `raw` into the normalized primitive form of `ty`.
    pub fn decode_value(&self, ty: &TypeExpr, raw: &Value) -> Result<Value, DecodeError> {
        let decoder = self.resolve_decoder(ty)?;
        decoder(self, raw)
    }

    /// Decodes `raw` as `ty` and deserializes the result into `T`.
    pub fn decode_as<T: DeserializeOwned>(&self, ty: &TypeExpr, raw: &Value) -> Result<T, DecodeError> {
        let value = self.decode_value(ty, raw)?;
        T::deserialize(ValueDeserializer::typed(value, ty))
    }

    pub fn decode<T: Typed + DeserializeOwned>(&self, raw: &Value) -> Result<T, DecodeError> {
        self.decode_as(&T::type_expr(), raw)
    }

    pub fn decode_record<R: Record>(&self, raw: &Value) -> Result<R, DecodeError> {
        self.decode_as(&TypeExpr::record::<R>(), raw)
    }

    fn build_decoder(&self, ty: &TypeExpr) -> Result<Decoder, DecodeError> {
        if let Some(func) = self.registered_decoder(ty) {
            debug!(ty = %ty, "Using registered decoder");
            let annotation = ty.clone();
            return Ok(make_decoder(move |_, raw| func(&annotation, raw)));
        }

        match ty {
            TypeExpr::Record(record) => {
                let record = *record;
                Ok(make_decoder(move |ctx, raw| decode_record(ctx, &record, raw)))
            }
            TypeExpr::Any => Ok(make_decoder(|_, raw| Ok(raw.clone()))),
            TypeExpr::None => {
                let annotation = ty.clone();
                Ok(make_decoder(move |_, raw| match raw {
                    Value::Null => Ok(Value::Null),
                    other => Err(DecodeError::invalid(&annotation, other, "expected null")),
                }))
            }
            TypeExpr::Map(key, value) => {
                let key_decoder = self.resolve_decoder(&key.concrete())?;
                let value_decoder = self.resolve_decoder(&value.concrete())?;
                let annotation = ty.clone();
                Ok(make_decoder(move |ctx, raw| {
                    decode_map(ctx, &annotation, &key_decoder, &value_decoder, raw)
                }))
            }
            TypeExpr::Set(item) => {
                let item_decoder = self.resolve_decoder(&item.concrete())?;
                let annotation = ty.clone();
                Ok(make_decoder(move |ctx, raw| {
                    let items = decode_items(ctx, &annotation, &item_decoder, raw)?;
                    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
                    for item in items {
                        if !unique.contains(&item) {
                            unique.push(item);
                        }
                    }
                    Ok(Value::List(unique))
                }))
            }
            TypeExpr::VarTuple(item) => {
                let item_decoder = self.resolve_decoder(&item.concrete())?;
                let annotation = ty.clone();
                Ok(make_decoder(move |ctx, raw| {
                    reject_null_tuple(&annotation, raw)?;
                    decode_items(ctx, &annotation, &item_decoder, raw).map(Value::List)
                }))
            }
            TypeExpr::Tuple(items) => {
                let decoders = items
                    .iter()
                    .map(|item| self.resolve_decoder(&item.concrete()))
                    .collect::<Result<Vec<_>, _>>()?;
                let annotation = ty.clone();
                Ok(make_decoder(move |ctx, raw| {
                    decode_fixed_tuple(ctx, &annotation, &decoders, raw)
                }))
            }
            TypeExpr::List(item) => {
                let item_decoder = self.resolve_decoder(&item.concrete())?;
                let annotation = ty.clone();
                Ok(make_decoder(move |ctx, raw| {
                    decode_items(ctx, &annotation, &item_decoder, raw).map(Value::List)
                }))
            }
            TypeExpr::Union(branches) => {
                let optional = branches.contains(&TypeExpr::None);
                let decoders = branches
                    .iter()
                    .filter(|branch| **branch != TypeExpr::None)
                    .map(|branch| Ok((branch.clone(), self.resolve_decoder(branch)?)))
                    .collect::<Result<Vec<_>, DecodeError>>()?;
                let annotation = ty.clone();
                Ok(make_decoder(move |ctx, raw| {
                    decode_union(ctx, &annotation, optional, &decoders, raw)
                }))
            }
            TypeExpr::Enum(e) => {
                let e = *e;
                Ok(make_decoder(move |_, raw| decode_enum(&e, raw)))
            }
            TypeExpr::Var(var) => match &var.bound {
                Some(bound) => self.resolve_decoder(bound),
                None => Err(DecodeError::Unresolvable { ty: ty.to_string() }),
            },
            _ => Err(DecodeError::Unresolvable { ty: ty.to_string() }),
        }
    }
}

fn make_decoder<F>(func: F) -> Decoder
where
    F: Fn(&Context, &Value) -> Result<Value, DecodeError> + Send + Sync + 'static,
{
    Arc::new(func)
}

fn decode_record(ctx: &Context, record: &RecordType, raw: &Value) -> Result<Value, DecodeError> {
    let schema = record.schema();
    // Optional records never get here with a null: the union takes it first.
    let map = match raw {
        Value::Map(map) => map,
        other => {
            return Err(DecodeError::invalid(record.name(), other, "expected a mapping"));
        }
    };
    debug!(record = schema.name(), "Decoding record");

    let mut remaining = map.clone();
    let mut init = Map::with_capacity(schema.fields().len());
    let mut non_init = Map::new();
    for field in schema.fields() {
        let Some(raw_value) = remaining.shift_remove(field.name()) else {
            if field.is_init() && !field.has_default() && !field.ty().is_record() {
                warn!(
                    record = schema.name(),
                    field = field.name(),
                    keys = ?map.keys().collect::<Vec<_>>(),
                    "No value and no default for field"
                );
            }
            continue;
        };
        let value = ctx.decode_value(field.ty(), &raw_value).map_err(|err| {
            if err.is_parsing_error() {
                err
            } else {
                DecodeError::Field {
                    record: schema.name().to_string(),
                    field: field.name().to_string(),
                    ty: field.ty().to_string(),
                    raw: raw_value.clone(),
                    source: Box::new(err),
                }
            }
        })?;
        if field.is_init() {
            init.insert(field.name().to_string(), value);
        } else {
            non_init.insert(field.name().to_string(), value);
        }
    }

    if !remaining.is_empty() {
        return Err(DecodeError::UnknownFields {
            record: schema.name().to_string(),
            keys: remaining.into_keys().collect(),
        });
    }

    let mut instance = construct(ctx, &schema, init)?;
    for (name, value) in non_init {
        debug!(record = schema.name(), field = %name, "Setting non-init field after construction");
        instance.insert(name, value);
    }
    Ok(Value::Map(instance))
}

/// Builds the constructor map: decoded values, then defaults, then nested
/// records built from their own defaults. Runs the post-init hook last.
fn construct(ctx: &Context, schema: &RecordSchema, mut init: Map) -> Result<Map, DecodeError> {
    let construct_err = |reason: String| DecodeError::Construct {
        record: schema.name().to_string(),
        reason,
    };

    let mut instance = Map::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let name = field.name();
        if let Some(value) = init.shift_remove(name) {
            instance.insert(name.to_string(), value);
            continue;
        }
        if let Some(default) = field.default_in(ctx) {
            let value = default.map_err(|err| construct_err(err.to_string()))?;
            instance.insert(name.to_string(), value);
            continue;
        }
        if !field.is_init() {
            continue;
        }
        if let TypeExpr::Record(nested) = field.ty().resolved() {
            let value = decode_record(ctx, nested, &Value::Map(Map::new()))?;
            instance.insert(name.to_string(), value);
            continue;
        }
        return Err(DecodeError::MissingField {
            record: schema.name().to_string(),
            field: name.to_string(),
        });
    }

    if let Some(hook) = schema.post_init() {
        hook(&mut instance).map_err(construct_err)?;
    }
    Ok(instance)
}

fn decode_items(
    ctx: &Context,
    ty: &TypeExpr,
    item_decoder: &Decoder,
    raw: &Value,
) -> Result<Vec<Value>, DecodeError> {
    let Value::List(items) = raw else {
        return Err(DecodeError::NotASequence {
            ty: ty.to_string(),
            raw: raw.clone(),
        });
    };
    items.iter().map(|item| item_decoder(ctx, item)).collect()
}

fn reject_null_tuple(ty: &TypeExpr, raw: &Value) -> Result<(), DecodeError> {
    if raw.is_null() {
        return Err(DecodeError::invalid(ty, raw, "value must not be null for conversion to a tuple"));
    }
    Ok(())
}

fn decode_fixed_tuple(
    ctx: &Context,
    ty: &TypeExpr,
    decoders: &[Decoder],
    raw: &Value,
) -> Result<Value, DecodeError> {
    reject_null_tuple(ty, raw)?;
    let Value::List(items) = raw else {
        return Err(DecodeError::NotASequence {
            ty: ty.to_string(),
            raw: raw.clone(),
        });
    };
    if items.len() != decoders.len() {
        return Err(DecodeError::Arity {
            ty: ty.to_string(),
            expected: decoders.len(),
            actual: items.len(),
        });
    }
    items
        .iter()
        .zip(decoders)
        .map(|(item, decoder)| decoder(ctx, item))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

/// Accepts a mapping or a list of `[key, value]` pairs. Produces a mapping
/// when every decoded key has a text form, otherwise a list of pairs.
fn decode_map(
    ctx: &Context,
    ty: &TypeExpr,
    key_decoder: &Decoder,
    value_decoder: &Decoder,
    raw: &Value,
) -> Result<Value, DecodeError> {
    let pairs: Vec<(Value, &Value)> = match raw {
        Value::Map(map) => map
            .iter()
            .map(|(key, value)| (Value::String(key.clone()), value))
            .collect(),
        Value::List(items) => items
            .iter()
            .map(|item| match item.as_list() {
                Some([key, value]) => Ok((key.clone(), value)),
                _ => Err(DecodeError::invalid(ty, item, "expected a [key, value] pair")),
            })
            .collect::<Result<_, _>>()?,
        other => return Err(DecodeError::invalid(ty, other, "expected a mapping")),
    };

    let mut decoded = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        decoded.push((key_decoder(ctx, &key)?, value_decoder(ctx, value)?));
    }

    if decoded.iter().all(|(key, _)| key.key_string().is_some()) {
        let mut map = Map::with_capacity(decoded.len());
        for (key, value) in decoded {
            if let Some(key) = key.key_string() {
                map.insert(key, value);
            }
        }
        Ok(Value::Map(map))
    } else {
        Ok(Value::List(
            decoded
                .into_iter()
                .map(|(key, value)| Value::List(vec![key, value]))
                .collect(),
        ))
    }
}

fn decode_union(
    ctx: &Context,
    ty: &TypeExpr,
    optional: bool,
    decoders: &[(TypeExpr, Decoder)],
    raw: &Value,
) -> Result<Value, DecodeError> {
    if optional && raw.is_null() {
        return Ok(Value::Null);
    }
    let mut attempts = Vec::with_capacity(decoders.len());
    for (branch, decoder) in decoders {
        match decoder(ctx, raw) {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!(ty = %ty, branch = %branch, error = %err, "Union branch rejected value");
                attempts.push(format!("{branch}: {err}"));
            }
        }
    }
    Err(DecodeError::NoBranch {
        ty: ty.to_string(),
        raw: raw.clone(),
        attempts,
    })
}

fn decode_enum(e: &EnumType, raw: &Value) -> Result<Value, DecodeError> {
    raw.as_str()
        .and_then(|name| e.member(name))
        .map(Value::from)
        .ok_or_else(|| DecodeError::UnknownMember {
            ty: e.name.to_string(),
            name: raw.to_string(),
            members: e.members.iter().map(|m| m.to_string()).collect(),
        })
}

/// Parses the usual spellings of a boolean, case-insensitively.
pub fn str2bool(raw: &str) -> Result<bool, DecodeError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" => Ok(true),
        "no" | "false" | "f" | "n" | "0" => Ok(false),
        _ => Err(DecodeError::invalid(
            TypeExpr::Bool,
            &Value::from(raw),
            "boolean value expected",
        )),
    }
}

fn decode_str(ty: &TypeExpr, raw: &Value) -> Result<Value, DecodeError> {
    match raw {
        Value::String(s) => Ok(Value::String(s.clone())),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => Ok(Value::String(raw.to_string())),
        other => Err(DecodeError::invalid(ty, other, "expected a string")),
    }
}

fn decode_int(ty: &TypeExpr, raw: &Value) -> Result<Value, DecodeError> {
    match raw {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(x) if x.fract() == 0.0 && x.abs() < i64::MAX as f64 => Ok(Value::Int(*x as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|err| DecodeError::invalid(ty, raw, err.to_string())),
        other => Err(DecodeError::invalid(ty, other, "expected an integer")),
    }
}

fn decode_float(ty: &TypeExpr, raw: &Value) -> Result<Value, DecodeError> {
    match raw {
        Value::Float(x) => Ok(Value::Float(*x)),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|err| DecodeError::invalid(ty, raw, err.to_string())),
        other => Err(DecodeError::invalid(ty, other, "expected a number")),
    }
}

fn decode_bool(ty: &TypeExpr, raw: &Value) -> Result<Value, DecodeError> {
    match raw {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::String(s) => str2bool(s).map(Value::Bool),
        Value::Int(0) => Ok(Value::Bool(false)),
        Value::Int(1) => Ok(Value::Bool(true)),
        other => Err(DecodeError::invalid(ty, other, "boolean value expected")),
    }
}

fn decode_bytes(ty: &TypeExpr, raw: &Value) -> Result<Value, DecodeError> {
    match raw {
        Value::String(s) => Ok(Value::List(
            s.bytes().map(|b| Value::Int(i64::from(b))).collect(),
        )),
        Value::List(items)
            if items
                .iter()
                .all(|item| matches!(item, Value::Int(b) if (0..=255).contains(b))) =>
        {
            Ok(raw.clone())
        }
        other => Err(DecodeError::invalid(ty, other, "expected a string or a list of bytes")),
    }
}

fn decode_path(ty: &TypeExpr, raw: &Value) -> Result<Value, DecodeError> {
    match raw {
        Value::String(s) => Ok(Value::String(s.clone())),
        other => Err(DecodeError::invalid(ty, other, "expected a path string")),
    }
}

pub(crate) fn register_builtins(ctx: &Context) {
    ctx.register_decoder(TypeExpr::Str, decode_str, false);
    ctx.register_decoder(TypeExpr::Int, decode_int, false);
    ctx.register_decoder(TypeExpr::Float, decode_float, false);
    ctx.register_decoder(TypeExpr::Bool, decode_bool, false);
    ctx.register_decoder(TypeExpr::Bytes, decode_bytes, false);
    ctx.register_decoder(TypeExpr::Named(PATH), decode_path, true);
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    use super::*;
    use crate::fixtures::test::{
        Catalog, Child, Color, IdOrName, LogConfig, Maybe, Pair, Palette, Parent, Port, Simple,
        TrainConfig, map,
    };
    use crate::types::NamedType;

    #[test]
    fn record_with_defaults() {
        let ctx = Context::new();
        let simple: Simple = ctx.decode_record(&map(&[("a", Value::Int(7))])).unwrap();
        assert_eq!(simple, Simple { a: 7, b: 5.0, c: String::new() });
    }

    #[test]
    fn record_missing_required_field() {
        let ctx = Context::new();
        let err = ctx.decode_record::<Simple>(&map(&[("b", Value::Float(1.0))])).unwrap_err();
        assert_matches!(err, DecodeError::MissingField { ref field, .. } if field == "a");
    }

    #[test]
    fn record_rejects_unknown_keys() {
        let ctx = Context::new();
        let err = ctx
            .decode_record::<Simple>(&map(&[("a", Value::Int(1)), ("typo", Value::Int(2))]))
            .unwrap_err();
        assert_matches!(err, DecodeError::UnknownFields { ref keys, .. } if keys == &["typo"]);
    }

    #[test]
    fn record_field_errors_are_wrapped() {
        let ctx = Context::new();
        let err = ctx
            .decode_record::<Simple>(&map(&[("a", Value::from("many"))]))
            .unwrap_err();
        assert_matches!(err, DecodeError::Field { ref field, ref ty, .. } if field == "a" && ty == "int");
        assert!(err.to_string().contains("'many'"));
    }

    #[test]
    fn nested_errors_are_not_rewrapped() {
        let ctx = Context::new();
        let raw = map(&[("compute", map(&[("workers", Value::from("lots"))]))]);
        let err = ctx.decode_record::<TrainConfig>(&raw).unwrap_err();
        assert_matches!(err, DecodeError::Field { ref record, ref field, .. } if record == "ComputeConfig" && field == "workers");
    }

    #[test]
    fn nested_record_missing_uses_its_defaults() {
        let ctx = Context::new();
        let config: TrainConfig = ctx.decode_record(&Value::Map(Map::new())).unwrap();
        assert_eq!(config, TrainConfig::default());
    }

    #[test]
    fn post_init_derives_field() {
        let ctx = Context::new();
        let raw = map(&[("exp_name", Value::from("run7")), ("exp_folder", Value::from("/data"))]);
        let log: LogConfig = ctx.decode_record(&raw).unwrap();
        assert_eq!(log.exp_dir, std::path::PathBuf::from("/data/run7"));
    }

    #[test]
    fn post_init_failure_is_construct_error() {
        let ctx = Context::new();
        let raw = map(&[("compute", map(&[("workers", Value::Int(0))]))]);
        let err = ctx.decode_record::<TrainConfig>(&raw).unwrap_err();
        assert_matches!(err, DecodeError::Construct { ref record, .. } if record == "ComputeConfig");
    }

    #[test]
    fn non_init_field_set_after_construction() {
        let ctx = Context::new();
        let raw = map(&[("exp_dir", Value::from("/elsewhere"))]);
        let log: LogConfig = ctx.decode_record(&raw).unwrap();
        assert_eq!(log.exp_dir, std::path::PathBuf::from("/elsewhere"));
    }

    #[test]
    fn null_record_stays_null() {
        let ctx = Context::new();
        let parent: Parent = ctx.decode_record(&map(&[("child", Value::Null)])).unwrap();
        assert_eq!(parent.child, None);
    }

    #[test]
    fn null_for_required_record_is_a_field_error() {
        let ctx = Context::new();
        let err = ctx
            .decode_record::<TrainConfig>(&map(&[("log", Value::Null)]))
            .unwrap_err();
        assert_matches!(err, DecodeError::Field { ref record, ref field, ref source, .. } => {
            assert_eq!(record, "TrainConfig");
            assert_eq!(field, "log");
            assert_matches!(**source, DecodeError::Invalid { ref ty, .. } if ty == "LogConfig");
        });
    }

    #[test]
    fn out_of_range_integer_names_the_field() {
        let ctx = Context::new();
        let err = ctx.decode_record::<Port>(&map(&[("port", Value::Int(300))])).unwrap_err();
        assert_matches!(
            err,
            DecodeError::Field { ref record, ref field, ref ty, ref raw, .. }
                if record == "Port" && field == "port" && ty == "int" && *raw == Value::Int(300)
        );
        let port: Port = ctx.decode_record(&map(&[("port", Value::Int(255))])).unwrap();
        assert_eq!(port.port, 255);
    }

    #[test]
    fn nested_field_error_names_the_inner_record() {
        let ctx = Context::new();
        let raw = map(&[("owner", map(&[("age", Value::from("nine"))]))]);
        let err = ctx.decode_record::<Catalog>(&raw).unwrap_err();
        assert_matches!(err, DecodeError::Field { ref record, ref field, .. } if record == "Child" && field == "age");
    }

    #[test]
    fn optional_record_decodes_when_present() {
        let ctx = Context::new();
        let raw = map(&[("child", map(&[("name", Value::from("Dylan"))]))]);
        let parent: Parent = ctx.decode_record(&raw).unwrap();
        assert_eq!(parent.child, Some(Child { name: "Dylan".into(), age: 12 }));
    }

    #[test]
    fn fixed_tuple_arity() {
        let ctx = Context::new();
        let pair: Pair = ctx
            .decode_record(&map(&[("ints", Value::List(vec![Value::Int(3), Value::Int(4)]))]))
            .unwrap();
        assert_eq!(pair.ints, (3, 4));
        let err = ctx
            .decode_record::<Pair>(&map(&[("ints", Value::List(vec![Value::Int(3)]))]))
            .unwrap_err();
        assert_matches!(err, DecodeError::Field { ref source, .. } => {
            assert_matches!(**source, DecodeError::Arity { expected: 2, actual: 1, .. });
        });
    }

    #[test]
    fn tuple_rejects_null() {
        let ctx = Context::new();
        let err = ctx.decode::<(i64, i64)>(&Value::Null).unwrap_err();
        assert_matches!(err, DecodeError::Invalid { .. });
    }

    #[test]
    fn variadic_tuple_accepts_any_length() {
        let ctx = Context::new();
        let ty = TypeExpr::var_tuple(TypeExpr::Int);
        let raw = Value::List(vec![Value::Int(1), Value::from("2"), Value::Float(3.0)]);
        let decoded: Vec<i64> = ctx.decode_as(&ty, &raw).unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }

    #[test]
    fn list_requires_sequence() {
        let ctx = Context::new();
        let err = ctx.decode::<Vec<i64>>(&Value::Int(1)).unwrap_err();
        assert_matches!(err, DecodeError::NotASequence { .. });
    }

    #[test]
    fn set_deduplicates() {
        let ctx = Context::new();
        let raw = Value::List(vec![Value::Int(1), Value::from("1"), Value::Int(2)]);
        let value = ctx.decode_value(&TypeExpr::set(TypeExpr::Int), &raw).unwrap();
        assert_eq!(value, Value::List(vec![Value::Int(1), Value::Int(2)]));
        let set: HashSet<i64> = ctx.decode(&raw).unwrap();
        assert_eq!(set, HashSet::from([1, 2]));
    }

    #[test]
    fn map_with_int_keys() {
        let ctx = Context::new();
        let raw = map(&[("1", Value::from("one")), ("2", Value::from("two"))]);
        let decoded: BTreeMap<i64, String> = ctx.decode(&raw).unwrap();
        assert_eq!(decoded, BTreeMap::from([(1, "one".into()), (2, "two".into())]));
    }

    #[test]
    fn map_from_pair_list() {
        let ctx = Context::new();
        let raw = Value::List(vec![
            Value::List(vec![Value::from("a"), Value::Int(1)]),
            Value::List(vec![Value::from("b"), Value::Int(2)]),
        ]);
        let decoded: HashMap<String, i64> = ctx.decode(&raw).unwrap();
        assert_eq!(decoded, HashMap::from([("a".into(), 1), ("b".into(), 2)]));
    }

    #[test]
    fn map_with_tuple_keys_stays_pairs() {
        let ctx = Context::new();
        let ty = TypeExpr::of::<Vec<((i64, i64), String)>>();
        let raw = Value::List(vec![Value::List(vec![
            Value::List(vec![Value::Int(1), Value::Int(2)]),
            Value::from("x"),
        ])]);
        let map_ty = TypeExpr::map(TypeExpr::of::<(i64, i64)>(), TypeExpr::Str);
        let value = ctx.decode_value(&map_ty, &raw).unwrap();
        assert_eq!(value, raw);
        let pairs: Vec<((i64, i64), String)> = ctx.decode_as(&ty, &value).unwrap();
        assert_eq!(pairs, vec![((1, 2), "x".to_string())]);
    }

    #[test]
    fn optional_passes_null_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = Context::new();
        let seen = calls.clone();
        ctx.register_decoder(
            TypeExpr::Int,
            move |_, raw| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(raw.clone())
            },
            false,
        );
        let decoded: Option<i64> = ctx.decode(&Value::Null).unwrap();
        assert_eq!(decoded, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let decoded: Option<i64> = ctx.decode(&Value::Int(3)).unwrap();
        assert_eq!(decoded, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn union_tries_branches_in_order() {
        let ctx = Context::new();
        let ty = TypeExpr::Union(vec![TypeExpr::Int, TypeExpr::Str]);
        assert_eq!(ctx.decode_value(&ty, &Value::from("12")).unwrap(), Value::Int(12));
        assert_eq!(ctx.decode_value(&ty, &Value::from("abc")).unwrap(), Value::from("abc"));
        let err = ctx
            .decode_value(&TypeExpr::Union(vec![TypeExpr::Int, TypeExpr::Float]), &Value::from("x"))
            .unwrap_err();
        assert_matches!(err, DecodeError::NoBranch { ref attempts, .. } if attempts.len() == 2);
    }

    #[test]
    fn enum_by_member_name() {
        let ctx = Context::new();
        let palette: Palette = ctx.decode_record(&map(&[("color", Value::from("BLUE"))])).unwrap();
        assert_eq!(palette.color, Color::Blue);
        let err = ctx
            .decode_record::<Palette>(&map(&[("color", Value::from("GREEN"))]))
            .unwrap_err();
        assert_matches!(err, DecodeError::Field { ref source, .. } => {
            assert_matches!(**source, DecodeError::UnknownMember { ref name, .. } if name == "GREEN");
        });
    }

    #[test]
    fn scalar_coercions() {
        let ctx = Context::new();
        assert_eq!(ctx.decode::<i64>(&Value::Float(3.0)).unwrap(), 3);
        assert!(ctx.decode::<i64>(&Value::Float(3.5)).is_err());
        assert_eq!(ctx.decode::<f64>(&Value::Int(2)).unwrap(), 2.0);
        assert_eq!(ctx.decode::<String>(&Value::Int(2)).unwrap(), "2");
        assert!(ctx.decode::<bool>(&Value::from("Yes")).unwrap());
        assert!(!ctx.decode::<bool>(&Value::from("0")).unwrap());
        assert!(ctx.decode::<bool>(&Value::from("maybe")).is_err());
        let bytes: Vec<u8> = ctx.decode_as(&TypeExpr::Bytes, &Value::from("hi")).unwrap();
        assert_eq!(bytes, b"hi");
    }

    #[test]
    fn any_is_identity() {
        let ctx = Context::new();
        let raw = map(&[("x", Value::List(vec![Value::Null]))]);
        assert_eq!(ctx.decode_value(&TypeExpr::Any, &raw).unwrap(), raw);
        let ty = TypeExpr::list(TypeExpr::var("T", None));
        let list = Value::List(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(ctx.decode_value(&ty, &list).unwrap(), list);
    }

    #[test]
    fn bounded_var_uses_bound() {
        let ctx = Context::new();
        let ty = TypeExpr::var("N", Some(TypeExpr::Int));
        assert_eq!(ctx.decode_value(&ty, &Value::from("5")).unwrap(), Value::Int(5));
        let err = ctx.decode_value(&TypeExpr::var("T", None), &Value::Int(1)).unwrap_err();
        assert_matches!(err, DecodeError::Unresolvable { .. });
    }

    #[test]
    fn unregistered_named_type_is_unresolvable() {
        const POINT: NamedType = NamedType::new("Point");
        let ctx = Context::new();
        let err = ctx.resolve_decoder(&TypeExpr::named(POINT)).err().unwrap();
        assert_matches!(err, DecodeError::Unresolvable { ref ty } if ty == "Point");
    }

    #[test]
    fn registered_decoder_overrides_structure() {
        const POINT: NamedType = NamedType::new("Point");
        let ctx = Context::new();
        ctx.register_decoder(
            TypeExpr::named(POINT),
            |ty, raw| {
                let text = raw.as_str().ok_or_else(|| DecodeError::invalid(ty, raw, "expected 'x,y'"))?;
                let parts = text
                    .split(',')
                    .map(|p| p.trim().parse::<i64>().map(Value::Int))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| DecodeError::invalid(ty, raw, e.to_string()))?;
                Ok(Value::List(parts))
            },
            false,
        );
        let point: (i64, i64) = ctx.decode_as(&TypeExpr::named(POINT), &Value::from("1, 2")).unwrap();
        assert_eq!(point, (1, 2));
    }

    #[test]
    fn subclass_registration_applies_to_descendants() {
        const RELATIVE: NamedType = NamedType::with_bases("relative_path", &["path"]);
        let ctx = Context::new();
        let decoded = ctx
            .decode_value(&TypeExpr::named(RELATIVE), &Value::from("a/b"))
            .unwrap();
        assert_eq!(decoded, Value::from("a/b"));
    }

    #[test]
    fn decoders_are_cached_per_annotation() {
        let ctx = Context::new();
        let ty = TypeExpr::of::<Vec<i64>>();
        let first = ctx.resolve_decoder(&ty).unwrap();
        let second = ctx.resolve_decoder(&ty).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    fn catalog() -> Catalog {
        Catalog {
            tags: BTreeSet::from(["a".to_string(), "b".to_string()]),
            names_by_id: BTreeMap::from([(1, "one".to_string()), (20, "twenty".to_string())]),
            edges: BTreeMap::from([((0, 1), "near".to_string()), ((2, 5), "far".to_string())]),
            widths: vec![1.5, 2.0, 3.25],
            key: IdOrName::Name("main".into()),
            owner: Some(Child { name: "Dylan".into(), age: 9 }),
        }
    }

    #[test]
    fn encoded_instance_decodes_back() {
        let ctx = Context::new();
        let catalog = catalog();
        let encoded = ctx.encode(&catalog).unwrap();
        let decoded: Catalog = ctx.decode_record(&encoded).unwrap();
        assert_eq!(decoded, catalog);

        let by_id = Catalog {
            key: IdOrName::Id(7),
            owner: None,
            ..catalog
        };
        let decoded: Catalog = ctx.decode_record(&ctx.encode(&by_id).unwrap()).unwrap();
        assert_eq!(decoded, by_id);
    }

    #[test]
    fn decoding_the_same_mapping_twice_gives_equal_instances() {
        let ctx = Context::new();
        let raw = map(&[
            (
                "tags",
                Value::List(vec![Value::from("x"), Value::from("x"), Value::from("y")]),
            ),
            ("names_by_id", map(&[("3", Value::from("three"))])),
            ("widths", Value::List(vec![Value::Int(1), Value::from("2.5")])),
            ("key", Value::from("12")),
            ("owner", map(&[("name", Value::from("Dylan"))])),
        ]);
        let first: Catalog = ctx.decode_record(&raw).unwrap();
        let second: Catalog = ctx.decode_record(&raw).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.key, IdOrName::Id(12));
        assert_eq!(first.widths, vec![1.0, 2.5]);

        let raw = map(&[("log", map(&[("exp_name", Value::from("run7"))]))]);
        let first: TrainConfig = ctx.decode_record(&raw).unwrap();
        let second: TrainConfig = ctx.decode_record(&raw).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn optional_fields_default_to_none() {
        let ctx = Context::new();
        let maybe: Maybe = ctx.decode_record(&map(&[("val_b", Value::Int(2))])).unwrap();
        assert_eq!(maybe.val_a, None);
        assert_eq!(maybe.val_b, Some(2));
    }
}
