//! Dotted-key flattening of nested mappings.
//!
//! `{log: {exp_name: "a"}, steps: 3}` flattens to
//! `{"log.exp_name": "a", "steps": 3}`. Lists are leaves; so are empty
//! mappings, which survive a flatten/deflatten round trip.

use crate::error::StructfigError;
use crate::value::{Map, Value};

/// Flatten a nested mapping into dotted key paths, preserving order.
pub fn flatten(map: &Map) -> Map {
    let mut out = Map::with_capacity(map.len());
    flatten_into(map, "", &mut out);
    out
}

fn flatten_into(map: &Map, prefix: &str, out: &mut Map) {
    for (key, value) in map {
        let dotted = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Map(inner) if !inner.is_empty() => flatten_into(inner, &dotted, out),
            other => {
                out.insert(dotted, other.clone());
            }
        }
    }
}

/// Rebuild the nested structure from dotted keys.
///
/// `("log.exp_name", "a")` becomes `{log: {exp_name: "a"}}`. A null standing
/// where a section is needed is replaced by the section, and a later null
/// replaces a section outright. An empty mapping sets no leaves, so it leaves
/// an existing section intact. Any other scalar in the way is a
/// [`StructfigError::KeyConflict`].
pub fn deflatten(flat: Map) -> Result<Map, StructfigError> {
    let mut out = Map::with_capacity(flat.len());
    for (dotted, value) in flat {
        set_nested(&mut out, &dotted, value)?;
    }
    Ok(out)
}

fn set_nested(map: &mut Map, dotted: &str, value: Value) -> Result<(), StructfigError> {
    let mut segments = dotted.split('.').peekable();
    let mut current = map;
    let mut walked = String::new();

    while let Some(segment) = segments.next() {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);

        if segments.peek().is_none() {
            let keep_section = is_empty_map(&value)
                && matches!(current.get(segment), Some(Value::Map(existing)) if !existing.is_empty());
            if !keep_section {
                current.insert(segment.to_string(), value);
            }
            return Ok(());
        }

        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Map(Map::new()));
        if slot.is_null() {
            *slot = Value::Map(Map::new());
        }
        current = match slot {
            Value::Map(inner) => inner,
            _ => return Err(StructfigError::KeyConflict { key: walked }),
        };
    }
    Ok(())
}

fn is_empty_map(value: &Value) -> bool {
    matches!(value, Value::Map(map) if map.is_empty())
}

/// Entries of `map` whose flattened value differs from `reference`,
/// nested again. Used to dump only non-default values.
pub fn remove_matching(map: &Map, reference: &Map) -> Result<Map, StructfigError> {
    let reference = flatten(reference);
    let changed: Map = flatten(map)
        .into_iter()
        .filter(|(key, value)| reference.get(key) != Some(value))
        .collect();
    deflatten(changed)
}
