//! Leaf-level merging of configuration sources.
//!
//! Every source is flattened to dotted keys and laid over the previous ones
//! key by key, so a later file that sets `log.exp_name` keeps every other
//! `log.*` value from earlier layers. Command-line values go last.

use std::path::PathBuf;

use tracing::debug;

use crate::error::StructfigError;
use crate::flatten::{deflatten, flatten};
use crate::registrar::CONFIG_PATH;
use crate::value::{Map, Value};

/// Merge `sources` (lowest precedence first), then `cli`, into one nested
/// mapping.
///
/// `cli` holds dotted keys as produced by the registrar; the reserved
/// `config_path` key must already have been taken out with
/// [`take_config_paths`].
pub fn merge_sources<I>(sources: I, cli: Map) -> Result<Map, StructfigError>
where
    I: IntoIterator<Item = Map>,
{
    let mut merged = Map::new();
    for (layer, source) in sources.into_iter().enumerate() {
        let flat = flatten(&source);
        debug!(layer, keys = flat.len(), "Merging config layer");
        for (key, value) in flat {
            overlay(&mut merged, key, value);
        }
    }
    let cli = flatten(&cli);
    debug!(keys = cli.len(), "Merging command-line values");
    for (key, value) in cli {
        overlay(&mut merged, key, value);
    }
    deflatten(merged)
}

/// Sets one dotted leaf, dropping leaves it shadows or is shadowed by.
///
/// An empty mapping carries no leaves and leaves an existing section alone;
/// a null replaces it like any other value.
fn overlay(merged: &mut Map, key: String, value: Value) {
    let empty = matches!(&value, Value::Map(m) if m.is_empty());
    if empty && merged.keys().any(|existing| is_below(existing, &key)) {
        return;
    }
    merged.retain(|existing, _| !is_below(existing, &key) && !is_below(&key, existing));
    merged.insert(key, value);
}

/// True when `key` lies strictly under `section` (`a.b` under `a`).
fn is_below(key: &str, section: &str) -> bool {
    key.len() > section.len() && key.starts_with(section) && key.as_bytes()[section.len()] == b'.'
}

/// Removes the reserved `config_path` entry from a command-line mapping and
/// returns the paths it named, in order.
pub fn take_config_paths(cli: &mut Map) -> Result<Vec<PathBuf>, StructfigError> {
    match cli.shift_remove(CONFIG_PATH) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(path)) => Ok(vec![PathBuf::from(path)]),
        Some(Value::List(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(path) => Ok(PathBuf::from(path)),
                other => Err(StructfigError::InvalidConfigPath(other)),
            })
            .collect(),
        Some(other) => Err(StructfigError::InvalidConfigPath(other)),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::fixtures::test::map;

    fn m(value: Value) -> Map {
        value.into_map().unwrap()
    }

    #[test]
    fn disjoint_keys_merge() {
        let merged = merge_sources(
            [m(map(&[("host", Value::from("localhost"))])), m(map(&[("port", Value::Int(3000))]))],
            Map::new(),
        )
        .unwrap();
        assert_eq!(merged["host"], Value::from("localhost"));
        assert_eq!(merged["port"], Value::Int(3000));
    }

    #[test]
    fn later_source_wins_per_leaf() {
        let a = m(map(&[("val_a", Value::Int(1))]));
        let b = m(map(&[("val_a", Value::Int(2)), ("val_b", Value::Int(2))]));
        let merged = merge_sources([a, b], Map::new()).unwrap();
        assert_eq!(Value::Map(merged), map(&[("val_a", Value::Int(2)), ("val_b", Value::Int(2))]));
    }

    #[test]
    fn nested_sections_merge_per_leaf() {
        let base = m(map(&[(
            "database",
            map(&[("url", Value::from("postgres://old")), ("pool_size", Value::Int(5))]),
        )]));
        let overlay = m(map(&[("database", map(&[("pool_size", Value::Int(20))]))]));
        let merged = merge_sources([base, overlay], Map::new()).unwrap();
        let db = merged["database"].as_map().unwrap();
        assert_eq!(db["url"], Value::from("postgres://old"));
        assert_eq!(db["pool_size"], Value::Int(20));
    }

    #[test]
    fn cli_applies_last() {
        let file = m(map(&[("log", map(&[("exp_name", Value::from("file"))]))]));
        let cli = m(map(&[("log.exp_name", Value::from("cli"))]));
        let merged = merge_sources([file], cli).unwrap();
        assert_eq!(merged["log"], map(&[("exp_name", Value::from("cli"))]));
    }

    #[test]
    fn later_scalar_replaces_section() {
        let base = m(map(&[("database", map(&[("url", Value::from("x"))]))]));
        let overlay = m(map(&[("database", Value::from("flat_string"))]));
        let merged = merge_sources([base, overlay], Map::new()).unwrap();
        assert_eq!(merged["database"], Value::from("flat_string"));
    }

    #[test]
    fn later_section_replaces_scalar() {
        let base = m(map(&[("database", Value::from("flat_string"))]));
        let overlay = m(map(&[("database", map(&[("url", Value::from("x"))]))]));
        let merged = merge_sources([base, overlay], Map::new()).unwrap();
        assert_eq!(merged["database"], map(&[("url", Value::from("x"))]));
    }

    #[test]
    fn null_default_gives_way_to_values() {
        let defaults = m(map(&[("child", Value::Null)]));
        let cli = m(map(&[("child.name", Value::from("Dylan"))]));
        let merged = merge_sources([defaults], cli).unwrap();
        assert_eq!(merged["child"], map(&[("name", Value::from("Dylan"))]));
    }

    #[test]
    fn later_null_turns_section_off() {
        let defaults = m(map(&[("child", map(&[("name", Value::from("Kevin")), ("age", Value::Int(12))]))]));
        let file = m(map(&[("child", Value::Null)]));
        let merged = merge_sources([defaults, file], Map::new()).unwrap();
        assert_eq!(merged["child"], Value::Null);
    }

    #[test]
    fn empty_mapping_overlay_keeps_section() {
        let base = m(map(&[("log", map(&[("exp_name", Value::from("a"))]))]));
        let overlay = m(map(&[("log", Value::Map(Map::new()))]));
        let merged = merge_sources([base, overlay], Map::new()).unwrap();
        assert_eq!(merged["log"], map(&[("exp_name", Value::from("a"))]));
    }

    #[test]
    fn empty_sources_merge_to_empty() {
        assert!(merge_sources(Vec::<Map>::new(), Map::new()).unwrap().is_empty());
    }

    #[test]
    fn is_below_requires_dot_boundary() {
        assert!(is_below("a.b", "a"));
        assert!(!is_below("ab", "a"));
        assert!(!is_below("a", "a"));
    }

    #[test]
    fn take_config_paths_variants() {
        let mut cli = m(map(&[("config_path", Value::from("a.yaml")), ("x", Value::Int(1))]));
        assert_eq!(take_config_paths(&mut cli).unwrap(), vec![PathBuf::from("a.yaml")]);
        assert!(!cli.contains_key("config_path"));

        let mut cli = m(map(&[(
            "config_path",
            Value::List(vec![Value::from("a.yaml"), Value::from("b.yaml")]),
        )]));
        assert_eq!(take_config_paths(&mut cli).unwrap().len(), 2);

        let mut cli = Map::new();
        assert!(take_config_paths(&mut cli).unwrap().is_empty());

        let mut cli = m(map(&[("config_path", Value::Int(3))]));
        assert_matches!(take_config_paths(&mut cli), Err(StructfigError::InvalidConfigPath(_)));
    }
}
