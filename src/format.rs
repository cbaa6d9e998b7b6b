//! Config-format strategy: YAML, JSON or TOML.
//!
//! The active format (see [`Context::config_format`](crate::Context::config_format))
//! governs how CLI strings are parsed into values, how config files are
//! loaded, and how configs are dumped.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::FormatError;
use crate::value::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    pub const ALL: [ConfigFormat; 3] = [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml];

    pub fn name(self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Json => "json",
            ConfigFormat::Toml => "toml",
        }
    }

    /// Parses a single CLI token into a value.
    ///
    /// Text the format cannot parse (`bob` in JSON, `hello world` in TOML) is
    /// kept as a plain string.
    pub fn parse_string(self, s: &str) -> Value {
        let parsed = match self {
            ConfigFormat::Yaml => serde_yaml::from_str::<Value>(s).ok(),
            ConfigFormat::Json => serde_json::from_str::<Value>(s).ok(),
            ConfigFormat::Toml => parse_toml_scalar(s),
        };
        parsed.unwrap_or_else(|| Value::String(s.to_string()))
    }

    /// Reads a whole document. An empty document is an empty mapping.
    pub fn load<R: Read>(self, mut reader: R) -> Result<Map, FormatError> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        self.load_str(&content)
    }

    pub fn load_str(self, content: &str) -> Result<Map, FormatError> {
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        let value: Value = match self {
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        };
        match value {
            Value::Map(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(FormatError::NotAMapping(other.type_name())),
        }
    }

    /// Serializes a value as a document. TOML has no null, so null entries
    /// are left out.
    pub fn dump(self, value: &Value) -> Result<String, FormatError> {
        match self {
            ConfigFormat::Yaml => Ok(serde_yaml::to_string(value)?),
            ConfigFormat::Json => Ok(serde_json::to_string_pretty(value)?),
            ConfigFormat::Toml => Ok(toml::to_string(&strip_nulls(value))?),
        }
    }

    pub fn save<W: Write>(self, value: &Value, mut writer: W) -> Result<(), FormatError> {
        writer.write_all(self.dump(value)?.as_bytes())?;
        Ok(())
    }
}

fn parse_toml_scalar(s: &str) -> Option<Value> {
    #[derive(Deserialize)]
    struct Wrapped {
        val: Value,
    }
    toml::from_str::<Wrapped>(&format!("val = {s}"))
        .ok()
        .map(|wrapped| wrapped.val)
}

fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Map(map) => Value::Map(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::List(items) => Value::List(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConfigFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "json" => Ok(ConfigFormat::Json),
            "toml" => Ok(ConfigFormat::Toml),
            _ => Err(FormatError::UnknownFormat(s.to_string())),
        }
    }
}
