use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::value::Value;

/// Top-level error for the parse / load / dump surface.
#[derive(Debug, Error)]
pub enum StructfigError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    ParseError { path: PathBuf, source: FormatError },

    #[error("Key '{key}' is used both as a value and as a section")]
    KeyConflict { key: String },

    #[error("Invalid config path value: {0}")]
    InvalidConfigPath(Value),

    #[cfg(feature = "clap")]
    #[error(transparent)]
    Cli(#[from] clap::Error),
}

/// Raised while walking a record schema, before any input is read.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("`{name}` is a reserved option name and cannot be a field of `{record}`")]
    ReservedName { record: String, name: String },

    #[error("Destination `{dest}` is registered more than once")]
    DuplicateDestination { dest: String },

    #[error("Option `{option}` is declared by both `{first}` and `{second}`")]
    DuplicateOption {
        option: String,
        first: String,
        second: String,
    },

    #[error(
        "Field `{record}.{field}` is of type `{ty}`, which isn't supported yet (container of a record type)"
    )]
    ContainerOfRecords {
        record: String,
        field: String,
        ty: String,
    },

    #[error("Field `{record}.{field}` is of type `{ty}`; a union may hold at most one record type")]
    AmbiguousRecordUnion {
        record: String,
        field: String,
        ty: String,
    },

    #[error("Record `{record}` nests itself at `{dest}`")]
    RecursiveRecord { record: String, dest: String },

    #[error("Failed to compute the default of `{dest}`: {source}")]
    Default { dest: String, source: EncodeError },
}

/// Raised when a raw value cannot be turned into its declared type.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(
        "Failed when parsing value '{raw}' into field `{record}.{field}` of type `{ty}`: {source}"
    )]
    Field {
        record: String,
        field: String,
        ty: String,
        raw: Value,
        source: Box<DecodeError>,
    },

    #[error("Missing required field `{record}.{field}`")]
    MissingField { record: String, field: String },

    #[error("Couldn't construct `{record}` from the given arguments: {reason}")]
    Construct { record: String, reason: String },

    #[error("Fields {keys:?} do not belong to `{record}`")]
    UnknownFields { record: String, keys: Vec<String> },

    #[error("Cannot decode '{raw}' as `{ty}`: {reason}")]
    Invalid {
        ty: String,
        raw: Value,
        reason: String,
    },

    #[error("The given value '{raw}' is not a valid input for `{ty}`: expected a list")]
    NotASequence { ty: String, raw: Value },

    #[error("Trying to decode {actual} values for a predefined {expected}-tuple `{ty}`")]
    Arity {
        ty: String,
        expected: usize,
        actual: usize,
    },

    #[error("No valid parsing for value '{raw}' as `{ty}` ({})", attempts.join("; "))]
    NoBranch {
        ty: String,
        raw: Value,
        attempts: Vec<String>,
    },

    #[error("'{name}' is not a member of enum `{ty}` (expected one of {members:?})")]
    UnknownMember {
        ty: String,
        name: String,
        members: Vec<String>,
    },

    #[error("No decoding function for type `{ty}`, register one with `Context::register_decoder`")]
    Unresolvable { ty: String },

    #[error("{0}")]
    Custom(String),
}

impl DecodeError {
    /// Errors of the dedicated parsing kinds pass through enclosing records
    /// unchanged; everything else is wrapped into [`DecodeError::Field`].
    pub fn is_parsing_error(&self) -> bool {
        matches!(
            self,
            DecodeError::Field { .. } | DecodeError::MissingField { .. } | DecodeError::Construct { .. }
        )
    }

    /// Shorthand for [`DecodeError::Invalid`], for custom decoders.
    pub fn invalid(ty: impl fmt::Display, raw: &Value, reason: impl Into<String>) -> Self {
        DecodeError::Invalid {
            ty: ty.to_string(),
            raw: raw.clone(),
            reason: reason.into(),
        }
    }
}

impl serde::de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        DecodeError::Custom(msg.to_string())
    }
}

/// Raised when a value has no primitive representation.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(
        "No encoder for object {value} of type `{type_name}`, register one with `Context::register_encoder`"
    )]
    Unregistered { type_name: String, value: String },

    #[error("Integer {0} does not fit in 64 signed bits")]
    IntegerOverflow(u64),

    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for EncodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        EncodeError::Custom(msg.to_string())
    }
}

/// Raised by the YAML / JSON / TOML codecs.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Unknown config format '{0}' (expected yaml, json or toml)")]
    UnknownFormat(String),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Cannot write TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Expected a mapping at the top of the document, found {0}")]
    NotAMapping(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
