//! Typed, layered configuration for Rust programs. Declare a record, get a
//! command line, config files, and a validated struct.
//!
//! Structfig turns a tree of configuration records into a command-line
//! surface, merges values from defaults, config files and command-line
//! options, and decodes the result into a typed instance. The same schema
//! drives dumping a config back out as YAML, JSON or TOML.
//!
//! ```ignore
//! let config: TrainConfig = structfig::Structfig::builder()
//!     .config_path("train.yaml")
//!     .parse()?;
//! ```
//!
//! That call builds one `--dotted.path` option per leaf field of
//! `TrainConfig` (nested records included), reads `train.yaml` plus any
//! `--config_path` files, lays the command-line values over them, and hands
//! you a `TrainConfig`.
//!
//! # Records
//!
//! A record is a serde struct with an explicit [`RecordSchema`]: each
//! [`Field`] declares its [`TypeExpr`], an optional default, help text and
//! extra option aliases. Nested records become option groups whose
//! destinations are dotted (`log.exp_name`). `Option<Record>` fields become
//! optional groups. A `post_init` hook can derive or check fields once a
//! record is assembled, and `no_init` fields are set only afterwards.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct ComputeConfig {
//!     workers: i64,
//!     device: String,
//! }
//!
//! impl Record for ComputeConfig {
//!     fn schema() -> RecordSchema {
//!         RecordSchema::builder("ComputeConfig")
//!             .doc("Compute resources")
//!             .field(Field::new::<i64>("workers").default(8).alias("-n"))
//!             .field(Field::new::<String>("device").default("cpu"))
//!             .build()
//!     }
//! }
//!
//! structfig::typed_records!(ComputeConfig);
//! ```
//!
//! # Layer precedence
//!
//! ```text
//! Defaults              schema defaults, or the .defaults() instance
//!        ↑ overridden by
//! Sources               .source() mappings, in order
//!        ↑ overridden by
//! Config files          .config_path() files, then --config_path files
//!        ↑ overridden by
//! Command line          --dotted.dest VALUE
//! ```
//!
//! Every layer is sparse and merges per leaf: a file that sets only
//! `compute.device` keeps `compute.workers` from the layers below.
//!
//! # Decoding and encoding
//!
//! The decode engine normalizes raw values against a [`TypeExpr`] (scalar
//! coercion, tuples, sets, mappings, unions, enums, records) before serde
//! builds the Rust value, so `"12"` from the command line reaches an `i64`
//! field as `12`. Decoders for custom types are registered on a [`Context`];
//! [`Context::global()`] is the process-wide default. Encoding goes the
//! other way, with per-type encoders for types that have no natural
//! primitive form.
//!
//! # Without clap
//!
//! The `clap` feature (on by default) adds [`StructfigBuilder::parse`] and
//! the [`Registrar::command`] adapter. Without it, drive any argument parser
//! and hand the raw pairs to [`StructfigBuilder::parse_flat`].

pub mod error;
pub mod format;
pub mod merge;
pub mod persist;
pub mod resolve;
pub mod types;

mod builder;
#[cfg(feature = "clap")]
mod cli;
mod context;
mod de;
mod decode;
mod encode;
mod file;
mod flatten;
mod registrar;
mod schema;
mod value;

#[cfg(test)]
mod fixtures;

use std::io::Read;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use builder::{Structfig, StructfigBuilder};
pub use context::{Context, DecodeFn, Decoder, EncodeFn, FormatGuard};
pub use de::ValueDeserializer;
pub use decode::str2bool;
pub use error::{DecodeError, EncodeError, FormatError, SchemaError, StructfigError};
pub use flatten::{deflatten, flatten, remove_matching};
pub use format::ConfigFormat;
pub use persist::DumpOptions;
pub use registrar::{CONFIG_PATH, FieldDescriptor, FieldGroup, Registrar};
pub use schema::{DefaultFactory, Field, PostInit, Record, RecordSchema, RecordSchemaBuilder};
pub use types::{EnumType, NamedType, RecordType, TypeExpr, TypeVar, Typed};
pub use value::{Map, Value};

/// Decodes `raw` as `T` with the global context.
pub fn decode<T: Typed + DeserializeOwned>(raw: &Value) -> Result<T, DecodeError> {
    Context::global().decode(raw)
}

/// Encodes `value` with the global context.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value, EncodeError> {
    Context::global().encode(value)
}

/// Parses the process arguments into `R`.
#[cfg(feature = "clap")]
pub fn parse<R: Record>() -> Result<R, StructfigError> {
    Structfig::builder().parse()
}

#[cfg(feature = "clap")]
pub fn parse_from<R, I, T>(args: I) -> Result<R, StructfigError>
where
    R: Record,
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Structfig::builder().parse_from(args)
}

/// Reads a document in the global format and decodes it as `R`.
pub fn load<R: Record, Rd: Read>(reader: Rd) -> Result<R, StructfigError> {
    persist::load(Context::global(), reader)
}

/// Renders `config` as a document in the global format.
pub fn dump<R: Record>(config: &R, options: DumpOptions) -> Result<String, StructfigError> {
    persist::dump(Context::global(), config, options)
}
