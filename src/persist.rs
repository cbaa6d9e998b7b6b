//! Config persistence: dump typed configs as documents and load them back.
//!
//! Documents are written in the context's active format with a top-level
//! structure that mirrors the record schema. With
//! [`DumpOptions::omit_defaults`], every leaf equal to the schema's own
//! default is left out, so the file records only what was changed.
//! [`save`] creates parent directories as needed.

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::context::Context;
use crate::error::StructfigError;
use crate::flatten::remove_matching;
use crate::schema::Record;
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpOptions {
    /// Leave out leaves that equal the schema default.
    pub omit_defaults: bool,
}

impl DumpOptions {
    pub fn omit_defaults() -> Self {
        Self { omit_defaults: true }
    }
}

/// Encodes `config`, pruned per `options`.
pub fn to_value<R: Record>(
    ctx: &Context,
    config: &R,
    options: DumpOptions,
) -> Result<Value, StructfigError> {
    let value = ctx.encode(config)?;
    if !options.omit_defaults {
        return Ok(value);
    }
    match value {
        Value::Map(map) => {
            let defaults = R::schema().defaults(ctx);
            Ok(Value::Map(remove_matching(&map, &defaults)?))
        }
        other => Ok(other),
    }
}

/// Renders `config` as a document in the active format.
pub fn dump<R: Record>(ctx: &Context, config: &R, options: DumpOptions) -> Result<String, StructfigError> {
    let value = to_value(ctx, config, options)?;
    Ok(ctx.config_format().dump(&value)?)
}

/// Writes `config` to `path`, creating parent directories.
pub fn save<R: Record>(
    ctx: &Context,
    config: &R,
    path: &Path,
    options: DumpOptions,
) -> Result<(), StructfigError> {
    let content = dump(ctx, config, options)?;
    let io_err = |source| StructfigError::IoError {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, content).map_err(io_err)?;
    debug!(path = %path.display(), format = %ctx.config_format(), "Saved config");
    Ok(())
}

/// Reads one document in the active format and decodes it as `R`.
///
/// Missing keys fall back to the schema defaults, so a dump made with
/// `omit_defaults` loads back to the same config.
pub fn load<R: Record, Rd: Read>(ctx: &Context, reader: Rd) -> Result<R, StructfigError> {
    let map = ctx.config_format().load(reader)?;
    Ok(ctx.decode_record(&Value::Map(map))?)
}

pub fn load_path<R: Record>(ctx: &Context, path: &Path) -> Result<R, StructfigError> {
    let content = crate::file::read_config_file(path)?;
    let map = ctx
        .config_format()
        .load_str(&content)
        .map_err(|source| StructfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(ctx.decode_record(&Value::Map(map))?)
}
