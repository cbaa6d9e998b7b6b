//! Core resolution pipeline: merge all config layers and produce a typed config.
//!
//! Operates on pre-loaded data ([`ResolveInput`]) with no I/O, making the full
//! pipeline testable with synthetic inputs. Steps:
//!
//! 1. Start from the encoded default instance, if one was given
//! 2. Lay programmatic sources on top
//! 3. Parse each config file with the active format (later overrides earlier)
//! 4. Lay the command-line values on top (highest priority)
//! 5. Decode the merged mapping as the root record

use std::path::PathBuf;

use tracing::debug;

use crate::context::Context;
use crate::error::StructfigError;
use crate::merge::merge_sources;
use crate::schema::Record;
use crate::value::{Map, Value};

/// All pre-loaded data needed to resolve a config. No I/O happens here.
#[derive(Debug, Clone, Default)]
pub struct ResolveInput {
    /// Encoded default instance: the lowest layer.
    pub defaults: Option<Map>,
    /// In-memory mappings, lowest priority first.
    pub sources: Vec<Map>,
    /// File contents in precedence order: first = lowest priority, last = highest.
    pub files: Vec<(PathBuf, String)>,
    /// Coerced command-line values keyed by dotted destination, without
    /// the `config_path` entry.
    pub cli: Map,
}

/// Resolve configuration from pre-loaded inputs.
pub fn resolve<R: Record>(ctx: &Context, input: ResolveInput) -> Result<R, StructfigError> {
    let format = ctx.config_format();
    let mut layers: Vec<Map> = Vec::with_capacity(1 + input.sources.len() + input.files.len());
    layers.extend(input.defaults);
    layers.extend(input.sources);

    for (path, content) in &input.files {
        let map = format
            .load_str(content)
            .map_err(|source| StructfigError::ParseError {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), %format, keys = map.len(), "Loaded config file");
        layers.push(map);
    }

    let merged = merge_sources(layers, input.cli)?;
    Ok(ctx.decode_record::<R>(&Value::Map(merged))?)
}
