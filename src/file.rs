//! Loading config files named on the builder or the command line.
//!
//! Paths are read in the order given; the resolve pipeline merges them so
//! later files override earlier ones. Unlike search-path discovery, every
//! path here was asked for explicitly, so a missing file is an error.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::StructfigError;

/// Read one config file.
pub fn read_config_file(path: &Path) -> Result<String, StructfigError> {
    std::fs::read_to_string(path).map_err(|source| StructfigError::IoError {
        path: path.to_path_buf(),
        source,
    })
}

/// Read every file in order, pairing each path with its contents.
pub fn read_config_files(paths: &[PathBuf]) -> Result<Vec<(PathBuf, String)>, StructfigError> {
    paths
        .iter()
        .map(|path| {
            let content = read_config_file(path)?;
            debug!(path = %path.display(), bytes = content.len(), "Read config file");
            Ok((path.clone(), content))
        })
        .collect()
}
