//! Source Discovery
//!
//! Expands the `--sources` argument into an ordered list of files. A
//! directory yields its regular files; anything else is a glob pattern.
//! The list is sorted so column order does not depend on the filesystem.

use crate::matrix::{source_id_from_path, MatrixError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One association input found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSource {
    pub id: String,
    pub path: PathBuf,
}

/// Expand a directory or glob pattern into sorted sources
pub fn discover_sources(pattern: &str) -> Result<Vec<DiscoveredSource>, MatrixError> {
    let root = Path::new(pattern);
    let mut paths = if root.is_dir() {
        list_directory(root)?
    } else {
        expand_glob(pattern)?
    };
    paths.sort();

    if paths.is_empty() {
        return Err(MatrixError::Resource(format!(
            "no association sources match `{}`",
            pattern
        )));
    }

    debug!(pattern, count = paths.len(), "discovered association sources");
    Ok(paths
        .into_iter()
        .map(|path| DiscoveredSource {
            id: source_id_from_path(&path),
            path,
        })
        .collect())
}

fn list_directory(dir: &Path) -> Result<Vec<PathBuf>, MatrixError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        MatrixError::Resource(format!("cannot list {}: {}", dir.display(), e))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            MatrixError::Resource(format!("cannot list {}: {}", dir.display(), e))
        })?;
        let path = entry.path();
        // Follows symlinks, so linked files count and dangling links don't
        if path.is_file() {
            paths.push(path);
        }
    }
    Ok(paths)
}

fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>, MatrixError> {
    let matches = glob::glob(pattern).map_err(|e| {
        MatrixError::Resource(format!("invalid source pattern `{}`: {}", pattern, e))
    })?;

    let mut paths = Vec::new();
    for entry in matches {
        let path = entry.map_err(|e| MatrixError::Resource(e.to_string()))?;
        if path.is_file() {
            paths.push(path);
        }
    }
    Ok(paths)
}
