use std::path::{Path, PathBuf};

use crate::ast::File;
use crate::cache::Cache;
use crate::error::{CfgError, Diagnostic, Diagnostics};
use crate::parser;

/// Reads and parses a file from disk, consulting `cache` first when given.
/// Used both directly (the CLI's entry point) and as the `Loader` callback
/// threaded through `decode::partial_parse`/`IncludeMerger` for resolving
/// include targets.
pub fn load(path: &Path, cache: Option<&Cache>) -> Result<File, Diagnostics> {
    if let Some(cache) = cache {
        if let Ok(Some(hit)) = cache.get_file(path) {
            return Ok(hit);
        }
    }

    let bytes = std::fs::read(path).map_err(|_| single(path, crate::error::file_not_found(path)))?;
    let file = parser::parse(&bytes, path)?;

    if let Some(cache) = cache {
        let _ = cache.put_file(path, file.clone());
    }

    Ok(file)
}

/// Searches `start_dir` and its ancestors for a file named `name`, returning
/// the first match. Backs the `find_in_parent_folders` builtin.
pub fn find_in_parent_folders(start_dir: &Path, name: &str) -> Option<PathBuf> {
    let mut dir = Some(start_dir.to_path_buf());
    while let Some(d) = dir {
        let candidate = d.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = d.parent().map(Path::to_path_buf);
    }
    None
}

fn single(path: &Path, err: CfgError) -> Diagnostics {
    let mut d = Diagnostics::new();
    d.push(Diagnostic::error(path.to_path_buf(), 0, 0, err));
    d
}
