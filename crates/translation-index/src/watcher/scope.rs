//! Path scope checks and translation file enumeration.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::config::LookupConfig;
use crate::error::{LookupError, Result};

/// Canonicalizes a path, returning the original if canonicalization fails.
pub fn canonicalize_existing_path(path: PathBuf) -> PathBuf {
    fs::canonicalize(&path).unwrap_or(path)
}

/// Canonicalizes the parent of `path` and re-attaches the file name.
///
/// Works for files that no longer exist, so delete and rename events compare
/// equal to the paths recorded during the scan.
pub fn normalize_event_path(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            canonicalize_existing_path(parent.to_path_buf()).join(name)
        }
        _ => canonicalize_existing_path(path.to_path_buf()),
    }
}

/// Checks if a path is inside the watched directory.
///
/// Without `recursive` only direct children count.
pub fn path_in_scope(root: &Path, recursive: bool, candidate: &Path) -> bool {
    if candidate == root {
        return false;
    }
    if recursive {
        candidate.starts_with(root)
    } else {
        candidate.parent() == Some(root)
    }
}

/// Lists the files under `root` that match the configured extensions, sorted.
///
/// Hidden files and ignore files are not filtered. Unreadable
/// subdirectories are logged and skipped; an unreadable root is an error.
pub fn list_translation_files(config: &LookupConfig, root: &Path) -> Result<Vec<PathBuf>> {
    fs::read_dir(root).map_err(|error| {
        LookupError::InvalidConfig(format!(
            "unable to read directory {}: {error}",
            root.display()
        ))
    })?;

    let mut builder = WalkBuilder::new(root);
    builder.standard_filters(false).follow_links(false);
    if !config.recursive {
        builder.max_depth(Some(1));
    }

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                log::warn!("translation scan skipped entry under {}: {error}", root.display());
                continue;
            }
        };
        let is_file = entry
            .file_type()
            .is_some_and(|file_type| file_type.is_file());
        if is_file && config.matches_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}
