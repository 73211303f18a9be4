//! Local directory enumeration: walks a list of input paths (files or
//! directories) into a flat `Vec<FileEntry>` ready for a transfer offer.
//!
//! For a single file argument, `relative_path` is just its file name. For
//! a directory argument, each entry's `relative_path` is the path
//! relative to the directory argument itself, joined with `/` regardless
//! of host path separator, so it round-trips through the wire protocol
//! the same way on every platform. Symlinks are not followed (`walkdir`'s
//! default).

use lanshare_core::path_validator::is_safe_relative_path;
use lanshare_core::types::FileEntry;
use std::path::Path;
use std::time::UNIX_EPOCH;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum EnumerateError {
    #[error("path does not exist: {0}")]
    NotFound(std::path::PathBuf),

    #[error("failed to read metadata for {path}: {source}")]
    Metadata { path: std::path::PathBuf, source: std::io::Error },

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{path} would produce an unsafe relative path {relative_path:?}; skipping")]
    UnsafeRelativePath { path: std::path::PathBuf, relative_path: String },
}

/// Enumerates every input path into a flat list of `FileEntry` values.
///
/// A bare file path contributes one entry named by its file name. A
/// directory path is walked recursively; each file under it contributes
/// one entry whose `relative_path` is its path relative to the directory,
/// with `/` separators. An empty directory contributes zero entries.
pub fn enumerate_paths(paths: &[std::path::PathBuf]) -> Result<Vec<FileEntry>, EnumerateError> {
    let mut entries = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(EnumerateError::NotFound(path.clone()));
        }
        if path.is_dir() {
            enumerate_dir(path, &mut entries)?;
        } else {
            let relative = file_name(path);
            if !is_safe_relative_path(&relative) {
                return Err(EnumerateError::UnsafeRelativePath {
                    path: path.clone(),
                    relative_path: relative,
                });
            }
            entries.push(file_entry(path, relative)?);
        }
    }
    Ok(entries)
}

fn enumerate_dir(dir: &Path, entries: &mut Vec<FileEntry>) -> Result<(), EnumerateError> {
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        if !is_safe_relative_path(&relative) {
            return Err(EnumerateError::UnsafeRelativePath {
                path: entry.path().to_path_buf(),
                relative_path: relative,
            });
        }

        entries.push(file_entry(entry.path(), relative)?);
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn file_entry(absolute_path: &Path, relative_path: String) -> Result<FileEntry, EnumerateError> {
    let metadata = std::fs::metadata(absolute_path)
        .map_err(|e| EnumerateError::Metadata { path: absolute_path.to_path_buf(), source: e })?;
    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Ok(FileEntry {
        relative_path,
        absolute_path: absolute_path.to_path_buf(),
        size: metadata.len(),
        modified,
    })
}
