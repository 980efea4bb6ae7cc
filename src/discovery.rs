//! Transcript file discovery.
//!
//! Lists the regular files directly inside the input directory whose file
//! name matches one of the include globs. Discovery is not recursive and
//! the result is sorted by file name so runs are reproducible.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::ingest::IngestError;

pub fn discover_files(dir: &Path, include_globs: &[String]) -> Result<Vec<PathBuf>, IngestError> {
    if !dir.exists() {
        return Err(IngestError::MissingInputDir(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(IngestError::NotADirectory(dir.to_path_buf()));
    }

    let include_set = build_globset(include_globs)?;

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // Depth 0 is the input directory itself.
            Err(e) if e.depth() == 0 => {
                return Err(IngestError::UnreadableInputDir {
                    path: dir.to_path_buf(),
                    message: e.to_string(),
                })
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        if include_set.is_match(entry.file_name()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet, IngestError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
