use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::envelope::{Resolved, Warning};

/// Expands `paths` into the flat list of files to attach.
///
/// Missing paths are skipped, directories are walked recursively (in file name
/// order) and only regular files are kept; a symlink counts when it points to
/// one. Nothing here is fatal: every skipped entry is reported as a [`Warning`].
pub fn resolve<P: AsRef<Path>>(paths: &[P]) -> Resolved<Vec<PathBuf>> {
    let mut files = Vec::with_capacity(paths.len());
    let mut warnings = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                warnings.push(Warning::Attachment {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                });
                continue;
            }
        };

        if metadata.is_file() {
            files.push(path.to_path_buf());
            continue;
        }
        if !metadata.is_dir() {
            warnings.push(not_a_file(path));
            continue;
        }

        debug!("Attachment {} is a directory, walking the directory", path.display());
        for entry in WalkDir::new(path).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(entry) if entry.file_type().is_dir() => {}
                // not followed by the walk, so check the target
                Ok(entry) => match fs::metadata(entry.path()) {
                    Ok(metadata) if metadata.is_file() => files.push(entry.into_path()),
                    Ok(_) => warnings.push(not_a_file(entry.path())),
                    Err(err) => warnings.push(Warning::Attachment {
                        path: entry.into_path(),
                        reason: err.to_string(),
                    }),
                },
                Err(err) => warnings.push(Warning::Attachment {
                    path: err.path().unwrap_or(path).to_path_buf(),
                    reason: err.to_string(),
                }),
            }
        }
    }

    Resolved::with_warnings(files, warnings)
}

fn not_a_file(path: &Path) -> Warning {
    Warning::Attachment {
        path: path.to_path_buf(),
        reason: "not a regular file".to_string(),
    }
}
