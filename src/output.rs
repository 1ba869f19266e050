use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::PersistenceError;

/// What `reconcile_output` did to the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputOutcome {
    Written { path: PathBuf, items: usize },
    Removed { path: PathBuf },
    Untouched,
}

/// Make `path` reflect `items`: replace it wholesale when there is anything to
/// keep, delete it when there is not. Running it twice with the same items
/// leaves the same state.
///
/// Writes go through a temporary file in the same directory and a rename, so
/// readers see either the old file or the complete new one.
pub fn reconcile_output<T: Serialize>(
    path: &Path,
    items: &[T],
) -> Result<OutputOutcome, PersistenceError> {
    if items.is_empty() {
        return remove_stale(path);
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|source| PersistenceError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let json = serde_json::to_vec_pretty(items).map_err(|source| PersistenceError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;

    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(&json).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    info!(path = %path.display(), items = items.len(), "Wrote output");
    Ok(OutputOutcome::Written {
        path: path.to_path_buf(),
        items: items.len(),
    })
}

fn remove_stale(path: &Path) -> Result<OutputOutcome, PersistenceError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Removed stale output (no matches)");
            Ok(OutputOutcome::Removed {
                path: path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No matches and no previous output");
            Ok(OutputOutcome::Untouched)
        }
        Err(source) => Err(PersistenceError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── Tests ──
