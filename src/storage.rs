use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::catalog::CatalogEntry;
use crate::error::StorageError;
use crate::fetch::PARTIAL_SUFFIX;

/// State of the storage root after a scan
#[derive(Debug, Clone)]
pub struct StorageState {
    /// The storage directory path
    pub root_dir: PathBuf,
    /// Number of files found (excluding partials)
    pub file_count: usize,
    /// Number of partial files that were cleaned up during scan
    pub partial_files_cleaned: usize,
}

/// Prepare the storage root for use.
///
/// Creates the directory if it doesn't exist and removes `.partial` files
/// left behind by interrupted downloads.
pub fn scan_storage_root(root_dir: &Path) -> Result<StorageState, StorageError> {
    let mut file_count = 0;
    let mut partial_files_cleaned = 0;

    if !root_dir.exists() {
        std::fs::create_dir_all(root_dir).map_err(|e| StorageError::CreateDirectoryFailed {
            path: root_dir.to_path_buf(),
            source: e,
        })?;

        return Ok(StorageState {
            root_dir: root_dir.to_path_buf(),
            file_count,
            partial_files_cleaned,
        });
    }

    let entries = std::fs::read_dir(root_dir).map_err(|e| StorageError::ReadDirectoryFailed {
        path: root_dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::ReadDirectoryFailed {
            path: root_dir.to_path_buf(),
            source: e,
        })?;
        files.push(entry.path());
    }

    let (partials, others): (Vec<_>, Vec<_>) = files.into_iter().partition(|path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX))
    });

    let mut placeholders = Vec::new();
    for path in &partials {
        match std::fs::remove_file(path) {
            Ok(()) => partial_files_cleaned += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial file"),
        }
        if let Some(target) = reserved_target(path)
            && remove_empty_placeholder(&target)
        {
            placeholders.push(target);
        }
    }

    file_count += others
        .iter()
        .filter(|path| path.is_file() && !placeholders.contains(path))
        .count();

    debug!(
        root = %root_dir.display(),
        file_count,
        partial_files_cleaned,
        "Scanned storage root"
    );

    Ok(StorageState {
        root_dir: root_dir.to_path_buf(),
        file_count,
        partial_files_cleaned,
    })
}

/// The final name a `.partial` download was reserved under
fn reserved_target(partial: &Path) -> Option<PathBuf> {
    let name = partial.file_name()?.to_str()?;
    let stem = name.strip_suffix(PARTIAL_SUFFIX)?;
    (!stem.is_empty()).then(|| partial.with_file_name(stem))
}

/// Remove the zero-length file a download reserved before it was interrupted
fn remove_empty_placeholder(target: &Path) -> bool {
    let is_empty = std::fs::metadata(target).is_ok_and(|m| m.is_file() && m.len() == 0);
    if !is_empty {
        return false;
    }
    match std::fs::remove_file(target) {
        Ok(()) => {
            debug!(path = %target.display(), "Removed empty placeholder");
            true
        }
        Err(e) => {
            warn!(path = %target.display(), error = %e, "Failed to remove placeholder");
            false
        }
    }
}

/// Catalog entries whose files no longer exist on disk
pub fn missing_files(entries: &[CatalogEntry]) -> Vec<&CatalogEntry> {
    entries
        .iter()
        .filter(|entry| !entry.local_path.exists())
        .collect()
}
