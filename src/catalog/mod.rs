//! Catalog of locally available sound files.
//!
//! Every downloaded, recorded or merged file gets one entry. Entries are
//! keyed by their local path: inserting a second entry for the same path
//! replaces the first.

mod sqlite;

pub use sqlite::SqliteCatalog;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CatalogError;

/// A stored catalog row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub display_name: String,
    pub local_path: PathBuf,
    pub added_at: DateTime<Utc>,
}

/// An entry that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCatalogEntry {
    pub display_name: String,
    pub local_path: PathBuf,
}

impl NewCatalogEntry {
    pub fn new(display_name: impl Into<String>, local_path: impl AsRef<Path>) -> Self {
        Self {
            display_name: display_name.into(),
            local_path: local_path.as_ref().to_path_buf(),
        }
    }

    /// Entry named after the file itself, as used for recordings and merges
    pub fn for_file(local_path: impl AsRef<Path>) -> Self {
        let local_path = local_path.as_ref();
        let display_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| local_path.display().to_string());
        Self::new(display_name, local_path)
    }
}

/// Storage for catalog entries.
///
/// Implementations serialize writes so the unique-path invariant holds
/// when several downloads finish at once.
pub trait Catalog: Send + Sync {
    /// Store an entry, replacing any existing entry with the same path.
    fn insert_or_replace(&self, entry: &NewCatalogEntry) -> Result<CatalogEntry, CatalogError>;

    /// All entries, in no particular order.
    fn list_all(&self) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Remove one entry. Fails with [`CatalogError::NotFound`] for unknown ids.
    fn delete_by_id(&self, id: i64) -> Result<(), CatalogError>;

    /// Remove every entry and restart id assignment. Returns the number removed.
    fn delete_all(&self) -> Result<usize, CatalogError>;
}
