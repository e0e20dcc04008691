use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, params};
use tracing::info;

use super::{Catalog, CatalogEntry, NewCatalogEntry};
use crate::error::CatalogError;

/// SQLite-backed catalog.
///
/// A single connection behind a mutex gives single-writer semantics.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open (or create) the catalog database at `path`.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::CreateDirectoryFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path).map_err(|e| CatalogError::OpenFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory catalog (useful for testing).
    pub fn in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CatalogError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sounds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                display_name TEXT NOT NULL,
                local_path TEXT NOT NULL,
                added_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_sounds_local_path ON sounds(local_path);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogEntry> {
    let local_path: String = row.get(2)?;
    let added_at: String = row.get(3)?;
    let added_at = DateTime::parse_from_rfc3339(&added_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(CatalogEntry {
        id: row.get(0)?,
        display_name: row.get(1)?,
        local_path: PathBuf::from(local_path),
        added_at,
    })
}

impl Catalog for SqliteCatalog {
    fn insert_or_replace(&self, entry: &NewCatalogEntry) -> Result<CatalogEntry, CatalogError> {
        let conn = self.conn();
        let added_at = Utc::now();
        let local_path = entry.local_path.to_string_lossy().into_owned();

        conn.execute(
            "INSERT OR REPLACE INTO sounds (display_name, local_path, added_at) VALUES (?1, ?2, ?3)",
            params![entry.display_name, local_path, added_at.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();

        info!(id, name = %entry.display_name, path = %local_path, "Cataloged sound");

        Ok(CatalogEntry {
            id,
            display_name: entry.display_name.clone(),
            local_path: entry.local_path.clone(),
            added_at,
        })
    }

    fn list_all(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, display_name, local_path, added_at FROM sounds ORDER BY id")?;
        let rows = stmt.query_map([], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn delete_by_id(&self, id: i64) -> Result<(), CatalogError> {
        let removed = self
            .conn()
            .execute("DELETE FROM sounds WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(CatalogError::NotFound(id));
        }
        info!(id, "Removed catalog entry");
        Ok(())
    }

    fn delete_all(&self) -> Result<usize, CatalogError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM sounds", [])?;
        tx.execute("DELETE FROM sqlite_sequence WHERE name = 'sounds'", [])?;
        tx.commit()?;

        info!(removed, "Cleared catalog");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn insert_then_list_contains_entry_once() {
        let catalog = SqliteCatalog::in_memory().unwrap();
        let stored = catalog
            .insert_or_replace(&NewCatalogEntry::new("Rain.ogg", "/sounds/Rain.ogg"))
            .unwrap();

        let entries = catalog.list_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, stored.id);
        assert_eq!(entries[0].display_name, "Rain.ogg");
        assert_eq!(entries[0].local_path, PathBuf::from("/sounds/Rain.ogg"));
    }

    #[test]
    fn corrupt_timestamp_fails_listing() {
        let catalog = SqliteCatalog::in_memory().unwrap();
        catalog
            .conn()
            .execute(
                "INSERT INTO sounds (display_name, local_path, added_at) VALUES (?1, ?2, ?3)",
                params!["Rain.ogg", "/sounds/Rain.ogg", "yesterday-ish"],
            )
            .unwrap();

        let err = catalog.list_all().unwrap_err();
        assert!(matches!(err, CatalogError::Database(_)), "got {err:?}");
    }

    #[test]
    fn delete_by_id_removes_entry() {
        let catalog = SqliteCatalog::in_memory().unwrap();
        let rain = catalog
            .insert_or_replace(&NewCatalogEntry::new("Rain.ogg", "/sounds/Rain.ogg"))
            .unwrap();
        catalog
            .insert_or_replace(&NewCatalogEntry::new("Wind.wav", "/sounds/Wind.wav"))
            .unwrap();

        catalog.delete_by_id(rain.id).unwrap();

        let entries = catalog.list_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.iter().all(|e| e.id != rain.id));
    }

    #[test]
    fn delete_unknown_id_is_not_found() {
        let catalog = SqliteCatalog::in_memory().unwrap();
        assert!(matches!(
            catalog.delete_by_id(99),
            Err(CatalogError::NotFound(99))
        ));
    }

    #[test]
    fn same_path_replaces_previous_row() {
        let catalog = SqliteCatalog::in_memory().unwrap();
        catalog
            .insert_or_replace(&NewCatalogEntry::new("Old name", "/sounds/a.ogg"))
            .unwrap();
        let replacement = catalog
            .insert_or_replace(&NewCatalogEntry::new("New name", "/sounds/a.ogg"))
            .unwrap();

        let entries = catalog.list_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, replacement.id);
        assert_eq!(entries[0].display_name, "New name");
    }

    #[test]
    fn delete_all_resets_ids() {
        let catalog = SqliteCatalog::in_memory().unwrap();
        catalog
            .insert_or_replace(&NewCatalogEntry::new("a", "/a.ogg"))
            .unwrap();
        catalog
            .insert_or_replace(&NewCatalogEntry::new("b", "/b.ogg"))
            .unwrap();

        assert_eq!(catalog.delete_all().unwrap(), 2);
        assert!(catalog.list_all().unwrap().is_empty());

        let fresh = catalog
            .insert_or_replace(&NewCatalogEntry::new("c", "/c.ogg"))
            .unwrap();
        assert_eq!(fresh.id, 1);
    }

    #[test]
    fn concurrent_inserts_keep_paths_unique() {
        let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let catalog = Arc::clone(&catalog);
                std::thread::spawn(move || {
                    let path = format!("/sounds/{}.ogg", i % 2);
                    catalog
                        .insert_or_replace(&NewCatalogEntry::new(format!("n{i}"), path))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entries = catalog.list_all().unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn open_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");

        {
            let catalog = SqliteCatalog::open(&path).unwrap();
            catalog
                .insert_or_replace(&NewCatalogEntry::new("Rain.ogg", "/sounds/Rain.ogg"))
                .unwrap();
        }

        let reopened = SqliteCatalog::open(&path).unwrap();
        let entries = reopened.list_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "Rain.ogg");
    }
}
