//! SQLite-backed store of experiment runs.
//!
//! Only the parts of the run table that the schema upgrades touch are exposed:
//! the run id and its JSON description. The schema version lives in SQLite's
//! `PRAGMA user_version`.

use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::{AppResult, DaqError};

/// Store of numbered experiment runs.
pub struct RunRegistry {
    conn: Connection,
}

impl RunRegistry {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!("Opened run registry at {}", path.as_ref().display());
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> AppResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create the `runs` table if it does not exist.
    pub fn create_schema(&self) -> AppResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS runs (
                run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_description TEXT
            );",
        )?;
        Ok(())
    }

    /// Insert a run and return its id.
    pub fn add_run(&self, description: Option<&str>) -> AppResult<i64> {
        self.conn.execute(
            "INSERT INTO runs (run_description) VALUES (?1)",
            params![description],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Highest run id, 0 when the store is empty.
    pub fn max_run_id(&self) -> AppResult<i64> {
        let max: Option<i64> = self
            .conn
            .query_row("SELECT max(run_id) FROM runs", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }

    /// Raw description of a run. `None` when the column is NULL.
    ///
    /// A missing row is an error.
    pub fn get_description(&self, run_id: i64) -> AppResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT run_description FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .ok_or(DaqError::Storage(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Overwrite the description of an existing run.
    pub fn set_description(&self, run_id: i64, description: &str) -> AppResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET run_description = ?1 WHERE run_id = ?2",
            params![description, run_id],
        )?;
        if updated == 0 {
            return Err(DaqError::Storage(rusqlite::Error::QueryReturnedNoRows));
        }
        Ok(())
    }

    /// Current schema version (`PRAGMA user_version`).
    pub fn schema_version(&self) -> AppResult<i64> {
        Ok(self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?)
    }

    /// Set the schema version.
    pub fn set_schema_version(&self, version: i64) -> AppResult<()> {
        self.conn.pragma_update(None, "user_version", version)?;
        Ok(())
    }

    /// Run `f` as one unit of work.
    ///
    /// Commits when `f` returns `Ok`, rolls back every write made inside it when
    /// `f` returns `Err`. Calls nested inside an open transaction join it.
    pub fn atomic<T>(&self, f: impl FnOnce(&Self) -> AppResult<T>) -> AppResult<T> {
        if !self.conn.is_autocommit() {
            return f(self);
        }

        let tx = self.conn.unchecked_transaction()?;
        match f(self) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                debug!("Rolling back transaction: {}", e);
                tx.rollback()?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RunRegistry {
        let registry = RunRegistry::open_in_memory().unwrap();
        registry.create_schema().unwrap();
        registry
    }

    #[test]
    fn test_empty_store_has_max_run_id_zero() {
        assert_eq!(registry().max_run_id().unwrap(), 0);
    }

    #[test]
    fn test_run_ids_are_contiguous() {
        let registry = registry();
        assert_eq!(registry.add_run(Some("{}")).unwrap(), 1);
        assert_eq!(registry.add_run(None).unwrap(), 2);
        assert_eq!(registry.max_run_id().unwrap(), 2);
        assert_eq!(registry.get_description(1).unwrap().as_deref(), Some("{}"));
        assert_eq!(registry.get_description(2).unwrap(), None);
    }

    #[test]
    fn test_missing_run_is_an_error() {
        let registry = registry();
        assert!(registry.get_description(7).is_err());
        assert!(registry.set_description(7, "{}").is_err());
    }

    #[test]
    fn test_atomic_rolls_back_on_error() {
        let registry = registry();
        registry.add_run(Some("before")).unwrap();

        let result: AppResult<()> = registry.atomic(|r| {
            r.set_description(1, "after")?;
            Err(DaqError::MalformedDocument("forced".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(
            registry.get_description(1).unwrap().as_deref(),
            Some("before")
        );
    }

    #[test]
    fn test_atomic_commits_on_success() {
        let registry = registry();
        registry.add_run(Some("before")).unwrap();
        registry
            .atomic(|r| r.set_description(1, "after"))
            .unwrap();
        assert_eq!(registry.get_description(1).unwrap().as_deref(), Some("after"));
    }

    #[test]
    fn test_schema_version_roundtrip() {
        let registry = registry();
        assert_eq!(registry.schema_version().unwrap(), 0);
        registry.set_schema_version(5).unwrap();
        assert_eq!(registry.schema_version().unwrap(), 5);
    }
}
