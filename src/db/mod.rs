// src/db/mod.rs

//! Database layer for uncov
//!
//! This module owns the SQLite connection and provides:
//! - Database opening with the pragmas uncov relies on
//! - Schema creation and migration (see [`schema`])
//! - The coverage blob codec (see [`blob`])
//! - Transaction handling for atomic build inserts

pub mod blob;
pub mod schema;

use crate::error::Result;
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use tracing::debug;

/// Owner of the database connection.
///
/// One `Db` per repository; the connection is never shared. Opening creates
/// the file if needed and migrates the schema to the current version.
pub struct Db {
    conn: Connection,
}

impl Db {
    /// Opens (creating if necessary) the database at `path` and migrates its
    /// schema.
    ///
    /// Fails if the on-disk schema version is newer than this binary
    /// supports.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Db> {
        debug!("Opening database at: {}", path.as_ref().display());

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        let mut db = Db { conn };
        schema::migrate(&mut db)?;
        Ok(db)
    }

    /// Opens an in-memory database, migrated to the current schema.
    ///
    /// Used by tests that don't need persistence.
    pub fn open_in_memory() -> Result<Db> {
        let conn = Connection::open_in_memory()?;
        let mut db = Db { conn };
        schema::migrate(&mut db)?;
        Ok(db)
    }

    /// Direct access to the connection for queries.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Id of the most recent insert on this connection.
    pub fn last_row_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Starts a write transaction.
    ///
    /// The returned guard rolls back on drop; `commit` consumes it, so a
    /// transaction cannot be committed twice.
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("uncov.sqlite");

        let result = Db::open(&db_path);
        assert!(result.is_ok());
        assert!(db_path.exists());
    }

    #[test]
    fn test_open_existing_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("uncov.sqlite");

        Db::open(&db_path).unwrap();

        let result = Db::open(&db_path);
        assert!(result.is_ok());
    }

    #[test]
    fn test_transaction_rolls_back_on_drop() {
        let mut db = Db::open_in_memory().unwrap();

        {
            let tx = db.transaction().unwrap();
            tx.execute(
                "INSERT INTO builds (vcsref, vcsrefname, covered, missed) \
                 VALUES ('deadbeef', 'master', 1, 1)",
                [],
            )
            .unwrap();
            // No commit: the guard must roll back.
        }

        let count: i64 = db
            .conn()
            .query_row("SELECT count(*) FROM builds", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_transaction_commit_persists() {
        let mut db = Db::open_in_memory().unwrap();

        let tx = db.transaction().unwrap();
        tx.execute(
            "INSERT INTO builds (vcsref, vcsrefname, covered, missed) \
             VALUES ('deadbeef', 'master', 1, 1)",
            [],
        )
        .unwrap();
        tx.commit().unwrap();

        let count: i64 = db
            .conn()
            .query_row("SELECT count(*) FROM builds", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
