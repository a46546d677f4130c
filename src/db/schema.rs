// src/db/schema.rs

//! Database schema definitions and migrations for uncov
//!
//! The schema version lives in SQLite's `user_version` pragma. Migrations
//! fall through: a fresh database (version 0) gets every step up to the
//! current version inside a single transaction, then the file is compacted.

use crate::error::{Error, Result};
use tracing::{debug, info};

use super::Db;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Reads the schema version of the opened database.
pub fn get_schema_version(db: &Db) -> Result<i32> {
    let version = db
        .conn()
        .query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Brings the database up to [`SCHEMA_VERSION`].
///
/// No-op when already current; fails when the database was written by a
/// newer binary. The whole update happens in one transaction and is followed
/// by a `VACUUM` to defragment the file.
pub fn migrate(db: &mut Db) -> Result<()> {
    let current_version = get_schema_version(db)?;

    if current_version > SCHEMA_VERSION {
        return Err(Error::SchemaTooNew {
            supported: SCHEMA_VERSION,
            found: current_version,
        });
    }

    if current_version == SCHEMA_VERSION {
        debug!("Schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!(
        "Migrating schema from version {} to {}",
        current_version, SCHEMA_VERSION
    );

    let tx = db.transaction()?;

    // Fall-through: starting from version N applies every later step.
    if current_version < 1 {
        migrate_v1(&tx)?;
    }
    if current_version < 2 {
        migrate_v2(&tx)?;
    }

    tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
    tx.commit()?;

    // Compact the database after migration by defragmenting it.
    db.conn().execute_batch("VACUUM")?;

    info!("Schema migration complete. Now at version {}", SCHEMA_VERSION);
    Ok(())
}

/// Initial schema - Version 1
///
/// Creates the three core tables:
/// - builds: one row per recorded coverage snapshot
/// - files: content-addressed per-file coverage records
/// - filemap: which files belong to which build
fn migrate_v1(conn: &rusqlite::Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE builds (
            buildid INTEGER,
            vcsref TEXT NOT NULL,
            vcsrefname TEXT NOT NULL,
            covered INTEGER NOT NULL,
            missed INTEGER NOT NULL,
            timestamp INTEGER NOT NULL
                      DEFAULT (CAST(strftime('%s', 'now') AS INT)),

            PRIMARY KEY (buildid)
        );

        CREATE TABLE files (
            fileid INTEGER,
            path TEXT NOT NULL,
            hash TEXT NOT NULL,
            covhash TEXT NOT NULL,
            coverage BLOB NOT NULL,

            PRIMARY KEY (fileid)
        );

        CREATE TABLE filemap (
            buildid INTEGER,
            fileid INTEGER,

            FOREIGN KEY (buildid) REFERENCES builds(buildid),
            FOREIGN KEY (fileid) REFERENCES files(fileid)
        );
        ",
    )?;

    Ok(())
}

/// Schema Version 2: index for content-addressed file lookups
fn migrate_v2(conn: &rusqlite::Connection) -> Result<()> {
    debug!("Migrating to schema version 2");

    conn.execute_batch("CREATE INDEX files_idx ON files(path, hash, covhash)")?;

    Ok(())
}
