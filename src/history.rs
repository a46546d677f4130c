// src/history.rs

//! Build history: the domain API over the database
//!
//! A *build* is one recorded coverage snapshot tied to a git ref. Each build
//! references a set of content-addressed file records; identical records are
//! shared between builds. [`BuildHistory`] runs the queries, [`Build`]
//! hydrates its path map and file records lazily through the [`DataLoader`]
//! capability that `BuildHistory` implements.

use crate::db::{blob, Db};
use crate::error::{Error, Result};
use rusqlite::{params, types::ValueRef, OptionalExtension};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::debug;

/// Canonical per-file coverage record.
///
/// `coverage` has one entry per source line: `-1` not relevant, `0` missed,
/// `>= 1` hit count. Counts are derived once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: String,
    hash: String,
    coverage: Vec<i64>,
    covered_count: i64,
    missed_count: i64,
}

impl File {
    pub fn new(path: String, hash: String, coverage: Vec<i64>) -> Self {
        let mut covered_count = 0;
        let mut missed_count = 0;
        for &hits in &coverage {
            if hits == 0 {
                missed_count += 1;
            } else if hits > 0 {
                covered_count += 1;
            }
        }
        Self {
            path,
            hash,
            coverage,
            covered_count,
            missed_count,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn coverage(&self) -> &[i64] {
        &self.coverage
    }

    pub fn covered_count(&self) -> i64 {
        self.covered_count
    }

    pub fn missed_count(&self) -> i64 {
        self.missed_count
    }
}

/// A build being assembled before it is persisted.
///
/// Paths are unique within a build: adding a duplicate path replaces the
/// previous record.
#[derive(Debug)]
pub struct BuildData {
    vcs_ref: String,
    ref_name: String,
    files: BTreeMap<String, File>,
}

impl BuildData {
    pub fn new(vcs_ref: String, ref_name: String) -> Self {
        Self {
            vcs_ref,
            ref_name,
            files: BTreeMap::new(),
        }
    }

    pub fn add_file(&mut self, file: File) {
        self.files.insert(file.path().to_string(), file);
    }

    pub fn vcs_ref(&self) -> &str {
        &self.vcs_ref
    }

    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }
}

/// Capability for lazy hydration of build contents.
///
/// Implemented by [`BuildHistory`]; a [`Build`] keeps a borrowed reference
/// to it for its whole lifetime.
pub trait DataLoader {
    /// Maps each path of a build to its file record id.
    fn load_paths(&self, build_id: i64) -> Result<BTreeMap<String, i64>>;

    /// Loads one file record.
    fn load_file(&self, file_id: i64) -> Result<Option<File>>;
}

/// A persisted build.
///
/// Aggregate counters are stored denormalized in the `builds` row; the path
/// map and individual file records are fetched on first use and cached.
pub struct Build<'a> {
    id: i64,
    vcs_ref: String,
    ref_name: String,
    covered_count: i64,
    missed_count: i64,
    timestamp: i64,
    loader: &'a dyn DataLoader,
    path_map: RefCell<Option<BTreeMap<String, i64>>>,
    files: RefCell<HashMap<String, Rc<File>>>,
}

impl<'a> Build<'a> {
    fn new(
        id: i64,
        vcs_ref: String,
        ref_name: String,
        covered_count: i64,
        missed_count: i64,
        timestamp: i64,
        loader: &'a dyn DataLoader,
    ) -> Self {
        Self {
            id,
            vcs_ref,
            ref_name,
            covered_count,
            missed_count,
            timestamp,
            loader,
            path_map: RefCell::new(None),
            files: RefCell::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn vcs_ref(&self) -> &str {
        &self.vcs_ref
    }

    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    pub fn covered_count(&self) -> i64 {
        self.covered_count
    }

    pub fn missed_count(&self) -> i64 {
        self.missed_count
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn ensure_path_map(&self) -> Result<()> {
        if self.path_map.borrow().is_none() {
            let map = self.loader.load_paths(self.id)?;
            *self.path_map.borrow_mut() = Some(map);
        }
        Ok(())
    }

    /// Paths of all files in this build, in sorted order.
    pub fn paths(&self) -> Result<Vec<String>> {
        self.ensure_path_map()?;
        Ok(self
            .path_map
            .borrow()
            .as_ref()
            .expect("path map was just loaded")
            .keys()
            .cloned()
            .collect())
    }

    /// Looks up a file of this build by path.
    ///
    /// Returns `None` for paths the build doesn't contain. Loaded records
    /// are cached for repeated access.
    pub fn file(&self, path: &str) -> Result<Option<Rc<File>>> {
        if let Some(file) = self.files.borrow().get(path) {
            return Ok(Some(Rc::clone(file)));
        }

        self.ensure_path_map()?;
        let file_id = match self
            .path_map
            .borrow()
            .as_ref()
            .expect("path map was just loaded")
            .get(path)
        {
            Some(&id) => id,
            None => return Ok(None),
        };

        match self.loader.load_file(file_id)? {
            Some(file) => {
                let file = Rc::new(file);
                self.files
                    .borrow_mut()
                    .insert(path.to_string(), Rc::clone(&file));
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }
}

/// Domain-level queries over the store.
pub struct BuildHistory<'a> {
    db: &'a mut Db,
}

const BUILD_COLUMNS: &str = "buildid, vcsref, vcsrefname, covered, missed, timestamp";

impl<'a> BuildHistory<'a> {
    pub fn new(db: &'a mut Db) -> Self {
        Self { db }
    }

    /// Atomically persists a build and returns it.
    ///
    /// Either the `builds` row, all referenced `files` rows and all
    /// `filemap` rows become visible together, or none do.
    pub fn add_build(&mut self, build_data: &BuildData) -> Result<Build<'_>> {
        let build_id = self.persist(build_data)?;
        self.build(build_id)?
            .ok_or_else(|| Error::not_found(format!("Can't find build #{build_id}")))
    }

    fn persist(&mut self, bd: &BuildData) -> Result<i64> {
        let covered: i64 = bd.files.values().map(File::covered_count).sum();
        let missed: i64 = bd.files.values().map(File::missed_count).sum();

        let tx = self.db.transaction()?;

        tx.execute(
            "INSERT INTO builds (vcsref, vcsrefname, covered, missed) \
             VALUES (?1, ?2, ?3, ?4)",
            params![bd.vcs_ref, bd.ref_name, covered, missed],
        )?;
        let build_id = tx.last_insert_rowid();

        for file in bd.files.values() {
            let cov_hash = blob::hash_coverage(file.coverage());

            let file_id: Option<i64> = tx
                .query_row(
                    "SELECT fileid FROM files \
                     WHERE path = ?1 AND hash = ?2 AND covhash = ?3",
                    params![file.path(), file.hash(), cov_hash],
                    |row| row.get(0),
                )
                .optional()?;

            let file_id = match file_id {
                Some(id) => id,
                None => {
                    tx.execute(
                        "INSERT INTO files (path, hash, covhash, coverage) \
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            file.path(),
                            file.hash(),
                            cov_hash,
                            blob::encode(file.coverage())?
                        ],
                    )?;
                    tx.last_insert_rowid()
                }
            };

            tx.execute(
                "INSERT INTO filemap (buildid, fileid) VALUES (?1, ?2)",
                params![build_id, file_id],
            )?;
        }

        tx.commit()?;

        debug!("Recorded build #{build_id} on {}", bd.ref_name);
        Ok(build_id)
    }

    /// Id of the most recent build, or 0 if there are none.
    pub fn last_build_id(&self) -> Result<i64> {
        let id = self
            .db
            .conn()
            .query_row(
                "SELECT buildid FROM builds ORDER BY buildid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.unwrap_or(0))
    }

    /// Build id at offset `n` back from the latest, or 0 when out of range.
    pub fn nth_to_last_build_id(&self, n: i64) -> Result<i64> {
        let id = self
            .db
            .conn()
            .query_row(
                "SELECT buildid FROM builds ORDER BY buildid DESC LIMIT 1 OFFSET ?1",
                params![n],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.unwrap_or(0))
    }

    /// Id of the build preceding `id`.
    // TODO: try looking for closest build in terms of commits.
    pub fn previous_build_id(&self, id: i64) -> i64 {
        id - 1
    }

    pub fn build(&self, id: i64) -> Result<Option<Build<'_>>> {
        let row = self
            .db
            .conn()
            .query_row(
                "SELECT vcsref, vcsrefname, covered, missed, timestamp \
                 FROM builds WHERE buildid = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(vcs_ref, ref_name, covered, missed, timestamp)| {
            Build::new(id, vcs_ref, ref_name, covered, missed, timestamp, self)
        }))
    }

    pub fn builds(&self) -> Result<Vec<Build<'_>>> {
        self.list_builds(&format!("SELECT {BUILD_COLUMNS} FROM builds"), params![])
    }

    pub fn builds_on(&self, ref_name: &str) -> Result<Vec<Build<'_>>> {
        self.list_builds(
            &format!("SELECT {BUILD_COLUMNS} FROM builds WHERE vcsrefname = ?1"),
            params![ref_name],
        )
    }

    fn list_builds(
        &self,
        query: &str,
        binds: &[&dyn rusqlite::types::ToSql],
    ) -> Result<Vec<Build<'_>>> {
        let mut stmt = self.db.conn().prepare(query)?;
        let rows = stmt.query_map(binds, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut builds = Vec::new();
        for row in rows {
            let (id, vcs_ref, ref_name, covered, missed, timestamp) = row?;
            builds.push(Build::new(
                id, vcs_ref, ref_name, covered, missed, timestamp, self,
            ));
        }
        Ok(builds)
    }
}

impl DataLoader for BuildHistory<'_> {
    fn load_paths(&self, build_id: i64) -> Result<BTreeMap<String, i64>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT path, fileid FROM files NATURAL JOIN filemap \
             WHERE buildid = ?1",
        )?;
        let rows = stmt.query_map(params![build_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut paths = BTreeMap::new();
        for row in rows {
            let (path, file_id) = row?;
            paths.insert(path, file_id);
        }
        Ok(paths)
    }

    fn load_file(&self, file_id: i64) -> Result<Option<File>> {
        let row = self
            .db
            .conn()
            .query_row(
                "SELECT path, hash, coverage FROM files WHERE fileid = ?1",
                params![file_id],
                |row| {
                    // The coverage column must be a real blob; anything else
                    // means the row was written by something foreign.
                    let coverage = match row.get_ref(2)? {
                        ValueRef::Blob(bytes) => bytes.to_vec(),
                        other => {
                            return Err(rusqlite::Error::InvalidColumnType(
                                2,
                                "coverage".into(),
                                other.data_type(),
                            ))
                        }
                    };
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        coverage,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((path, hash, coverage_blob)) => {
                let coverage = blob::decode(&coverage_blob)?;
                Ok(Some(File::new(path, hash, coverage)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_build() -> BuildData {
        let mut bd = BuildData::new("8f7a3c1".to_string(), "master".to_string());
        bd.add_file(File::new(
            "src/lib.rs".to_string(),
            "aaaa".to_string(),
            vec![-1, 1, -1, 1, -1],
        ));
        bd.add_file(File::new(
            "src/util.rs".to_string(),
            "bbbb".to_string(),
            vec![0, 0, 5],
        ));
        bd
    }

    #[test]
    fn test_file_counts() {
        let file = File::new("a".into(), "h".into(), vec![-1, 0, 1, 2, 0]);
        assert_eq!(file.covered_count(), 2);
        assert_eq!(file.missed_count(), 3);
    }

    #[test]
    fn test_add_build_aggregates_counts() {
        let mut db = Db::open_in_memory().unwrap();
        let mut bh = BuildHistory::new(&mut db);

        let build = bh.add_build(&sample_build()).unwrap();
        assert_eq!(build.id(), 1);
        assert_eq!(build.covered_count(), 3);
        assert_eq!(build.missed_count(), 2);
        assert_eq!(build.ref_name(), "master");
    }

    #[test]
    fn test_build_roundtrip_preserves_file() {
        let mut db = Db::open_in_memory().unwrap();
        let mut bh = BuildHistory::new(&mut db);
        bh.add_build(&sample_build()).unwrap();

        let build = bh.build(1).unwrap().unwrap();
        let file = build.file("src/lib.rs").unwrap().unwrap();
        assert_eq!(file.coverage(), &[-1, 1, -1, 1, -1]);
        assert_eq!(file.hash(), "aaaa");
        assert_eq!(file.path(), "src/lib.rs");

        assert!(build.file("no-such-file.rs").unwrap().is_none());
    }

    #[test]
    fn test_identical_files_are_shared() {
        let mut db = Db::open_in_memory().unwrap();
        let mut bh = BuildHistory::new(&mut db);

        bh.add_build(&sample_build()).unwrap();
        bh.add_build(&sample_build()).unwrap();

        let file_rows: i64 = bh
            .db
            .conn()
            .query_row("SELECT count(*) FROM files", [], |row| row.get(0))
            .unwrap();
        let map_rows: i64 = bh
            .db
            .conn()
            .query_row("SELECT count(*) FROM filemap", [], |row| row.get(0))
            .unwrap();
        assert_eq!(file_rows, 2);
        assert_eq!(map_rows, 4);
    }

    #[test]
    fn test_same_path_and_hash_different_coverage_stay_distinct() {
        let mut db = Db::open_in_memory().unwrap();
        let mut bh = BuildHistory::new(&mut db);

        let mut first = BuildData::new("r1".into(), "master".into());
        first.add_file(File::new("a.rs".into(), "hash".into(), vec![1, 0]));
        bh.add_build(&first).unwrap();

        let mut second = BuildData::new("r2".into(), "master".into());
        second.add_file(File::new("a.rs".into(), "hash".into(), vec![1, 1]));
        bh.add_build(&second).unwrap();

        let file_rows: i64 = bh
            .db
            .conn()
            .query_row("SELECT count(*) FROM files", [], |row| row.get(0))
            .unwrap();
        assert_eq!(file_rows, 2);
    }

    #[test]
    fn test_navigation_boundaries() {
        let mut db = Db::open_in_memory().unwrap();
        let mut bh = BuildHistory::new(&mut db);

        assert_eq!(bh.last_build_id().unwrap(), 0);
        assert_eq!(bh.nth_to_last_build_id(0).unwrap(), 0);

        bh.add_build(&sample_build()).unwrap();
        bh.add_build(&sample_build()).unwrap();

        assert_eq!(bh.last_build_id().unwrap(), 2);
        assert_eq!(bh.nth_to_last_build_id(1).unwrap(), 1);
        assert_eq!(bh.nth_to_last_build_id(5).unwrap(), 0);
        assert_eq!(bh.previous_build_id(1), 0);
    }

    #[test]
    fn test_builds_on_unknown_ref_is_empty() {
        let mut db = Db::open_in_memory().unwrap();
        let mut bh = BuildHistory::new(&mut db);
        bh.add_build(&sample_build()).unwrap();

        assert!(bh.builds_on(":wrong").unwrap().is_empty());
        assert_eq!(bh.builds_on("master").unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_path_replaces_record() {
        let mut bd = BuildData::new("r".into(), "master".into());
        bd.add_file(File::new("a.rs".into(), "h1".into(), vec![0]));
        bd.add_file(File::new("a.rs".into(), "h2".into(), vec![1]));
        assert_eq!(bd.files.len(), 1);
        assert_eq!(bd.files["a.rs"].hash(), "h2");
    }
}
