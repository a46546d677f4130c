// src/lib.rs

//! uncov — per-repository code coverage database
//!
//! uncov ingests per-line hit counts produced by external coverage tools,
//! associates each ingest with a git commit and persists the result as a
//! *build*. Builds can then be listed, inspected, diffed and checked for
//! coverage regressions.
//!
//! # Architecture
//!
//! - Database-first: all builds live in one SQLite file next to `.git`
//! - Content-addressed file records: `(path, content hash, coverage hash)`
//!   identifies a row, so unchanged files are stored once
//! - Append-only builds: ingests are atomic, nothing is rewritten
//! - Lazy hydration: build objects load their path map and file records on
//!   first use through the [`history::DataLoader`] capability

pub mod cmds;
pub mod compare;
pub mod coverage;
pub mod db;
mod error;
pub mod fileview;
pub mod fsutil;
pub mod gcov;
pub mod history;
pub mod invocation;
pub mod listings;
pub mod printing;
pub mod repo;
pub mod settings;
pub mod table;

pub use error::{Error, Result};
