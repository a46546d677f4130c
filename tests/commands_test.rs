// tests/commands_test.rs

//! End-to-end tests over real temporary git repositories
//!
//! Builds are ingested through the same command bodies the CLI runs and
//! read back through the query commands and listings.

use std::fs;
use tempfile::TempDir;

use uncov::cmds::importing::{NewCmd, NewJsonCmd};
use uncov::cmds::showing::GetCmd;
use uncov::cmds::CommandContext;
use uncov::db::blob::hash_bytes;
use uncov::db::Db;
use uncov::history::BuildHistory;
use uncov::listings::describe_build;
use uncov::repo::Repository;
use uncov::settings::Settings;

const TEST_FILE: &str = "test-file1.cpp";
const TEST_FILE_CONTENTS: &str = "int f()\n{\n    int x = 0;\n    return x;\n}\n";

/// Creates a git repository with one committed five-line source file.
fn make_test_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let repo = git2::Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join(TEST_FILE), TEST_FILE_CONTENTS).unwrap();

    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let signature = git2::Signature::now("test", "test@example.com").unwrap();
    repo.commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])
        .unwrap();

    dir
}

fn ingest(repo: &Repository, db: &mut Db, coverage: &str) {
    let head = repo.resolve_ref("HEAD").unwrap();
    let hash = hash_bytes(TEST_FILE_CONTENTS.as_bytes());
    let input = format!("{head}\nmaster\n{TEST_FILE} {hash}\n5\n{coverage}\n");

    let settings = Settings::default();
    let mut bh = BuildHistory::new(db);
    let mut ctx = CommandContext {
        settings: &settings,
        bh: &mut bh,
        repo,
    };

    let mut out = Vec::new();
    NewCmd
        .run(&mut ctx, &mut input.as_bytes(), &mut out)
        .unwrap();

    let header = String::from_utf8(out).unwrap();
    assert!(header.starts_with("Build: #"), "unexpected header: {header}");
}

#[test]
fn builds_listing_after_three_ingests() {
    let dir = make_test_repo();
    let repo = Repository::discover(dir.path()).unwrap();
    let mut db = Db::open_in_memory().unwrap();

    // covered/missed: (2,2), (2,2), (2,0)
    ingest(&repo, &mut db, "1 1 0 0 -1");
    ingest(&repo, &mut db, "2 1 0 0 -1");
    ingest(&repo, &mut db, "1 1 -1 -1 -1");

    let bh = BuildHistory::new(&mut db);
    let builds = bh.builds().unwrap();
    assert_eq!(builds.len(), 3);

    let rows: Vec<Vec<String>> = builds
        .iter()
        .map(|build| describe_build(&bh, build, true, true, None).unwrap())
        .collect();

    assert_eq!(rows[0][0], "#1");
    assert_eq!(rows[1][0], "#2");
    assert_eq!(rows[2][0], "#3");
    assert_eq!(rows[0][1], "50.00%");
    assert_eq!(rows[1][1], "50.00%");
    assert_eq!(rows[2][1], "100.00%");
    assert_eq!(rows[2][3], "+50.0000%");
    for row in &rows {
        assert_eq!(row[5], "master");
    }
}

#[test]
fn get_prints_ref_and_coverage_of_latest_build() {
    let dir = make_test_repo();
    let repo = Repository::discover(dir.path()).unwrap();
    let mut db = Db::open_in_memory().unwrap();

    ingest(&repo, &mut db, "-1 1 -1 1 -1");

    let head = repo.resolve_ref("HEAD").unwrap();
    let settings = Settings::default();
    let mut bh = BuildHistory::new(&mut db);
    let mut ctx = CommandContext {
        settings: &settings,
        bh: &mut bh,
        repo: &repo,
    };

    let args = vec!["@@".to_string(), TEST_FILE.to_string()];
    let mut out = Vec::new();
    GetCmd.run(&mut ctx, "get", &args, &mut out).unwrap();

    let output = String::from_utf8(out).unwrap();
    assert_eq!(output, format!("{head}\n-1\n1\n-1\n1\n-1\n"));
}

#[test]
fn new_normalizes_reported_paths() {
    let dir = make_test_repo();
    let repo = Repository::discover(dir.path()).unwrap();
    let mut db = Db::open_in_memory().unwrap();

    let head = repo.resolve_ref("HEAD").unwrap();
    let hash = hash_bytes(TEST_FILE_CONTENTS.as_bytes());
    let input = format!("{head}\nmaster\n././{TEST_FILE} {hash}\n5\n-1 1 -1 1 -1\n");

    let settings = Settings::default();
    let mut bh = BuildHistory::new(&mut db);
    let mut ctx = CommandContext {
        settings: &settings,
        bh: &mut bh,
        repo: &repo,
    };
    let mut out = Vec::new();
    NewCmd
        .run(&mut ctx, &mut input.as_bytes(), &mut out)
        .unwrap();

    let build = bh.build(1).unwrap().unwrap();
    assert_eq!(build.paths().unwrap(), vec![TEST_FILE.to_string()]);
}

#[test]
fn new_rejects_hash_mismatch_without_persisting() {
    let dir = make_test_repo();
    let repo = Repository::discover(dir.path()).unwrap();
    let mut db = Db::open_in_memory().unwrap();

    let head = repo.resolve_ref("HEAD").unwrap();
    let input =
        format!("{head}\nmaster\n{TEST_FILE} 00000000000000000000000000000000\n1\n1\n");

    let settings = Settings::default();
    let mut bh = BuildHistory::new(&mut db);
    let mut ctx = CommandContext {
        settings: &settings,
        bh: &mut bh,
        repo: &repo,
    };
    let mut out = Vec::new();
    let result = NewCmd.run(&mut ctx, &mut input.as_bytes(), &mut out);

    assert!(result.is_err());
    assert_eq!(bh.last_build_id().unwrap(), 0);
}

#[test]
fn new_skips_files_unknown_to_the_ref() {
    let dir = make_test_repo();
    let repo = Repository::discover(dir.path()).unwrap();
    let mut db = Db::open_in_memory().unwrap();

    let head = repo.resolve_ref("HEAD").unwrap();
    let hash = hash_bytes(TEST_FILE_CONTENTS.as_bytes());
    let input = format!(
        "{head}\nmaster\nghost.cpp {hash}\n1\n1\n{TEST_FILE} {hash}\n5\n-1 1 -1 1 -1\n"
    );

    let settings = Settings::default();
    let mut bh = BuildHistory::new(&mut db);
    let mut ctx = CommandContext {
        settings: &settings,
        bh: &mut bh,
        repo: &repo,
    };
    let mut out = Vec::new();
    NewCmd
        .run(&mut ctx, &mut input.as_bytes(), &mut out)
        .unwrap();

    let build = bh.build(1).unwrap().unwrap();
    assert_eq!(build.paths().unwrap(), vec![TEST_FILE.to_string()]);
}

#[test]
fn new_json_accepts_prefixed_payload_and_null_entries() {
    let dir = make_test_repo();
    let repo = Repository::discover(dir.path()).unwrap();
    let mut db = Db::open_in_memory().unwrap();

    let head = repo.resolve_ref("HEAD").unwrap();
    let hash = hash_bytes(TEST_FILE_CONTENTS.as_bytes());
    let text = format!(
        concat!(
            "some transport garbage",
            r#"{{"git": {{"head": {{"id": "{head}"}}, "branch": "master"}},"#,
            r#" "source_files": [{{"name": "{file}", "source_digest": "{hash}","#,
            r#" "coverage": [null, 1, null, 0, null]}}]}}"#
        ),
        head = head,
        file = TEST_FILE,
        hash = hash
    );

    let settings = Settings::default();
    let mut bh = BuildHistory::new(&mut db);
    let mut ctx = CommandContext {
        settings: &settings,
        bh: &mut bh,
        repo: &repo,
    };
    let mut out = Vec::new();
    NewJsonCmd.run(&mut ctx, &text, &mut out).unwrap();

    let build = bh.build(1).unwrap().unwrap();
    assert_eq!(build.covered_count(), 1);
    assert_eq!(build.missed_count(), 1);
    let file = build.file(TEST_FILE).unwrap().unwrap();
    assert_eq!(file.coverage(), &[-1, 1, -1, 0, -1]);
}

#[test]
fn new_json_accepts_empty_source_files() {
    let dir = make_test_repo();
    let repo = Repository::discover(dir.path()).unwrap();
    let mut db = Db::open_in_memory().unwrap();

    let head = repo.resolve_ref("HEAD").unwrap();
    let text = format!(
        r#"{{"git": {{"head": {{"id": "{head}"}}, "branch": "master"}}, "source_files": []}}"#
    );

    let settings = Settings::default();
    let mut bh = BuildHistory::new(&mut db);
    let mut ctx = CommandContext {
        settings: &settings,
        bh: &mut bh,
        repo: &repo,
    };
    let mut out = Vec::new();
    NewJsonCmd.run(&mut ctx, &text, &mut out).unwrap();

    let build = bh.build(1).unwrap().unwrap();
    assert!(build.paths().unwrap().is_empty());
}

#[test]
fn database_file_is_created_next_to_git_metadata() {
    let dir = make_test_repo();
    let repo = Repository::discover(dir.path()).unwrap();

    let db_path = repo.git_path().join("uncov.sqlite");
    Db::open(&db_path).unwrap();
    assert!(db_path.exists());
}
