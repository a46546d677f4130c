// src/gcov.rs

//! gcov invocation and import
//!
//! Turns raw compiler-emitted coverage into canonical file records that are
//! consistent with the repository tree. The importer collects `*.gcno` note
//! files (they exist even for translation units that never ran), feeds them
//! to `gcov` in whichever machine-readable mode the installed version
//! supports, accumulates per-line counts and finally reconciles the result
//! against the worktree.
//!
//! gcov releases with the broken `--preserve-paths` behavior (major version
//! 8 and up, see gcc bug 89961) clobber output files that share a name, so
//! note files are grouped into bins with unique filenames and `gcov` runs
//! once per bin.

use crate::db::blob::hash_bytes;
use crate::error::{Error, Result};
use crate::fsutil::{make_relative_path, normalize_path, path_is_in_subtree, to_unix_separators};
use crate::history::File;
use flate2::read::GzDecoder;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// gcov option to generate coverage in JSON format.
const GCOV_JSON_FORMAT: &str = "--json-format";
/// gcov option to generate coverage in plain text format.
const GCOV_INTERMEDIATE_FORMAT: &str = "--intermediate-format";
/// gcov option to dump coverage onto standard output.
const GCOV_STDOUT: &str = "--stdout";

/// First gcov version whose `--preserve-paths` option is broken.
const FIRST_BROKEN_GCOV_VERSION: i32 = 8;

/// Directories never scanned for note files or sources.
const SKIP_DIRS: &[&str] = &[".git", ".hg", ".svn", ".deps"];

/// Source extensions picked up during tree reconciliation.
const SOURCE_EXTENSIONS: &[&str] = &[
    "h", "hh", "hpp", "hxx", "c", "cc", "cpp", "cxx", "m", "mm",
];

/// Child-process hook: receives the full command line and either `"-"` (run
/// in place and return stdout) or a directory to run in (output files are
/// collected from it afterwards).
pub type Runner<'a> = dyn FnMut(Vec<String>, &str) -> Result<String> + 'a;

/// Runs a command in `dir`, returning its combined output.
///
/// Fails when the command exits non-zero, quoting the command and whatever
/// it printed.
pub fn read_proc(cmd: &[String], dir: &Path, catch_stderr: bool) -> Result<String> {
    let output = Command::new(&cmd[0])
        .args(&cmd[1..])
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| Error::ExternalTool {
            cmd: cmd.join(" "),
            details: err.to_string(),
        })?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    if catch_stderr {
        text += &String::from_utf8_lossy(&output.stderr);
    }

    if !output.status.success() {
        return Err(Error::ExternalTool {
            cmd: cmd.join(" "),
            details: format!("with output:\n{text}"),
        });
    }
    Ok(text)
}

/// Runs a command in `dir` for its exit status only.
pub fn query_proc(cmd: &[String], dir: &Path) -> Result<bool> {
    let status = Command::new(&cmd[0])
        .args(&cmd[1..])
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|err| Error::ExternalTool {
            cmd: cmd.join(" "),
            details: err.to_string(),
        })?;
    Ok(status.success())
}

/// Capabilities of the installed gcov.
#[derive(Debug, Clone, Copy)]
pub struct GcovInfo {
    employ_binning: bool,
    json_format: bool,
    intermediate_format: bool,
    std_out: bool,
}

impl GcovInfo {
    /// Probes `gcov --help` and `gcov --version` once at startup.
    pub fn detect() -> Result<Self> {
        let option_re = Regex::new("--[-a-z]+").expect("static regex");
        let version_re = Regex::new(r"gcov \(GCC\) (\d+)").expect("static regex");

        let help = read_proc(
            &["gcov".to_string(), "--help".to_string()],
            Path::new("."),
            false,
        )?;

        let mut info = GcovInfo {
            employ_binning: true,
            json_format: false,
            intermediate_format: false,
            std_out: false,
        };
        for option in option_re.find_iter(&help) {
            match option.as_str() {
                GCOV_JSON_FORMAT => info.json_format = true,
                GCOV_INTERMEDIATE_FORMAT => info.intermediate_format = true,
                GCOV_STDOUT => info.std_out = true,
                _ => {}
            }
        }

        let version = read_proc(
            &["gcov".to_string(), "--version".to_string()],
            Path::new("."),
            false,
        )?;
        if let Some(captures) = version_re.captures(&version) {
            let major: i32 = captures[1].parse().unwrap_or(0);
            info.employ_binning = major >= FIRST_BROKEN_GCOV_VERSION;
        }

        debug!(?info, "Detected gcov capabilities");
        Ok(info)
    }

    /// Explicit capabilities, for tests and unusual setups.
    pub fn new(
        employ_binning: bool,
        json_format: bool,
        intermediate_format: bool,
        std_out: bool,
    ) -> Self {
        Self {
            employ_binning,
            json_format,
            intermediate_format,
            std_out,
        }
    }
}

/// A set of note files that can be passed to gcov at the same time.
///
/// When deduplication is on, no two files of a bin share a filename.
struct Bin {
    deduplicate_names: bool,
    names: HashSet<String>,
    paths: Vec<String>,
}

impl Bin {
    fn new(deduplicate_names: bool) -> Self {
        Self {
            deduplicate_names,
            names: HashSet::new(),
            paths: Vec::new(),
        }
    }

    /// Tries to add a file; refuses name-duplicates when deduplicating.
    fn add(&mut self, path: &Path) -> bool {
        debug_assert!(path.is_absolute(), "paths should be absolute");

        if self.deduplicate_names {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !self.names.insert(name) {
                return false;
            }
        }

        self.paths.push(path.to_string_lossy().into_owned());
        true
    }
}

#[derive(Deserialize)]
struct GcovJson {
    current_working_directory: Option<String>,
    #[serde(default)]
    files: Vec<GcovJsonFile>,
}

#[derive(Deserialize)]
struct GcovJsonFile {
    file: String,
    #[serde(default)]
    lines: Vec<GcovJsonLine>,
}

#[derive(Deserialize)]
struct GcovJsonLine {
    line_number: u64,
    count: i64,
}

/// Collects coverage by running gcov and reconciling against the worktree.
pub struct GcovImporter {
    info: GcovInfo,
    root_dir: PathBuf,
    prefix: PathBuf,
    skip_paths: Vec<PathBuf>,
    mapping: BTreeMap<String, Vec<i64>>,
    files: Vec<File>,
}

impl GcovImporter {
    /// Runs the import.
    ///
    /// `root` is the repository worktree, `covout_root` is where the build
    /// left its coverage output, `exclude` are worktree paths whose coverage
    /// is discarded and `prefix` resolves relative source paths reported by
    /// the tool.
    pub fn new(
        root: &Path,
        covout_root: &Path,
        exclude: &[String],
        prefix: &str,
        info: GcovInfo,
        runner: &mut Runner<'_>,
    ) -> Result<Self> {
        if !info.json_format && !info.intermediate_format {
            return Err(Error::ExternalTool {
                cmd: "gcov".to_string(),
                details: "failed to detect machine format of gcov".to_string(),
            });
        }

        let cwd = std::env::current_dir()?;
        let root_dir = normalize_path(&absolute_in(root, &cwd));

        let mut importer = GcovImporter {
            info,
            skip_paths: exclude
                .iter()
                .map(|p| normalize_path(&absolute_in(Path::new(p), &root_dir)))
                .collect(),
            root_dir,
            prefix: PathBuf::from(prefix),
            mapping: BTreeMap::new(),
            files: Vec::new(),
        };

        let covout = absolute_in(covout_root, &cwd);
        let note_files = importer.find_note_files(&covout);
        importer.import_files(note_files, runner)?;
        importer.reconcile_with_tree()?;

        Ok(importer)
    }

    /// Hands over the collected file records.
    pub fn into_files(self) -> Vec<File> {
        self.files
    }

    /// Collects `*.gcno` files under the coverage output root.
    ///
    /// Note files are used instead of `*.gcda` because they exist even for
    /// translation units that were never executed.
    fn find_note_files(&self, covout: &Path) -> Vec<PathBuf> {
        let mut note_files = Vec::new();
        let walk = WalkDir::new(covout).into_iter().filter_entry(|entry| {
            !(entry.file_type().is_dir() && is_skipped_dir_name(entry.file_name()))
        });
        for entry in walk.flatten() {
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "gcno")
            {
                note_files.push(entry.into_path());
            }
        }
        note_files
    }

    fn import_files(&mut self, note_files: Vec<PathBuf>, runner: &mut Runner<'_>) -> Result<()> {
        if self.info.json_format && self.info.std_out {
            self.import_as_output(note_files, runner)
        } else {
            self.import_as_files(note_files, runner)
        }
    }

    /// Single gcov invocation with JSON printed to stdout.
    fn import_as_output(
        &mut self,
        note_files: Vec<PathBuf>,
        runner: &mut Runner<'_>,
    ) -> Result<()> {
        let mut cmd = vec![
            "gcov".to_string(),
            GCOV_JSON_FORMAT.to_string(),
            GCOV_STDOUT.to_string(),
            "--".to_string(),
        ];
        cmd.extend(
            note_files
                .iter()
                .map(|path| path.to_string_lossy().into_owned()),
        );

        let output = runner(cmd, "-")?;
        for json in output.lines() {
            if !json.is_empty() {
                self.parse_gcov_json(json)?;
            }
        }
        Ok(())
    }

    /// One gcov invocation per bin, collecting output files from a
    /// temporary directory.
    fn import_as_files(
        &mut self,
        note_files: Vec<PathBuf>,
        runner: &mut Runner<'_>,
    ) -> Result<()> {
        let mut bins = Vec::new();
        if self.info.employ_binning {
            // The runner is invoked even with no input files.
            bins.push(Bin::new(true));

            for note_file in &note_files {
                let added = bins.iter_mut().any(|bin| bin.add(note_file));
                if !added {
                    let mut bin = Bin::new(true);
                    bin.add(note_file);
                    bins.push(bin);
                }
            }
        } else {
            let mut bin = Bin::new(false);
            for note_file in &note_files {
                bin.add(note_file);
            }
            bins.push(bin);
        }

        let (gcov_option, gcov_file_ext) = if self.info.json_format {
            (GCOV_JSON_FORMAT, ".gcov.json.gz")
        } else {
            (GCOV_INTERMEDIATE_FORMAT, ".gcov")
        };

        for bin in bins {
            let mut cmd = vec![
                "gcov".to_string(),
                "--preserve-paths".to_string(),
                gcov_option.to_string(),
                "--".to_string(),
            ];
            cmd.extend(bin.paths.iter().cloned());

            let temp_dir = tempfile::Builder::new().prefix("gcovi").tempdir()?;
            let temp_path = temp_dir.path().to_string_lossy().into_owned();
            runner(cmd, &temp_path)?;

            for entry in WalkDir::new(temp_dir.path()).into_iter().flatten() {
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                if !name.ends_with(gcov_file_ext) {
                    continue;
                }
                if self.info.json_format {
                    self.parse_gcov_json_gz(entry.path())?;
                } else {
                    self.parse_gcov_text(entry.path())?;
                }
            }
        }
        Ok(())
    }

    fn parse_gcov_json_gz(&mut self, path: &Path) -> Result<()> {
        let file = std::fs::File::open(path)?;
        let mut json = String::new();
        GzDecoder::new(file).read_to_string(&mut json)?;
        self.parse_gcov_json(&json)
    }

    fn parse_gcov_json(&mut self, json: &str) -> Result<()> {
        let parsed: GcovJson = serde_json::from_str(json)
            .map_err(|err| Error::input(format!("malformed gcov JSON: {err}")))?;

        let cwd = parsed.current_working_directory.map(PathBuf::from);

        for file in parsed.files {
            let Some(source_path) = self.resolve_source_path(Path::new(&file.file), cwd.as_deref())
            else {
                continue;
            };

            let coverage = self.mapping.entry(source_path).or_default();
            for line in file.lines {
                update_coverage(coverage, line.line_number, line.count);
            }
        }
        Ok(())
    }

    /// Parses the plain text intermediate format, a stream of `key:value`
    /// records.
    fn parse_gcov_text(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path)?;

        let mut current: Option<String> = None;
        for token in contents.split_whitespace() {
            let Some((key, value)) = token.split_once(':') else {
                return Err(Error::input(format!("can't split gcov record: {token}")));
            };

            match key {
                "file" => {
                    current = self.resolve_source_path(Path::new(value), None);
                }
                "lcount" => {
                    let Some(source_path) = &current else {
                        continue;
                    };
                    let fields: Vec<&str> = value.split(',').collect();
                    if fields.len() < 2 {
                        return Err(Error::input(format!("not enough fields in lcount: {value}")));
                    }
                    let line_number: u64 = fields[0]
                        .parse()
                        .map_err(|_| Error::input(format!("bad lcount line: {value}")))?;
                    let count: i64 = fields[1]
                        .parse()
                        .map_err(|_| Error::input(format!("bad lcount count: {value}")))?;
                    let coverage = self.mapping.entry(source_path.clone()).or_default();
                    update_coverage(coverage, line_number, count);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Resolves a path reported by gcov into a repo-relative source path.
    ///
    /// Relative paths are joined against the configured prefix, then the
    /// working directory reported in the JSON, then the repository root.
    /// Paths outside the root or under an excluded directory yield `None`.
    fn resolve_source_path(&self, unresolved: &Path, cwd: Option<&Path>) -> Option<String> {
        let mut path = unresolved.to_path_buf();
        if !path.is_absolute() {
            path = self.prefix.join(path);
        }
        if !path.is_absolute() {
            if let Some(cwd) = cwd {
                path = cwd.join(path);
            }
        }

        let source = normalize_path(&absolute_in(&path, &self.root_dir));
        if !path_is_in_subtree(&self.root_dir, &source) || self.is_excluded(&source) {
            return None;
        }

        Some(to_unix_separators(&make_relative_path(
            &self.root_dir,
            &source,
        )))
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.skip_paths
            .iter()
            .any(|skip| path_is_in_subtree(skip, path))
    }

    /// Completes the imported mapping against the worktree.
    ///
    /// Sources that gcov never mentioned become fully-irrelevant records;
    /// covered sources are read back to size their vectors and to neutralize
    /// lone close-brace lines, which some gcov versions report as executable.
    fn reconcile_with_tree(&mut self) -> Result<()> {
        let root = self.root_dir.clone();
        let skip_paths = self.skip_paths.clone();
        let walk = WalkDir::new(&root).into_iter().filter_entry(move |entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            if is_skipped_dir_name(entry.file_name()) {
                return false;
            }
            let path = normalize_path(entry.path());
            !skip_paths
                .iter()
                .any(|skip| path_is_in_subtree(skip, &path))
        });

        for entry in walk.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let has_source_extension = entry
                .path()
                .extension()
                .is_some_and(|ext| SOURCE_EXTENSIONS.iter().any(|known| ext == *known));
            if !has_source_extension {
                continue;
            }

            let file_path = to_unix_separators(&make_relative_path(&root, entry.path()));
            if self.mapping.contains_key(&file_path) {
                continue;
            }

            let contents = std::fs::read(entry.path())?;
            let hash = hash_bytes(&contents);
            let num_lines = contents.iter().filter(|&&b| b == b'\n').count();
            self.files
                .push(File::new(file_path, hash, vec![-1; num_lines]));
        }

        for (file_path, mut coverage) in std::mem::take(&mut self.mapping) {
            let contents = std::fs::read(self.root_dir.join(&file_path))?;
            let hash = hash_bytes(&contents);

            let text = String::from_utf8_lossy(&contents);
            let lines: Vec<&str> = text.split('\n').collect();
            coverage.resize(lines.len(), -1);

            for (i, line) in lines.iter().enumerate() {
                let trimmed = line.trim_matches(['\r', '\n', ' ', '\t']);
                if trimmed == "}" || trimmed == "};" {
                    coverage[i] = -1;
                }
            }

            self.files.push(File::new(file_path, hash, coverage));
        }
        Ok(())
    }
}

/// Extends `coverage` to cover `line_number` and accumulates `count` there.
fn update_coverage(coverage: &mut Vec<i64>, line_number: u64, count: i64) {
    let line_number = line_number as usize;
    if line_number == 0 {
        warn!("Ignoring zero line number in gcov output");
        return;
    }
    if coverage.len() < line_number {
        coverage.resize(line_number, -1);
    }

    let entry = &mut coverage[line_number - 1];
    *entry = if *entry == -1 { count } else { *entry + count };
}

fn is_skipped_dir_name(name: &std::ffi::OsStr) -> bool {
    SKIP_DIRS.iter().any(|skip| name == *skip)
}

fn absolute_in(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_gz(path: &Path, contents: &str) {
        let file = fs::File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(contents.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn test_requires_a_machine_format() {
        let info = GcovInfo::new(false, false, false, false);
        let mut runner = |_cmd: Vec<String>, _from: &str| Ok(String::new());
        let result = GcovImporter::new(
            Path::new(""),
            Path::new(""),
            &[],
            "",
            info,
            &mut runner,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_plain_text_format_with_binning() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::create_dir(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("src/file.gcno"), "\n").unwrap();
        fs::write(dir.path().join("tests/file.gcno"), "\n").unwrap();

        let mut invocations = 0;
        let mut runner = |cmd: Vec<String>, from: &str| {
            invocations += 1;
            assert_eq!(cmd.len(), 5);

            let in_path = PathBuf::from(cmd.last().unwrap());
            let parent = in_path.parent().unwrap().file_name().unwrap();
            let rel_path = Path::new(parent).join(in_path.file_name().unwrap());
            let out_name = format!(
                "{}{}.gcov",
                parent.to_string_lossy(),
                in_path.file_name().unwrap().to_string_lossy()
            );

            fs::write(
                Path::new(from).join(out_name),
                format!("file:{}\nlcount:1,1\nlcount:2,0\n", rel_path.display()),
            )
            .unwrap();
            Ok(String::new())
        };

        let info = GcovInfo::new(true, false, true, false);
        let files = GcovImporter::new(
            dir.path(),
            dir.path(),
            &[],
            &dir.path().to_string_lossy(),
            info,
            &mut runner,
        )
        .unwrap()
        .into_files();

        // Same filename in two directories forces two bins.
        assert_eq!(invocations, 2);
        assert_eq!(files.len(), 2);
        for file in &files {
            assert_eq!(file.covered_count(), 1);
            assert_eq!(file.missed_count(), 1);
        }
    }

    #[test]
    fn test_json_format_is_parsed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("file.gcno"), "\n").unwrap();

        let mut runner = |_cmd: Vec<String>, from: &str| {
            write_gz(
                &Path::new(from).join("out.gcov.json.gz"),
                r#"{
                    "files": [
                        {
                            "file": "file.gcno",
                            "lines": [
                                { "line_number": 1, "count": 1 },
                                { "line_number": 2, "count": 0 }
                            ]
                        },
                        {
                            "file": "/usr/include/whatever.h",
                            "lines": [ { "line_number": 1, "count": 1 } ]
                        }
                    ]
                }"#,
            );
            Ok(String::new())
        };

        let info = GcovInfo::new(false, true, true, false);
        let files = GcovImporter::new(
            dir.path(),
            dir.path(),
            &[],
            &dir.path().to_string_lossy(),
            info,
            &mut runner,
        )
        .unwrap()
        .into_files();

        // The out-of-tree system header is dropped.
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].covered_count(), 1);
        assert_eq!(files[0].missed_count(), 1);
    }

    #[test]
    fn test_stdout_json_mode_and_close_brace_rule() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.gcno"), "\n").unwrap();
        fs::write(dir.path().join("a.cpp"), "int f() {\n  return 1;\n}\n").unwrap();

        let root = dir.path().to_string_lossy().into_owned();
        let mut runner = move |cmd: Vec<String>, from: &str| {
            assert_eq!(from, "-");
            assert_eq!(cmd[0], "gcov");
            assert!(cmd.contains(&GCOV_STDOUT.to_string()));
            Ok(format!(
                concat!(
                    r#"{{"current_working_directory": "{root}", "files": ["#,
                    r#"{{"file": "a.cpp", "lines": ["#,
                    r#"{{"line_number": 1, "count": 2}},"#,
                    r#"{{"line_number": 2, "count": 2}},"#,
                    r#"{{"line_number": 3, "count": 2}}]}}]}}"#,
                    "\n"
                ),
                root = root
            ))
        };

        let info = GcovInfo::new(false, true, true, true);
        let files = GcovImporter::new(
            dir.path(),
            dir.path(),
            &[],
            "",
            info,
            &mut runner,
        )
        .unwrap()
        .into_files();

        assert_eq!(files.len(), 1);
        // Four text lines after splitting on '\n' (trailing empty included);
        // the lone `}` on line 3 is forced to be irrelevant.
        assert_eq!(files[0].coverage(), &[2, 2, -1, -1]);
    }

    #[test]
    fn test_uncovered_sources_become_irrelevant_records() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lonely.cpp"), "a\nb\nc\n").unwrap();

        let mut runner = |_cmd: Vec<String>, _from: &str| Ok(String::new());
        let info = GcovInfo::new(false, true, true, true);
        let files = GcovImporter::new(
            dir.path(),
            dir.path(),
            &[],
            "",
            info,
            &mut runner,
        )
        .unwrap()
        .into_files();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path(), "lonely.cpp");
        assert_eq!(files[0].coverage(), &[-1, -1, -1]);
    }

    #[test]
    fn test_excluded_paths_are_dropped() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("vendor")).unwrap();
        fs::write(dir.path().join("vendor/dep.cpp"), "x\n").unwrap();
        fs::write(dir.path().join("mine.cpp"), "x\n").unwrap();

        let mut runner = |_cmd: Vec<String>, _from: &str| Ok(String::new());
        let info = GcovInfo::new(false, true, true, true);
        let files = GcovImporter::new(
            dir.path(),
            dir.path(),
            &["vendor".to_string()],
            "",
            info,
            &mut runner,
        )
        .unwrap()
        .into_files();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path(), "mine.cpp");
    }

    #[test]
    fn test_coverage_accumulation() {
        let mut coverage = Vec::new();
        update_coverage(&mut coverage, 3, 2);
        assert_eq!(coverage, vec![-1, -1, 2]);
        update_coverage(&mut coverage, 3, 3);
        assert_eq!(coverage, vec![-1, -1, 5]);
        update_coverage(&mut coverage, 1, 0);
        assert_eq!(coverage, vec![0, -1, 5]);
    }
}
