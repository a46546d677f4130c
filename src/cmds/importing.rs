// src/cmds/importing.rs

//! `new`, `new-json` and `new-gcovi` subcommands
//!
//! All three build a [`BuildData`] from some source of coverage, validate
//! every reported file against the repository tree at the target ref and
//! persist the build only when no validation error occurred.

use super::args::{in_repo_path, try_parse, ParamKind};
use super::{usage_error, CommandContext, SubCommand};
use crate::db::blob::hash_bytes;
use crate::error::{Error, Result};
use crate::fsutil::normalize_path;
use crate::gcov::{query_proc, read_proc, GcovImporter, GcovInfo};
use crate::history::{BuildData, File};
use crate::listings::print_build_header;
use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::path::Path;

/// Validates one imported file against the tree listing and adds it to the
/// build when it checks out.
///
/// Missing files produce a warning (suppressed for ignored paths); hash
/// mismatches poison the whole ingest.
fn validate_and_add(
    bd: &mut BuildData,
    tree_files: &HashMap<String, String>,
    ignored: impl Fn(&str) -> bool,
    file: File,
    failed: &mut bool,
) {
    match tree_files.get(file.path()) {
        None => {
            if !ignored(file.path()) {
                eprintln!(
                    "Skipping file missing in {}: {}",
                    bd.ref_name(),
                    file.path()
                );
            }
        }
        Some(tree_hash) if !tree_hash.eq_ignore_ascii_case(file.hash()) => {
            eprintln!(
                "{} file at {} doesn't match reported MD5 hash",
                file.path(),
                bd.ref_name()
            );
            *failed = true;
        }
        Some(_) => bd.add_file(file),
    }
}

/// Imports a new build from the plain-text stdin format.
pub struct NewCmd;

impl SubCommand for NewCmd {
    fn names(&self) -> &'static [&'static str] {
        &["new"]
    }

    fn description(&self, alias: &str) -> &'static str {
        match alias {
            "new" => "Imports new build from stdin",
            _ => panic!("undescribed alias: {alias}"),
        }
    }

    fn arg_bounds(&self) -> (usize, usize) {
        (0, 0)
    }

    fn call_forms(&self) -> Vec<Vec<ParamKind>> {
        vec![vec![]]
    }

    fn exec_repo(
        &self,
        ctx: &mut CommandContext<'_, '_>,
        alias: &str,
        args: &[String],
    ) -> Result<()> {
        if try_parse(args, &[]).is_none() {
            return Err(usage_error(self, alias));
        }
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        self.run(ctx, &mut stdin.lock(), &mut stdout.lock())
    }
}

impl NewCmd {
    /// The command body with injectable input and output.
    ///
    /// Input format: a ref line, a ref-name line, then file records of the
    /// form `<path> <hash> <nlines> <c0> ... <c_{n-1}>`, whitespace
    /// separated.
    pub fn run<R: BufRead, W: Write>(
        &self,
        ctx: &mut CommandContext<'_, '_>,
        input: &mut R,
        out: &mut W,
    ) -> Result<()> {
        let mut vcs_ref = String::new();
        if input.read_line(&mut vcs_ref)? == 0 {
            eprintln!("Invalid input format: failed to read reference");
            return Err(Error::AlreadyReported);
        }
        let vcs_ref = vcs_ref.trim_end().to_string();

        let mut ref_name = String::new();
        if input.read_line(&mut ref_name)? == 0 {
            eprintln!("Invalid input format: failed to read reference name");
            return Err(Error::AlreadyReported);
        }
        let ref_name = ref_name.trim_end().to_string();

        let tree_files = ctx.repo.list_files(&vcs_ref)?;
        let mut bd = BuildData::new(vcs_ref, ref_name);

        let mut rest = String::new();
        input.read_to_string(&mut rest)?;
        let mut tokens = rest.split_whitespace();

        let mut failed = false;
        while let Some(path_token) = tokens.next() {
            let path = in_repo_path(ctx.repo, path_token)?;

            let Some(hash) = tokens.next() else {
                eprintln!("Invalid input format: no hash for {path}");
                failed = true;
                break;
            };

            let num_lines = tokens.next().and_then(|tok| tok.parse::<i64>().ok());
            let Some(num_lines) = num_lines.filter(|&n| n >= 0) else {
                eprintln!("Invalid input format: no or bad coverage size for {path}");
                failed = true;
                break;
            };

            let mut coverage = Vec::with_capacity(num_lines as usize);
            let mut truncated = false;
            for _ in 0..num_lines {
                match tokens.next().and_then(|tok| tok.parse::<i64>().ok()) {
                    Some(hits) => coverage.push(hits),
                    None => {
                        eprintln!(
                            "Invalid input format: failed to read coverage count for {path}"
                        );
                        failed = true;
                        truncated = true;
                        break;
                    }
                }
            }
            if truncated {
                break;
            }

            let file = File::new(path, hash.to_string(), coverage);
            validate_and_add(&mut bd, &tree_files, |_| false, file, &mut failed);
        }

        if failed {
            return Err(Error::AlreadyReported);
        }

        let build_id = ctx.bh.add_build(&bd)?.id();
        let build = ctx
            .bh
            .build(build_id)?
            .ok_or_else(|| Error::not_found(format!("Can't find build #{build_id}")))?;
        print_build_header(out, ctx.bh, &build, None)?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct CoverallsJson {
    git: CoverallsGit,
    source_files: Vec<CoverallsSourceFile>,
}

#[derive(Deserialize)]
struct CoverallsGit {
    head: CoverallsHead,
    branch: String,
}

#[derive(Deserialize)]
struct CoverallsHead {
    id: String,
}

#[derive(Deserialize)]
struct CoverallsSourceFile {
    name: String,
    #[serde(default)]
    coverage: Vec<Option<i64>>,
    source_digest: Option<String>,
    source: Option<String>,
}

/// Imports a new build from a Coveralls-shaped JSON blob on stdin.
pub struct NewJsonCmd;

impl SubCommand for NewJsonCmd {
    fn names(&self) -> &'static [&'static str] {
        &["new-json"]
    }

    fn description(&self, alias: &str) -> &'static str {
        match alias {
            "new-json" => "Imports new build in JSON format from stdin",
            _ => panic!("undescribed alias: {alias}"),
        }
    }

    fn arg_bounds(&self) -> (usize, usize) {
        (0, 0)
    }

    fn call_forms(&self) -> Vec<Vec<ParamKind>> {
        vec![vec![]]
    }

    fn exec_repo(
        &self,
        ctx: &mut CommandContext<'_, '_>,
        alias: &str,
        args: &[String],
    ) -> Result<()> {
        if try_parse(args, &[]).is_none() {
            return Err(usage_error(self, alias));
        }
        let mut text = String::new();
        std::io::stdin().lock().read_to_string(&mut text)?;
        let stdout = std::io::stdout();
        self.run(ctx, &text, &mut stdout.lock())
    }
}

impl NewJsonCmd {
    /// The command body with injectable input and output.
    ///
    /// Everything up to the first `{` is discarded, which tolerates HTTP
    /// headers or log prefixes in front of the payload.
    pub fn run<W: Write>(
        &self,
        ctx: &mut CommandContext<'_, '_>,
        text: &str,
        out: &mut W,
    ) -> Result<()> {
        let start = text
            .find('{')
            .ok_or_else(|| Error::input("no JSON object in input"))?;
        let parsed: CoverallsJson = serde_json::from_str(&text[start..])
            .map_err(|err| Error::input(format!("malformed JSON input: {err}")))?;

        let tree_files = ctx.repo.list_files(&parsed.git.head.id)?;
        let mut bd = BuildData::new(parsed.git.head.id.clone(), parsed.git.branch.clone());

        let mut failed = false;
        for source_file in parsed.source_files {
            let path = in_repo_path(ctx.repo, &source_file.name)?;

            let (mut hash, computed_hash) = match (&source_file.source_digest, &source_file.source)
            {
                (Some(digest), _) => (digest.clone(), false),
                (None, Some(source)) => (hash_bytes(source.as_bytes()), true),
                (None, None) => {
                    eprintln!("{path} has neither source_digest nor source");
                    failed = true;
                    continue;
                }
            };

            let Some(tree_hash) = tree_files.get(&path) else {
                eprintln!("Skipping file missing in {}: {}", bd.ref_name(), path);
                continue;
            };

            if !tree_hash.eq_ignore_ascii_case(&hash) {
                // A missing trailing newline is a common transport artifact,
                // so hash once more with one appended.
                if computed_hash {
                    let source = source_file.source.as_deref().unwrap_or_default();
                    hash = hash_bytes(format!("{source}\n").as_bytes());
                }

                if !tree_hash.eq_ignore_ascii_case(&hash) {
                    eprintln!(
                        "{} file at {} doesn't match reported contents",
                        path,
                        bd.ref_name()
                    );
                    failed = true;
                    continue;
                }
            }

            let coverage = source_file
                .coverage
                .iter()
                .map(|hits| hits.unwrap_or(-1))
                .collect();
            bd.add_file(File::new(path, hash, coverage));
        }

        if failed {
            return Err(Error::AlreadyReported);
        }

        let build_id = ctx.bh.add_build(&bd)?.id();
        let build = ctx
            .bh
            .build(build_id)?
            .ok_or_else(|| Error::not_found(format!("Can't find build #{build_id}")))?;
        print_build_header(out, ctx.bh, &build, None)?;
        Ok(())
    }
}

#[derive(Parser)]
#[command(
    name = "new-gcovi",
    about = "Generates coverage via gcov and imports it",
    no_binary_name = true,
    disable_version_flag = true
)]
struct GcoviOptions {
    /// Print output of external commands
    #[arg(short, long)]
    verbose: bool,

    /// Path to exclude from coverage (can be repeated)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Prefix to be added to relative path of sources
    #[arg(long, default_value = "")]
    prefix: String,

    /// Forces custom ref name
    #[arg(long)]
    ref_name: Option<String>,

    /// Make a dangling commit if working directory is dirty
    #[arg(short, long)]
    capture_worktree: bool,

    /// Where to look for generated coverage data
    #[arg(default_value = ".")]
    covoutroot: String,
}

/// Generates coverage information using gcov and imports it.
pub struct NewGcoviCmd;

impl SubCommand for NewGcoviCmd {
    fn names(&self) -> &'static [&'static str] {
        &["new-gcovi"]
    }

    fn description(&self, alias: &str) -> &'static str {
        match alias {
            "new-gcovi" => "Generates coverage via gcov and imports it",
            _ => panic!("undescribed alias: {alias}"),
        }
    }

    fn arg_bounds(&self) -> (usize, usize) {
        (0, usize::MAX)
    }

    fn call_forms(&self) -> Vec<Vec<ParamKind>> {
        vec![vec![]]
    }

    fn exec_repo(
        &self,
        ctx: &mut CommandContext<'_, '_>,
        _alias: &str,
        args: &[String],
    ) -> Result<()> {
        let options = match GcoviOptions::try_parse_from(args) {
            Ok(options) => options,
            Err(err) if err.kind() == clap::error::ErrorKind::DisplayHelp => {
                print!("{err}");
                return Ok(());
            }
            Err(err) => return Err(Error::Usage(err.to_string())),
        };

        let worktree = normalize_path(&ctx.repo.worktree_path()?);
        let verbose = options.verbose;

        let mut runner = |cmd: Vec<String>, from: &str| {
            let to_stdout = from == "-";
            let dir = if to_stdout { "." } else { from };
            let output = read_proc(&cmd, Path::new(dir), !to_stdout)?;
            if verbose {
                print!("{output}");
            }
            Ok(if to_stdout { output } else { String::new() })
        };

        let info = GcovInfo::detect()?;
        let imported_files = GcovImporter::new(
            &worktree,
            Path::new(&options.covoutroot),
            &options.exclude,
            &options.prefix,
            info,
            &mut runner,
        )?
        .into_files();

        let (vcs_ref, ref_name) = match self
            .capture(ctx, &worktree, &imported_files, options.capture_worktree, verbose)?
        {
            Some(captured) => captured,
            None => (
                ctx.repo.resolve_ref("HEAD")?,
                ctx.repo.current_ref()?,
            ),
        };
        let ref_name = options.ref_name.unwrap_or(ref_name);

        let tree_files = ctx.repo.list_files(&vcs_ref)?;
        let mut bd = BuildData::new(vcs_ref, ref_name);

        let mut failed = false;
        for file in imported_files {
            validate_and_add(
                &mut bd,
                &tree_files,
                |path| ctx.repo.path_is_ignored(path).unwrap_or(false),
                file,
                &mut failed,
            );
        }

        if failed {
            return Err(Error::AlreadyReported);
        }

        let build_id = ctx.bh.add_build(&bd)?.id();
        let build = ctx
            .bh
            .build(build_id)?
            .ok_or_else(|| Error::not_found(format!("Can't find build #{build_id}")))?;
        let stdout = std::io::stdout();
        print_build_header(&mut stdout.lock(), ctx.bh, &build, None)?;
        Ok(())
    }
}

impl NewGcoviCmd {
    /// Captures a dirty worktree as a dangling stash commit.
    ///
    /// Relevant untracked files are staged temporarily so the stash commit
    /// covers them; ignored paths are never captured. Returns the stash ref
    /// and a `WIP on <branch>` ref name, or `None` when capturing is off or
    /// unnecessary.
    fn capture(
        &self,
        ctx: &CommandContext<'_, '_>,
        worktree: &Path,
        imported_files: &[File],
        should_capture: bool,
        verbose: bool,
    ) -> Result<Option<(String, String)>> {
        if !should_capture {
            return Ok(None);
        }

        let head_files = ctx.repo.list_files("HEAD")?;
        let untracked: Vec<&str> = imported_files
            .iter()
            .map(File::path)
            .filter(|path| {
                !head_files.contains_key(*path)
                    && !ctx.repo.path_is_ignored(path).unwrap_or(false)
            })
            .collect();

        let clean = query_proc(
            &["git".to_string(), "diff".to_string(), "--quiet".to_string()],
            worktree,
        )?;
        if clean && untracked.is_empty() {
            return Ok(None);
        }

        let git = |subcmd: &[&str]| -> Result<String> {
            let mut cmd = vec!["git".to_string()];
            cmd.extend(subcmd.iter().map(|s| s.to_string()));
            let output = read_proc(&cmd, worktree, true)?;
            if verbose {
                print!("{output}");
            }
            Ok(output)
        };

        // Temporarily add relevant untracked files to the index so the
        // stash commit includes them.
        if !untracked.is_empty() {
            let mut add = vec!["add", "--"];
            add.extend(&untracked);
            git(&add)?;
        }

        let vcs_ref = git(&["stash", "create"])?.trim().to_string();

        if !untracked.is_empty() {
            let mut reset = vec!["reset", "--"];
            reset.extend(&untracked);
            git(&reset)?;
        }

        let ref_name = format!("WIP on {}", ctx.repo.current_ref()?);
        Ok(Some((vcs_ref, ref_name)))
    }
}
