// src/cmds/diffing.rs

//! `diff`, `diff-hits` and `regress` subcommands

use super::args::{in_repo_path, resolve_build, try_parse, ArgValue, ParamKind};
use super::listing::{classify_path, PathCategory};
use super::{usage_error, CommandContext, SubCommand};
use crate::compare::{text_lines, CompareStrategy, FileComparator};
use crate::error::{Error, Result};
use crate::fileview::FilePrinter;
use crate::history::Build;
use crate::listings::{print_build_header, print_file_header_for_path};
use crate::printing::line_separator;
use std::collections::BTreeSet;
use std::io::Write;

/// Compares builds, directories or files.
pub struct DiffCmd;

impl SubCommand for DiffCmd {
    fn names(&self) -> &'static [&'static str] {
        &["diff", "diff-hits", "regress"]
    }

    fn description(&self, alias: &str) -> &'static str {
        match alias {
            "diff" => "Compares builds, directories or files",
            "diff-hits" => "Compares builds, directories or files by hits",
            "regress" => "Displays regression between builds",
            _ => panic!("undescribed alias: {alias}"),
        }
    }

    fn arg_bounds(&self) -> (usize, usize) {
        (0, 3)
    }

    fn call_forms(&self) -> Vec<Vec<ParamKind>> {
        vec![
            vec![],
            vec![ParamKind::BuildId],
            vec![ParamKind::BuildId, ParamKind::BuildId],
            vec![ParamKind::Path],
            vec![ParamKind::BuildId, ParamKind::BuildId, ParamKind::Path],
        ]
    }

    fn exec_repo(
        &self,
        ctx: &mut CommandContext<'_, '_>,
        alias: &str,
        args: &[String],
    ) -> Result<()> {
        let forms = self.call_forms();

        let mut find_prev = false;
        let mut builds_diff = false;
        let mut old_ref = None;
        let mut new_ref = None;
        let mut path = String::new();

        let latest = super::args::BuildRefValue::Id(super::args::LATEST_BUILD_MARKER);

        if try_parse(args, &forms[0]).is_some() {
            find_prev = true;
            builds_diff = true;
        } else if let Some(parsed) = try_parse(args, &forms[1]) {
            builds_diff = true;
            old_ref = Some(parsed[0].as_build().clone());
        } else if let Some(parsed) = try_parse(args, &forms[2]) {
            builds_diff = true;
            old_ref = Some(parsed[0].as_build().clone());
            new_ref = Some(parsed[1].as_build().clone());
        } else if let Some(parsed) = try_parse(args, &forms[3]) {
            find_prev = true;
            path = in_repo_path(ctx.repo, parsed[0].as_path())?;
        } else if let Some(parsed) = try_parse(args, &forms[4]) {
            old_ref = Some(parsed[0].as_build().clone());
            new_ref = Some(parsed[1].as_build().clone());
            if let ArgValue::Path(token) = &parsed[2] {
                path = in_repo_path(ctx.repo, token)?;
            }
        } else {
            return Err(usage_error(self, alias));
        }

        let new_build = resolve_build(ctx.bh, new_ref.as_ref().unwrap_or(&latest))?;

        let old_ref = if find_prev {
            let prev_id = ctx.bh.previous_build_id(new_build.id());
            if prev_id <= 0 {
                eprintln!("Failed to obtain previous build of #{}", new_build.id());
                return Err(Error::AlreadyReported);
            }
            super::args::BuildRefValue::Id(prev_id)
        } else {
            old_ref.unwrap_or(latest)
        };
        let old_build = resolve_build(ctx.bh, &old_ref)?;

        if !builds_diff {
            let old_type = classify_path(&old_build, &path)?;
            let new_type = classify_path(&new_build, &path)?;

            if old_type == PathCategory::None && new_type == PathCategory::None {
                eprintln!(
                    "No {} file in both builds (#{} and #{})",
                    path,
                    old_build.id(),
                    new_build.id()
                );
                return Err(Error::AlreadyReported);
            }

            if old_type != PathCategory::File && new_type != PathCategory::File {
                builds_diff = true;
            }
        }

        let strategy = match alias {
            "diff" => CompareStrategy::State,
            "diff-hits" => CompareStrategy::Hits,
            _ => CompareStrategy::Regress,
        };

        let printer = FilePrinter::new(ctx.settings);
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let mut failed = false;

        if builds_diff {
            self.diff_builds(
                ctx,
                &mut out,
                &printer,
                &old_build,
                &new_build,
                &path,
                strategy,
                &mut failed,
            )?;
        } else {
            self.diff_file(
                ctx,
                &mut out,
                &printer,
                &old_build,
                &new_build,
                &path,
                true,
                strategy,
                &mut failed,
            )?;
        }

        if failed {
            return Err(Error::AlreadyReported);
        }
        Ok(())
    }
}

impl DiffCmd {
    /// Prints the difference between two builds, optionally narrowed to a
    /// directory.
    #[allow(clippy::too_many_arguments)]
    fn diff_builds<W: Write>(
        &self,
        ctx: &CommandContext<'_, '_>,
        out: &mut W,
        printer: &FilePrinter,
        old_build: &Build<'_>,
        new_build: &Build<'_>,
        dir_filter: &str,
        strategy: CompareStrategy,
        failed: &mut bool,
    ) -> Result<()> {
        let mut all_files: BTreeSet<String> = old_build.paths()?.into_iter().collect();
        all_files.extend(new_build.paths()?);

        self.print_info(ctx, out, old_build, new_build, "", true, false)?;

        for path in all_files {
            if crate::fsutil::path_is_in_subtree(
                std::path::Path::new(dir_filter),
                std::path::Path::new(&path),
            ) {
                self.diff_file(
                    ctx, out, printer, old_build, new_build, &path, false, strategy, failed,
                )?;
                out.flush()?;
            }
        }
        Ok(())
    }

    /// Prints the difference of one file between two builds.
    ///
    /// Files whose contents and coverage didn't change, or that the active
    /// strategy considers equal, produce no output at all.
    #[allow(clippy::too_many_arguments)]
    fn diff_file<W: Write>(
        &self,
        ctx: &CommandContext<'_, '_>,
        out: &mut W,
        printer: &FilePrinter,
        old_build: &Build<'_>,
        new_build: &Build<'_>,
        file_path: &str,
        standalone: bool,
        strategy: CompareStrategy,
        failed: &mut bool,
    ) -> Result<()> {
        let old_file = old_build.file(file_path)?;
        let new_file = new_build.file(file_path)?;

        let old_hash = old_file.as_ref().map(|f| f.hash()).unwrap_or_default();
        let new_hash = new_file.as_ref().map(|f| f.hash()).unwrap_or_default();
        let old_cov = old_file.as_ref().map(|f| f.coverage()).unwrap_or_default();
        let new_cov = new_file.as_ref().map(|f| f.coverage()).unwrap_or_default();

        if old_hash == new_hash && old_cov == new_cov {
            // Nothing to do for files that didn't change at all.
            return Ok(());
        }

        let old_text = match &old_file {
            Some(_) => ctx.repo.read_file(old_build.vcs_ref(), file_path)?,
            None => String::new(),
        };
        let new_text = match &new_file {
            Some(_) => ctx.repo.read_file(new_build.vcs_ref(), file_path)?,
            None => String::new(),
        };

        let comparator = FileComparator::new(
            &text_lines(&old_text),
            old_cov,
            &text_lines(&new_text),
            new_cov,
            strategy,
            ctx.settings,
        );

        if !comparator.is_valid_input() {
            eprintln!(
                "Coverage information for file {} is not accurate:\n{}",
                file_path,
                comparator.input_error()
            );
            *failed = true;
            return Ok(());
        }

        if comparator.are_equal() {
            // Nothing to do for files that we don't consider different.
            return Ok(());
        }

        if !standalone {
            writeln!(out)?;
        }
        self.print_info(ctx, out, old_build, new_build, file_path, standalone, true)?;

        printer.print_diff(out, &comparator, old_cov, new_cov)?;
        Ok(())
    }

    /// Prints header blocks describing the compared builds and/or file.
    #[allow(clippy::too_many_arguments)]
    fn print_info<W: Write>(
        &self,
        ctx: &CommandContext<'_, '_>,
        out: &mut W,
        old_build: &Build<'_>,
        new_build: &Build<'_>,
        file_path: &str,
        build_info: bool,
        file_info: bool,
    ) -> Result<()> {
        writeln!(out, "{}", line_separator())?;
        if build_info {
            print_build_header(out, ctx.bh, old_build, None)?;
        }
        if file_info {
            print_file_header_for_path(out, ctx.bh, old_build, file_path, None)?;
        }
        writeln!(out, "{}", line_separator())?;
        if build_info {
            print_build_header(out, ctx.bh, new_build, Some(old_build))?;
        }
        if file_info {
            print_file_header_for_path(out, ctx.bh, new_build, file_path, Some(old_build))?;
        }
        writeln!(out, "{}", line_separator())?;
        Ok(())
    }
}
