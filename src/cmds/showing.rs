// src/cmds/showing.rs

//! `show`, `missed` and `get` subcommands

use super::args::{in_repo_path, resolve_build, try_parse, ParamKind};
use super::listing::{classify_path, PathCategory};
use super::{usage_error, CommandContext, SubCommand};
use crate::error::{Error, Result};
use crate::fileview::FilePrinter;
use crate::history::{Build, File};
use crate::listings::{print_build_header, print_file_header};
use crate::printing::line_separator;
use std::io::Write;
use std::rc::Rc;

/// Looks up a file of a build, failing loudly when it is absent.
fn get_file(build: &Build<'_>, path: &str) -> Result<Rc<File>> {
    build.file(path)?.ok_or_else(|| {
        Error::not_found(format!(
            "Can't find file: {} in build #{} of {} at {}",
            path,
            build.id(),
            build.ref_name(),
            build.vcs_ref()
        ))
    })
}

/// Displays a build, directory or file with a coverage gutter.
pub struct ShowCmd;

impl SubCommand for ShowCmd {
    fn names(&self) -> &'static [&'static str] {
        &["missed", "show"]
    }

    fn description(&self, alias: &str) -> &'static str {
        match alias {
            "missed" => "Displays missed in a build, directory or file",
            "show" => "Displays a build, directory or file",
            _ => panic!("undescribed alias: {alias}"),
        }
    }

    fn arg_bounds(&self) -> (usize, usize) {
        (0, 2)
    }

    fn call_forms(&self) -> Vec<Vec<ParamKind>> {
        vec![
            vec![ParamKind::OptBuildId],
            vec![ParamKind::Path],
            vec![ParamKind::BuildId, ParamKind::Path],
        ]
    }

    fn exec_repo(
        &self,
        ctx: &mut CommandContext<'_, '_>,
        alias: &str,
        args: &[String],
    ) -> Result<()> {
        let forms = self.call_forms();

        let mut path = String::new();
        let mut print_whole_build = false;
        let build;

        if let Some(parsed) = try_parse(args, &forms[0]) {
            build = resolve_build(ctx.bh, parsed[0].as_build())?;
            print_whole_build = true;
        } else if let Some(parsed) = try_parse(args, &forms[1]) {
            build = resolve_build(
                ctx.bh,
                &super::args::BuildRefValue::Id(super::args::LATEST_BUILD_MARKER),
            )?;
            path = in_repo_path(ctx.repo, parsed[0].as_path())?;
        } else if let Some(parsed) = try_parse(args, &forms[2]) {
            build = resolve_build(ctx.bh, parsed[0].as_build())?;
            path = in_repo_path(ctx.repo, parsed[1].as_path())?;
        } else {
            return Err(usage_error(self, alias));
        }

        let file_type = if path.is_empty() {
            PathCategory::Directory
        } else {
            classify_path(&build, &path)?
        };
        if file_type == PathCategory::None {
            eprintln!("No such file {} in build #{}", path, build.id());
            return Err(Error::AlreadyReported);
        }

        let printer = FilePrinter::new(ctx.settings);
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        print_build_header(&mut out, ctx.bh, &build, None)?;

        let leave_missed_only = alias == "missed";

        if print_whole_build || file_type == PathCategory::Directory {
            for file_path in build.paths()? {
                let in_dir = print_whole_build
                    || crate::fsutil::path_is_in_subtree(
                        std::path::Path::new(&path),
                        std::path::Path::new(&file_path),
                    );
                if in_dir {
                    let file = get_file(&build, &file_path)?;
                    print_file(ctx, &mut out, &build, &file, &printer, leave_missed_only)?;
                }
            }
        } else {
            let file = get_file(&build, &path)?;
            print_file(ctx, &mut out, &build, &file, &printer, leave_missed_only)?;
        }
        Ok(())
    }
}

/// Prints one file with its header block.
fn print_file<W: Write>(
    ctx: &CommandContext<'_, '_>,
    out: &mut W,
    build: &Build<'_>,
    file: &File,
    printer: &FilePrinter,
    leave_missed_only: bool,
) -> Result<()> {
    let coverage = file.coverage();

    if leave_missed_only && !coverage.contains(&0) {
        // Nothing to show for files without missed lines.
        return Ok(());
    }

    writeln!(out, "{}", line_separator())?;
    print_file_header(out, ctx.bh, build, file)?;
    writeln!(out, "{}", line_separator())?;

    let contents = ctx.repo.read_file(build.vcs_ref(), file.path())?;
    printer.print(out, &contents, coverage, leave_missed_only)?;
    Ok(())
}

/// Dumps coverage information of a file.
pub struct GetCmd;

impl SubCommand for GetCmd {
    fn names(&self) -> &'static [&'static str] {
        &["get"]
    }

    fn description(&self, alias: &str) -> &'static str {
        match alias {
            "get" => "Dumps coverage information of a file",
            _ => panic!("undescribed alias: {alias}"),
        }
    }

    fn arg_bounds(&self) -> (usize, usize) {
        (2, 2)
    }

    fn call_forms(&self) -> Vec<Vec<ParamKind>> {
        vec![vec![ParamKind::BuildId, ParamKind::Path]]
    }

    fn exec_repo(
        &self,
        ctx: &mut CommandContext<'_, '_>,
        alias: &str,
        args: &[String],
    ) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.run(ctx, alias, args, &mut out)
    }
}

impl GetCmd {
    /// The command body with an injectable sink.
    pub fn run<W: Write>(
        &self,
        ctx: &mut CommandContext<'_, '_>,
        alias: &str,
        args: &[String],
        out: &mut W,
    ) -> Result<()> {
        let Some(parsed) = try_parse(args, &[ParamKind::BuildId, ParamKind::Path]) else {
            return Err(usage_error(self, alias));
        };

        let build = resolve_build(ctx.bh, parsed[0].as_build())?;
        let file_path = in_repo_path(ctx.repo, parsed[1].as_path())?;
        let file = get_file(&build, &file_path)?;

        writeln!(out, "{}", build.vcs_ref())?;
        for hits in file.coverage() {
            writeln!(out, "{hits}")?;
        }
        Ok(())
    }
}
