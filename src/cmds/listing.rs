// src/cmds/listing.rs

//! `build`, `builds` and `files`/`changed`/`dirs` subcommands

use super::args::{resolve_build, try_parse, ParamKind};
use super::{usage_error, CommandContext, SubCommand};
use crate::error::{Error, Result};
use crate::history::Build;
use crate::listings::{describe_build, describe_build_dirs, describe_build_files};
use crate::table::TablePrinter;

/// Kind of a path within a build.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum PathCategory {
    File,
    Directory,
    None,
}

/// Categorizes a repo-relative path as file, directory or absent.
pub(super) fn classify_path(build: &Build<'_>, path: &str) -> Result<PathCategory> {
    if path.is_empty() {
        return Ok(PathCategory::Directory);
    }

    let dir_prefix = format!("{path}/");
    let mut category = PathCategory::None;
    for file_path in build.paths()? {
        if file_path == path {
            return Ok(PathCategory::File);
        }
        if file_path.starts_with(&dir_prefix) {
            category = PathCategory::Directory;
        }
    }
    Ok(category)
}

/// Displays information about a single build.
pub struct BuildCmd;

impl SubCommand for BuildCmd {
    fn names(&self) -> &'static [&'static str] {
        &["build"]
    }

    fn description(&self, alias: &str) -> &'static str {
        match alias {
            "build" => "Displays information about single build",
            _ => panic!("undescribed alias: {alias}"),
        }
    }

    fn arg_bounds(&self) -> (usize, usize) {
        (0, 1)
    }

    fn call_forms(&self) -> Vec<Vec<ParamKind>> {
        vec![vec![ParamKind::OptBuildId]]
    }

    fn exec_repo(
        &self,
        ctx: &mut CommandContext<'_, '_>,
        alias: &str,
        args: &[String],
    ) -> Result<()> {
        let Some(parsed) = try_parse(args, &[ParamKind::OptBuildId]) else {
            return Err(usage_error(self, alias));
        };

        let build = resolve_build(ctx.bh, parsed[0].as_build())?;
        let descr = describe_build(ctx.bh, &build, false, true, None)?;

        let mut table = TablePrinter::new(&["-Name", "-Value"], true);
        table.append(vec!["Id:".to_string(), descr[0].clone()]);
        table.append(vec!["Coverage:".to_string(), descr[1].clone()]);
        table.append(vec!["C/R Lines:".to_string(), descr[2].clone()]);
        table.append(vec!["Cov Change:".to_string(), descr[3].clone()]);
        table.append(vec!["C/M/R Line Changes:".to_string(), descr[4].clone()]);
        table.append(vec!["Ref:".to_string(), descr[5].clone()]);
        table.append(vec!["Commit:".to_string(), descr[6].clone()]);
        table.append(vec!["Time:".to_string(), descr[7].clone()]);

        let stdout = std::io::stdout();
        table.print(&mut stdout.lock())?;
        Ok(())
    }
}

/// Lists builds.
pub struct BuildsCmd;

impl SubCommand for BuildsCmd {
    fn names(&self) -> &'static [&'static str] {
        &["builds"]
    }

    fn description(&self, alias: &str) -> &'static str {
        match alias {
            "builds" => "Lists builds",
            _ => panic!("undescribed alias: {alias}"),
        }
    }

    fn arg_bounds(&self) -> (usize, usize) {
        (0, 1)
    }

    fn call_forms(&self) -> Vec<Vec<ParamKind>> {
        vec![
            vec![],
            vec![ParamKind::PositiveNumber],
            vec![ParamKind::Literal("all")],
        ]
    }

    fn exec_repo(
        &self,
        ctx: &mut CommandContext<'_, '_>,
        alias: &str,
        args: &[String],
    ) -> Result<()> {
        // By default limit number of builds to display to 10.
        let mut limit = Some(10usize);
        if try_parse(args, &[]).is_some() {
            // Defaults are in effect.
        } else if let Some(parsed) = try_parse(args, &[ParamKind::PositiveNumber]) {
            limit = Some(parsed[0].as_number() as usize);
        } else if try_parse(args, &[ParamKind::Literal("all")]).is_some() {
            limit = None;
        } else {
            return Err(usage_error(self, alias));
        }

        let mut builds = ctx.bh.builds()?;
        if let Some(limit) = limit {
            if builds.len() > limit {
                builds.drain(..builds.len() - limit);
            }
        }

        let mut table = TablePrinter::new(
            &[
                "Build",
                "Coverage",
                "C/R Lines",
                "Cov Change",
                "C/M/R Line Changes",
                "Ref",
            ],
            false,
        );
        for build in &builds {
            let descr = describe_build(ctx.bh, build, true, true, None)?;
            table.append(descr[..6].to_vec());
        }

        let stdout = std::io::stdout();
        table.print(&mut stdout.lock())?;
        Ok(())
    }
}

/// Lists statistics about files or directories.
pub struct FilesCmd;

impl SubCommand for FilesCmd {
    fn names(&self) -> &'static [&'static str] {
        &["files", "changed", "dirs"]
    }

    fn description(&self, alias: &str) -> &'static str {
        match alias {
            "files" => "Lists statistics about files",
            "changed" => "Lists statistics about changed files",
            "dirs" => "Lists statistics about directories",
            _ => panic!("undescribed alias: {alias}"),
        }
    }

    fn arg_bounds(&self) -> (usize, usize) {
        (0, 3)
    }

    fn call_forms(&self) -> Vec<Vec<ParamKind>> {
        vec![
            vec![ParamKind::OptBuildId],
            vec![ParamKind::BuildId, ParamKind::BuildId],
            vec![ParamKind::BuildId, ParamKind::BuildId, ParamKind::Path],
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

        let mut dir_filter = String::new();
        let build;
        let mut prev_build = None;

        if let Some(parsed) = try_parse(args, &forms[0]) {
            build = resolve_build(ctx.bh, parsed[0].as_build())?;
        } else if let Some(parsed) = try_parse(args, &forms[1]) {
            prev_build = Some(resolve_build(ctx.bh, parsed[0].as_build())?);
            build = resolve_build(ctx.bh, parsed[1].as_build())?;
        } else if let Some(parsed) = try_parse(args, &forms[2]) {
            prev_build = Some(resolve_build(ctx.bh, parsed[0].as_build())?);
            build = resolve_build(ctx.bh, parsed[1].as_build())?;
            dir_filter = super::args::in_repo_path(ctx.repo, parsed[2].as_path())?;
        } else if let Some(parsed) = try_parse(args, &forms[3]) {
            build = resolve_build(ctx.bh, parsed[0].as_build())?;
            dir_filter = super::args::in_repo_path(ctx.repo, parsed[1].as_path())?;
        } else {
            return Err(usage_error(self, alias));
        }

        if !dir_filter.is_empty() {
            let category = classify_path(&build, &dir_filter)?;
            let acceptable = if alias == "dirs" {
                category == PathCategory::Directory
            } else {
                category != PathCategory::None
            };
            if !acceptable {
                eprintln!("Specified path wasn't found in the build.");
                return Err(Error::AlreadyReported);
            }
        }

        let first_column = if alias == "dirs" { "-Directory" } else { "-File" };
        let mut table = TablePrinter::new(
            &[
                first_column,
                "Coverage",
                "C/R Lines",
                "Cov Change",
                "C/M/R Line Changes",
            ],
            false,
        );

        let rows = if alias == "dirs" {
            describe_build_dirs(ctx.bh, &build, &dir_filter, prev_build.as_ref())?
        } else {
            describe_build_files(
                ctx.bh,
                &build,
                &dir_filter,
                alias == "changed",
                false,
                prev_build.as_ref(),
            )?
        };
        for row in rows {
            table.append(row);
        }

        let stdout = std::io::stdout();
        table.print(&mut stdout.lock())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::history::{BuildData, BuildHistory, File};

    #[test]
    fn test_classify_path() {
        let mut db = Db::open_in_memory().unwrap();
        let mut bh = BuildHistory::new(&mut db);

        let mut bd = BuildData::new("r".into(), "master".into());
        bd.add_file(File::new("src/sub/a.rs".into(), "h".into(), vec![1]));
        bd.add_file(File::new("top.rs".into(), "h".into(), vec![1]));
        let build = bh.add_build(&bd).unwrap();

        assert_eq!(classify_path(&build, "top.rs").unwrap(), PathCategory::File);
        assert_eq!(
            classify_path(&build, "src").unwrap(),
            PathCategory::Directory
        );
        assert_eq!(
            classify_path(&build, "src/sub").unwrap(),
            PathCategory::Directory
        );
        assert_eq!(classify_path(&build, "").unwrap(), PathCategory::Directory);
        assert_eq!(classify_path(&build, "gone").unwrap(), PathCategory::None);
        assert_eq!(
            classify_path(&build, "sr").unwrap(),
            PathCategory::None
        );
    }
}
