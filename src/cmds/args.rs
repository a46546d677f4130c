// src/cmds/args.rs

//! Positional-argument matching and build-reference resolution
//!
//! Each subcommand declares one or more *call forms*: ordered lists of
//! parameter kinds. A form matches when it consumes every token; optional
//! kinds may match zero tokens. Build references use `@`-syntax: `@@` for
//! the latest build, `@N` (possibly negative) for absolute or N-to-last ids
//! and `@name` for the latest build on a named ref.

use crate::error::{Error, Result};
use crate::fsutil::{make_relative_path, normalize_path, path_is_in_subtree, to_unix_separators};
use crate::history::{Build, BuildHistory};
use crate::repo::Repository;
use std::path::Path;

/// Build id standing for "latest" until resolution time.
pub const LATEST_BUILD_MARKER: i64 = 0;

/// One element of a call form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// `@@`, `@<number>` or `@<refname>`.
    BuildId,
    /// Like [`ParamKind::BuildId`], but may be absent (defaults to latest).
    OptBuildId,
    /// Any remaining token.
    Path,
    /// Decimal integer greater than zero.
    PositiveNumber,
    /// The token must equal the literal exactly.
    Literal(&'static str),
}

/// An unresolved build reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildRefValue {
    Id(i64),
    Name(String),
}

/// A parsed argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Build(BuildRefValue),
    Path(String),
    Number(u32),
    Literal,
}

impl ArgValue {
    pub fn as_build(&self) -> &BuildRefValue {
        match self {
            ArgValue::Build(value) => value,
            _ => panic!("argument is not a build reference"),
        }
    }

    pub fn as_path(&self) -> &str {
        match self {
            ArgValue::Path(path) => path,
            _ => panic!("argument is not a path"),
        }
    }

    pub fn as_number(&self) -> u32 {
        match self {
            ArgValue::Number(number) => *number,
            _ => panic!("argument is not a number"),
        }
    }
}

enum ParseOutcome {
    /// Token consumed, parsing continues.
    Accepted(ArgValue),
    /// Zero tokens matched, parsing continues.
    Skipped(ArgValue),
    /// The form fails.
    Rejected,
}

fn parse_build_ref(args: &[String], idx: usize) -> ParseOutcome {
    if let Some(arg) = args.get(idx) {
        if arg == "@@" {
            return ParseOutcome::Accepted(ArgValue::Build(BuildRefValue::Id(LATEST_BUILD_MARKER)));
        }
        if let Some(rest) = arg.strip_prefix('@') {
            if let Ok(id) = rest.parse::<i64>() {
                return ParseOutcome::Accepted(ArgValue::Build(BuildRefValue::Id(id)));
            }
            // A reference that merely starts with digits (e.g. `@1x`) is
            // neither a number nor a usable name.
            let digits = rest.strip_prefix(['+', '-']).unwrap_or(rest);
            if !digits.starts_with(|c: char| c.is_ascii_digit()) {
                return ParseOutcome::Accepted(ArgValue::Build(BuildRefValue::Name(
                    rest.to_string(),
                )));
            }
        }
    }
    ParseOutcome::Skipped(ArgValue::Build(BuildRefValue::Id(LATEST_BUILD_MARKER)))
}

fn parse_one(kind: ParamKind, args: &[String], idx: usize) -> ParseOutcome {
    match kind {
        ParamKind::BuildId | ParamKind::OptBuildId => parse_build_ref(args, idx),
        ParamKind::Path => match args.get(idx) {
            Some(arg) => ParseOutcome::Accepted(ArgValue::Path(arg.clone())),
            None => ParseOutcome::Rejected,
        },
        ParamKind::PositiveNumber => match args.get(idx).and_then(|arg| arg.parse::<u32>().ok()) {
            Some(number) if number > 0 => ParseOutcome::Accepted(ArgValue::Number(number)),
            _ => ParseOutcome::Rejected,
        },
        ParamKind::Literal(text) => match args.get(idx) {
            Some(arg) if arg == text => ParseOutcome::Accepted(ArgValue::Literal),
            _ => ParseOutcome::Rejected,
        },
    }
}

/// Matches `args` against a call form.
///
/// Succeeds only when every token is consumed and no kind rejected.
pub fn try_parse(args: &[String], form: &[ParamKind]) -> Option<Vec<ArgValue>> {
    fn match_from(
        args: &[String],
        idx: usize,
        form: &[ParamKind],
        parsed: &mut Vec<ArgValue>,
    ) -> bool {
        let Some((&kind, rest)) = form.split_first() else {
            return idx >= args.len();
        };

        match parse_one(kind, args, idx) {
            ParseOutcome::Accepted(value) => {
                parsed.push(value);
                match_from(args, idx + 1, rest, parsed)
            }
            ParseOutcome::Skipped(value) => {
                parsed.push(value);
                match_from(args, idx, rest, parsed)
            }
            ParseOutcome::Rejected => false,
        }
    }

    let mut parsed = Vec::with_capacity(form.len());
    match_from(args, 0, form, &mut parsed).then_some(parsed)
}

/// Resolves a reference to a concrete or relative build id.
///
/// Named refs resolve to the most recent build recorded on that ref.
pub fn resolve_build_id(bh: &BuildHistory<'_>, value: &BuildRefValue) -> Result<i64> {
    match value {
        BuildRefValue::Id(id) => Ok(*id),
        BuildRefValue::Name(name) => {
            let builds = bh.builds_on(name)?;
            match builds.last() {
                Some(build) => Ok(build.id()),
                None => Err(Error::not_found(format!("No builds for reference: {name}"))),
            }
        }
    }
}

/// Resolves a reference all the way to a build.
///
/// The latest marker maps to the newest build, negative ids count back from
/// it.
pub fn resolve_build<'h>(
    bh: &'h BuildHistory<'_>,
    value: &BuildRefValue,
) -> Result<Build<'h>> {
    let mut id = resolve_build_id(bh, value)?;

    if id == LATEST_BUILD_MARKER {
        id = bh.last_build_id()?;
        if id == 0 {
            return Err(Error::not_found("No last build"));
        }
    } else if id < 0 {
        let offset = -id;
        id = bh.nth_to_last_build_id(offset)?;
        if id == 0 {
            return Err(Error::not_found(format!(
                "Can't find Nth previous build where N = {offset}"
            )));
        }
    }

    bh.build(id)?
        .ok_or_else(|| Error::not_found(format!("Can't find build #{id}")))
}

/// Normalizes a user-supplied path into its stored repo-relative form.
///
/// A leading `/` marks a repo-absolute path and is stripped. Otherwise,
/// when the working directory is inside the worktree, the path is resolved
/// against it and rebased onto the worktree root.
pub fn in_repo_path(repo: &Repository, token: &str) -> Result<String> {
    let worktree = normalize_path(&repo.worktree_path()?);

    let path = if let Some(repo_absolute) = token.strip_prefix('/') {
        repo_absolute.to_string()
    } else {
        let cwd = std::env::current_dir()?;
        if path_is_in_subtree(&worktree, &cwd) {
            let canonic = normalize_path(&cwd.join(token));
            to_unix_separators(&make_relative_path(&worktree, &canonic))
        } else {
            token.to_string()
        }
    };

    Ok(to_unix_separators(&normalize_path(Path::new(&path))))
}

/// Placeholder text of a parameter kind in usage output.
pub fn describe_param(kind: ParamKind) -> String {
    match kind {
        ParamKind::BuildId => "<build>".to_string(),
        ParamKind::OptBuildId => "[<build>]".to_string(),
        ParamKind::Path => "<path>".to_string(),
        ParamKind::PositiveNumber => "<count>".to_string(),
        ParamKind::Literal(text) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::history::{BuildData, File};

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_ref_tokens() {
        let parsed = try_parse(&strings(&["@@"]), &[ParamKind::BuildId]).unwrap();
        assert_eq!(parsed[0], ArgValue::Build(BuildRefValue::Id(0)));

        let parsed = try_parse(&strings(&["@5"]), &[ParamKind::BuildId]).unwrap();
        assert_eq!(parsed[0], ArgValue::Build(BuildRefValue::Id(5)));

        let parsed = try_parse(&strings(&["@-2"]), &[ParamKind::BuildId]).unwrap();
        assert_eq!(parsed[0], ArgValue::Build(BuildRefValue::Id(-2)));

        let parsed = try_parse(&strings(&["@master"]), &[ParamKind::BuildId]).unwrap();
        assert_eq!(
            parsed[0],
            ArgValue::Build(BuildRefValue::Name("master".to_string()))
        );
    }

    #[test]
    fn test_optional_build_id_can_be_absent() {
        let parsed = try_parse(&[], &[ParamKind::OptBuildId]).unwrap();
        assert_eq!(parsed[0], ArgValue::Build(BuildRefValue::Id(0)));
    }

    #[test]
    fn test_build_id_skips_to_path() {
        // A non-@ token skips the build id and feeds the path kind.
        let parsed = try_parse(
            &strings(&["src/main.rs"]),
            &[ParamKind::BuildId, ParamKind::Path],
        )
        .unwrap();
        assert_eq!(parsed[0], ArgValue::Build(BuildRefValue::Id(0)));
        assert_eq!(parsed[1], ArgValue::Path("src/main.rs".to_string()));
    }

    #[test]
    fn test_all_tokens_must_be_consumed() {
        assert!(try_parse(&strings(&["a", "b"]), &[ParamKind::Path]).is_none());
        assert!(try_parse(&strings(&["a"]), &[]).is_none());
        assert!(try_parse(&[], &[]).is_some());
    }

    #[test]
    fn test_positive_number() {
        let parsed = try_parse(&strings(&["15"]), &[ParamKind::PositiveNumber]).unwrap();
        assert_eq!(parsed[0], ArgValue::Number(15));

        assert!(try_parse(&strings(&["0"]), &[ParamKind::PositiveNumber]).is_none());
        assert!(try_parse(&strings(&["-3"]), &[ParamKind::PositiveNumber]).is_none());
        assert!(try_parse(&strings(&["12x"]), &[ParamKind::PositiveNumber]).is_none());
    }

    #[test]
    fn test_literal() {
        assert!(try_parse(&strings(&["all"]), &[ParamKind::Literal("all")]).is_some());
        assert!(try_parse(&strings(&["any"]), &[ParamKind::Literal("all")]).is_none());
    }

    #[test]
    fn test_two_builds_and_path() {
        let form = [ParamKind::BuildId, ParamKind::BuildId, ParamKind::Path];
        let parsed = try_parse(&strings(&["@1", "@2", "f.rs"]), &form).unwrap();
        assert_eq!(parsed[0], ArgValue::Build(BuildRefValue::Id(1)));
        assert_eq!(parsed[1], ArgValue::Build(BuildRefValue::Id(2)));
        assert_eq!(parsed[2], ArgValue::Path("f.rs".to_string()));
    }

    #[test]
    fn test_resolution() {
        let mut db = Db::open_in_memory().unwrap();
        let mut bh = BuildHistory::new(&mut db);

        let mut bd = BuildData::new("r1".into(), "master".into());
        bd.add_file(File::new("a.rs".into(), "h".into(), vec![1]));
        bh.add_build(&bd).unwrap();
        bh.add_build(&bd).unwrap();
        bh.add_build(&bd).unwrap();

        let latest = resolve_build(&bh, &BuildRefValue::Id(LATEST_BUILD_MARKER)).unwrap();
        assert_eq!(latest.id(), 3);

        let second = resolve_build(&bh, &BuildRefValue::Id(2)).unwrap();
        assert_eq!(second.id(), 2);

        let n_to_last = resolve_build(&bh, &BuildRefValue::Id(-1)).unwrap();
        assert_eq!(n_to_last.id(), 2);

        let named = resolve_build(&bh, &BuildRefValue::Name("master".to_string())).unwrap();
        assert_eq!(named.id(), 3);

        assert!(resolve_build(&bh, &BuildRefValue::Id(-10)).is_err());
        assert!(resolve_build(&bh, &BuildRefValue::Name("other".to_string())).is_err());
        assert!(resolve_build(&bh, &BuildRefValue::Id(99)).is_err());
    }

    #[test]
    fn test_no_builds_at_all() {
        let mut db = Db::open_in_memory().unwrap();
        let bh = BuildHistory::new(&mut db);
        assert!(resolve_build(&bh, &BuildRefValue::Id(LATEST_BUILD_MARKER)).is_err());
    }
}
