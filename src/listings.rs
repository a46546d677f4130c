// src/listings.rs

//! Row shaping for build, file and directory listings
//!
//! Everything here produces plain strings; table layout and printing sit on
//! top of these rows. Change columns are computed against the previous
//! build unless an explicit baseline is supplied.

use crate::coverage::{CovChange, CovInfo};
use crate::error::Result;
use crate::history::{Build, BuildHistory, File};
use crate::printing::format_time;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Loads the build preceding `build`, if there is one.
fn previous_build<'h>(
    bh: &'h BuildHistory<'_>,
    build: &Build<'_>,
) -> Result<Option<Build<'h>>> {
    let prev_id = bh.previous_build_id(build.id());
    if prev_id <= 0 {
        return Ok(None);
    }
    bh.build(prev_id)
}

fn build_cov_change(
    bh: &BuildHistory<'_>,
    build: &Build<'_>,
    cov_info: CovInfo,
    prev_build: Option<&Build<'_>>,
) -> Result<CovChange> {
    let prev_cov_info = match prev_build {
        Some(prev) => CovInfo::from(prev),
        None => match previous_build(bh, build)? {
            Some(prev) => CovInfo::from(&prev),
            None => CovInfo::default(),
        },
    };
    Ok(CovChange::new(prev_cov_info, cov_info))
}

fn file_cov_change(
    prev_build: Option<&Build<'_>>,
    path: &str,
    cov_info: CovInfo,
) -> Result<CovChange> {
    let prev_cov_info = match prev_build {
        Some(prev) => match prev.file(path)? {
            Some(file) => CovInfo::from(file.as_ref()),
            None => CovInfo::default(),
        },
        None => CovInfo::default(),
    };
    Ok(CovChange::new(prev_cov_info, cov_info))
}

/// Describes a build as the eight attribute strings used by tables and
/// headers: id, coverage, lines, coverage change, line changes, ref name,
/// revision and time.
pub fn describe_build(
    bh: &BuildHistory<'_>,
    build: &Build<'_>,
    extra_align: bool,
    spacing: bool,
    prev_build: Option<&Build<'_>>,
) -> Result<Vec<String>> {
    let sep = if spacing { " / " } else { "/" };
    let cov_info = CovInfo::from(build);
    let cov_change = build_cov_change(bh, build, cov_info, prev_build)?;

    Ok(vec![
        format!("#{}", build.id()),
        cov_info.format_rate(),
        cov_info.format_lines(sep),
        cov_change.format_rate(),
        cov_change.format_lines(sep, if extra_align { 4 } else { 0 }),
        build.ref_name().to_string(),
        build.vcs_ref().to_string(),
        format_time(build.timestamp()),
    ])
}

/// Describes a file of a build as five strings: path, coverage, lines,
/// coverage change and line changes.
pub fn describe_file(
    bh: &BuildHistory<'_>,
    build: &Build<'_>,
    file: &File,
    spacing: bool,
) -> Result<Vec<String>> {
    let sep = if spacing { " / " } else { "/" };
    let cov_info = CovInfo::from(file);
    let prev = previous_build(bh, build)?;
    let cov_change = file_cov_change(prev.as_ref(), file.path(), cov_info)?;

    Ok(vec![
        file.path().to_string(),
        cov_info.format_rate(),
        cov_info.format_lines(sep),
        cov_change.format_rate(),
        cov_change.format_lines(sep, 0),
    ])
}

/// Parent directory of a repo-relative path; empty for top-level entries.
fn dir_of(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|parent| parent.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn in_subtree(dir_filter: &str, path: &str) -> bool {
    crate::fsutil::path_is_in_subtree(Path::new(dir_filter), Path::new(path))
}

/// Per-directory coverage of a build, keyed by directory path.
fn dirs_coverage(build: &Build<'_>, dir_filter: &str) -> Result<BTreeMap<String, CovInfo>> {
    let mut dirs: BTreeMap<String, CovInfo> = BTreeMap::new();
    for file_path in build.paths()? {
        if !in_subtree(dir_filter, &file_path) {
            continue;
        }
        if let Some(file) = build.file(&file_path)? {
            dirs.entry(dir_of(&file_path))
                .or_default()
                .add(CovInfo::from(file.as_ref()));
        }
    }
    Ok(dirs)
}

/// Rows of the `dirs` listing: directory, coverage, lines, coverage change
/// and line changes.
pub fn describe_build_dirs(
    bh: &BuildHistory<'_>,
    build: &Build<'_>,
    dir_filter: &str,
    prev_build: Option<&Build<'_>>,
) -> Result<Vec<Vec<String>>> {
    let new_dirs = dirs_coverage(build, dir_filter)?;

    let loaded_prev;
    let prev = match prev_build {
        Some(prev) => Some(prev),
        None => {
            loaded_prev = previous_build(bh, build)?;
            loaded_prev.as_ref()
        }
    };
    let prev_dirs = match prev {
        Some(prev) => dirs_coverage(prev, dir_filter)?,
        None => BTreeMap::new(),
    };

    let mut rows = Vec::with_capacity(new_dirs.len());
    for (dir, cov_info) in new_dirs {
        let prev_info = prev_dirs.get(&dir).copied().unwrap_or_default();
        let cov_change = CovChange::new(prev_info, cov_info);
        rows.push(vec![
            format!("{dir}/"),
            cov_info.format_rate(),
            cov_info.format_lines(" / "),
            cov_change.format_rate(),
            cov_change.format_lines(" / ", 4),
        ]);
    }
    Ok(rows)
}

/// Rows of the `files`/`changed` listings.
pub fn describe_build_files(
    bh: &BuildHistory<'_>,
    build: &Build<'_>,
    dir_filter: &str,
    changed_only: bool,
    direct_only: bool,
    prev_build: Option<&Build<'_>>,
) -> Result<Vec<Vec<String>>> {
    let loaded_prev;
    let prev = match prev_build {
        Some(prev) => Some(prev),
        None => {
            loaded_prev = previous_build(bh, build)?;
            loaded_prev.as_ref()
        }
    };

    let mut rows = Vec::new();
    for file_path in build.paths()? {
        if !in_subtree(dir_filter, &file_path) {
            continue;
        }
        if direct_only && dir_of(&file_path) != dir_filter {
            continue;
        }

        let Some(file) = build.file(&file_path)? else {
            continue;
        };
        let cov_info = CovInfo::from(file.as_ref());
        let cov_change = file_cov_change(prev, &file_path, cov_info)?;

        if changed_only && !cov_change.is_changed() {
            continue;
        }

        let shown_path = if direct_only {
            Path::new(&file_path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_path.clone())
        } else {
            file_path.clone()
        };
        rows.push(vec![
            shown_path,
            cov_info.format_rate(),
            cov_info.format_lines(" / "),
            cov_change.format_rate(),
            cov_change.format_lines(" / ", 4),
        ]);
    }
    Ok(rows)
}

/// One-line build summary printed above file output and after ingests.
pub fn print_build_header<W: Write>(
    out: &mut W,
    bh: &BuildHistory<'_>,
    build: &Build<'_>,
    prev_build: Option<&Build<'_>>,
) -> Result<()> {
    let v = describe_build(bh, build, true, false, prev_build)?;
    writeln!(out, "Build: {}, {}({}), {}({}), {}", v[0], v[1], v[2], v[3], v[4], v[5])?;
    Ok(())
}

/// One-line file summary based on a loaded file record.
pub fn print_file_header<W: Write>(
    out: &mut W,
    bh: &BuildHistory<'_>,
    build: &Build<'_>,
    file: &File,
) -> Result<()> {
    let v = describe_file(bh, build, file, false)?;
    writeln!(out, "File: {}, {}({}), {}({})", v[0], v[1], v[2], v[3], v[4])?;
    Ok(())
}

/// One-line file summary for a path that may be absent from the build.
pub fn print_file_header_for_path<W: Write>(
    out: &mut W,
    bh: &BuildHistory<'_>,
    build: &Build<'_>,
    file_path: &str,
    prev_build: Option<&Build<'_>>,
) -> Result<()> {
    let cov_info = match build.file(file_path)? {
        Some(file) => CovInfo::from(file.as_ref()),
        None => CovInfo::default(),
    };

    let cov_change = match prev_build {
        Some(_) => file_cov_change(prev_build, file_path, cov_info)?,
        None => {
            let prev = previous_build(bh, build)?;
            file_cov_change(prev.as_ref(), file_path, cov_info)?
        }
    };

    writeln!(
        out,
        "File: {}, {} ({}), {} ({})",
        file_path,
        cov_info.format_rate(),
        cov_info.format_lines("/"),
        cov_change.format_rate(),
        cov_change.format_lines("/", 0),
    )?;
    Ok(())
}
