//! Expansion of input arguments into a file list.
//!
//! Arguments containing glob metacharacters (`*`, `?`, `[`) are expanded;
//! anything else is taken as a literal path. Results keep argument order,
//! each pattern's matches are sorted, and duplicates are dropped.
//!
//! ```no_run
//! use bulkload::io::glob::expand_inputs;
//!
//! let files = expand_inputs(["exports/*.csv", "extra/events.jsonl.gz"])?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use crate::config::RecordFormat;
use anyhow::{Context, Result, bail};
use glob::glob;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn is_pattern(arg: &str) -> bool {
    arg.contains(['*', '?', '['])
}

/// Expand one glob pattern into a sorted vector of matching files.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or a matched entry cannot be
/// read. Zero matches is not an error.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }
    result.sort();
    Ok(result)
}

/// Expand every argument and return the combined, de-duplicated file list.
///
/// # Errors
///
/// Returns an error for invalid patterns, or when nothing at all matched.
pub fn expand_inputs<I, S>(args: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for arg in args {
        let arg = arg.as_ref();
        let matches = if is_pattern(arg) {
            expand_glob(arg)?
        } else {
            vec![PathBuf::from(arg)]
        };
        for path in matches {
            if seen.insert(path.clone()) {
                out.push(path);
            }
        }
    }
    if out.is_empty() {
        bail!("no input files matched");
    }
    Ok(out)
}

/// Keep only files whose record format can be detected from their name.
pub fn loadable_files(paths: &[PathBuf]) -> Vec<(PathBuf, RecordFormat)> {
    paths
        .iter()
        .filter_map(|p| RecordFormat::from_path(Path::new(p)).map(|f| (p.clone(), f)))
        .collect()
}
