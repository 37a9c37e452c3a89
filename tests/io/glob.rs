//! Expansion of input arguments.

use anyhow::Result;
use bulkload::expand_inputs;
use bulkload::io::glob::loadable_files;
use bulkload::RecordFormat;
use std::fs::{File, create_dir_all};
use tempfile::TempDir;

#[test]
fn patterns_expand_sorted_and_deduplicated() -> Result<()> {
    let dir = TempDir::new()?;
    let base = dir.path();
    create_dir_all(base.join("nested.csv"))?;
    for name in ["b.csv", "a.csv", "c.jsonl.gz", "notes.txt"] {
        File::create(base.join(name))?;
    }

    let csv_pattern = base.join("*.csv").to_string_lossy().into_owned();
    let literal = base.join("a.csv").to_string_lossy().into_owned();
    let all = base.join("*").to_string_lossy().into_owned();

    let files = expand_inputs([csv_pattern.as_str(), literal.as_str(), all.as_str()])?;
    let names: Vec<_> = files
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    assert_eq!(names, ["a.csv", "b.csv", "c.jsonl.gz", "notes.txt"]);

    let loadable = loadable_files(&files);
    assert_eq!(loadable.len(), 3);
    assert_eq!(loadable[2].1, RecordFormat::JsonLines);
    Ok(())
}

#[test]
fn nothing_matched_is_an_error() -> Result<()> {
    let dir = TempDir::new()?;
    let pattern = dir.path().join("*.csv").to_string_lossy().into_owned();
    let err = expand_inputs([pattern]).unwrap_err();
    assert!(err.to_string().contains("no input files matched"));
    Ok(())
}

#[test]
fn invalid_pattern_is_reported() {
    let err = expand_inputs(["data/[.csv"]).unwrap_err();
    assert!(err.to_string().contains("invalid glob pattern"));
}
