//! Loads through the SQLite backend.

#![cfg(feature = "sqlite-store")]

use anyhow::Result;
use bulkload::{CancelToken, LoadConfig, Loader, SqliteStore};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn csv_and_jsonl_load_into_sqlite() -> Result<()> {
    let dir = TempDir::new()?;
    let csv = dir.path().join("orders.csv");
    fs::write(&csv, "id,total,note\n1,9.5,\n2,3,\"a, b\"\n")?;
    let jsonl = dir.path().join("events.jsonl");
    fs::write(&jsonl, "{\"kind\":\"click\",\"meta\":{\"x\":1}}\n{\"kind\":\"view\"}\n")?;

    let store = Arc::new(SqliteStore::open(dir.path().join("load.db"))?);
    let report = Loader::new(Arc::clone(&store), LoadConfig::new([&csv, &jsonl])).run(&CancelToken::new())?;

    assert!(!report.has_failures(), "{:?}", report.status_lines());
    assert_eq!(store.row_count("orders")?, 2);
    assert_eq!(store.row_count("events")?, 2);
    Ok(())
}

#[test]
fn failed_sqlite_load_removes_the_table() -> Result<()> {
    let dir = TempDir::new()?;
    let csv = dir.path().join("bad.csv");
    let mut body = String::from("a,b\n");
    for i in 0..500 {
        body.push_str(&format!("{i},{i}\n"));
    }
    body.push_str("only-one-field\n");
    fs::write(&csv, body)?;

    let store = Arc::new(SqliteStore::open_in_memory()?);
    let report = Loader::new(Arc::clone(&store), LoadConfig::new([&csv])).run(&CancelToken::new())?;

    assert_eq!(report.failed, 1);
    assert!(!store.table_exists("bad")?);
    Ok(())
}
