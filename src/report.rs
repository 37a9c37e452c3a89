//! Per-file results and run-level reporting.
//!
//! Every file produces a [`LoadResult`]. A run aggregates them into a
//! [`RunReport`], whose counters come from [`RunCounters`] updated
//! atomically as files finish. The report renders the status lines the
//! loader logs and converts into a serializable [`RunSummary`]:
//!
//! ```text
//! status=SUCCESS rows_inserted=1,234 file_size=2 MB file="exports/sales.csv"
//! msg="final load stats" total=3 success=2 failed=1 total_rows_inserted=1,240 took=1.52s
//! ```

use crate::config::RecordFormat;
use crate::error::LoadError;
use humansize::{DECIMAL, format_size};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Succeeded,
    Failed,
}

/// Outcome of loading one file.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub table: String,
    pub format: Option<RecordFormat>,
    pub status: LoadStatus,
    pub rows: u64,
    pub file_size: u64,
    pub elapsed: Duration,
    pub error: Option<LoadError>,
    /// Set when dropping the table after a failure also failed.
    pub cleanup_error: Option<String>,
}

impl LoadResult {
    pub fn is_success(&self) -> bool {
        self.status == LoadStatus::Succeeded
    }

    /// One `key=value` status line.
    pub fn status_line(&self) -> String {
        match &self.error {
            None => format!(
                "status=SUCCESS rows_inserted={} file_size={} file={:?}",
                group_thousands(self.rows),
                human_size(self.file_size),
                self.path.display().to_string()
            ),
            Some(err) => {
                let mut line = format!(
                    "status=FAILED data_format={:?} msg=\"unable to load\" file={:?} name={:?} error={:?}",
                    self.format.map_or("unknown", RecordFormat::label),
                    self.path.display().to_string(),
                    self.table,
                    err.to_string()
                );
                if let Some(cleanup) = &self.cleanup_error {
                    line.push_str(&format!(" cleanup_error={cleanup:?}"));
                }
                line
            }
        }
    }
}

/// Run-wide counters shared by concurrent file loads.
#[derive(Debug, Default)]
pub struct RunCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    rows: AtomicU64,
}

impl RunCounters {
    pub fn record(&self, result: &LoadResult) {
        if result.is_success() {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
            self.rows.fetch_add(result.rows, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }
}

/// Everything a finished run produced, in input file order.
#[derive(Debug)]
pub struct RunReport {
    pub results: Vec<LoadResult>,
    pub succeeded: u64,
    pub failed: u64,
    pub total_rows: u64,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn new(results: Vec<LoadResult>, counters: &RunCounters, elapsed: Duration) -> Self {
        Self {
            results,
            succeeded: counters.succeeded(),
            failed: counters.failed(),
            total_rows: counters.rows(),
            elapsed,
        }
    }

    pub fn total_files(&self) -> usize {
        self.results.len()
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn summary_line(&self) -> String {
        format!(
            "msg=\"final load stats\" total={} success={} failed={} total_rows_inserted={} took={}",
            self.total_files(),
            self.succeeded,
            self.failed,
            group_thousands(self.total_rows),
            human_duration(self.elapsed)
        )
    }

    pub fn status_lines(&self) -> Vec<String> {
        self.results.iter().map(LoadResult::status_line).collect()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total_files: self.total_files() as u64,
            succeeded: self.succeeded,
            failed: self.failed,
            total_rows: self.total_rows,
            elapsed_ms: self.elapsed.as_millis() as u64,
            files: self
                .results
                .iter()
                .map(|r| FileSummary {
                    file: r.path.clone(),
                    table: r.table.clone(),
                    format: r.format,
                    status: r.status,
                    rows: r.rows,
                    file_size: r.file_size,
                    elapsed_ms: r.elapsed.as_millis() as u64,
                    error: r.error.as_ref().map(ToString::to_string),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub file: PathBuf,
    pub table: String,
    pub format: Option<RecordFormat>,
    pub status: LoadStatus,
    pub rows: u64,
    pub file_size: u64,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Serializable form of a [`RunReport`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_files: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total_rows: u64,
    pub elapsed_ms: u64,
    pub files: Vec<FileSummary>,
}

impl RunSummary {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the summary as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut file = File::create(path)?;
        let formatted = self.to_json().map_err(io::Error::other)?;
        file.write_all(formatted.as_bytes())?;
        Ok(())
    }
}

/// `1234567` as `1,234,567`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Byte count with a decimal unit, e.g. `2 MB`.
pub fn human_size(bytes: u64) -> String {
    format_size(bytes, DECIMAL)
}

fn human_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", d.as_millis())
    } else if secs < 60.0 {
        format!("{secs:.2}s")
    } else {
        let total = d.as_secs();
        format!("{}m{:02}s", total / 60, total % 60)
    }
}
