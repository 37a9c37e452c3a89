//! File Load Orchestrator.
//!
//! Each file walks the same state machine:
//!
//! ```text
//! Inferring -> TableCreating -> Streaming -> Succeeded
//!         \            \             \
//!          `------------`-------------`--> Failed (drop the table this load created)
//! ```
//!
//! Files run on a dedicated rayon pool sized to `max_concurrent_files`. A
//! failure stays inside its own [`LoadResult`]; sibling files keep going.

use crate::cancel::CancelToken;
use crate::config::{LoadConfig, RecordFormat};
use crate::error::{ConfigError, LoadError, Result};
use crate::infer::{TableSpec, infer_table};
use crate::naming::table_name_for;
use crate::pipeline::{StreamOptions, stream_file};
use crate::report::{LoadResult, LoadStatus, RunCounters, RunReport};
use crate::store::{StoreError, TableStore};
use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;

/// Attempts at creating a table when a reset keeps racing with another creator.
const CREATE_ATTEMPTS: usize = 3;

/// Loads every configured file into its own table.
///
/// ```
/// use bulkload::{CancelToken, LoadConfig, Loader, MemoryStore};
/// use std::sync::Arc;
///
/// # fn main() -> anyhow::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let path = dir.path().join("people.csv");
/// std::fs::write(&path, "id,name\n1,Ann\n2,Bo\n")?;
///
/// let store = Arc::new(MemoryStore::new());
/// let loader = Loader::new(Arc::clone(&store), LoadConfig::new([&path]));
/// let report = loader.run(&CancelToken::new())?;
///
/// assert_eq!(report.total_rows, 2);
/// assert_eq!(store.row_count("people"), Some(2));
/// # Ok(())
/// # }
/// ```
pub struct Loader<S> {
    store: S,
    config: LoadConfig,
}

impl<S: TableStore> Loader<S> {
    pub fn new(store: S, config: LoadConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load every configured file and aggregate the outcome.
    ///
    /// # Errors
    ///
    /// Only an invalid configuration fails the run, before any file is read.
    /// Per-file failures are reported inside the returned [`RunReport`].
    pub fn run(&self, cancel: &CancelToken) -> std::result::Result<RunReport, ConfigError> {
        self.config.validate()?;
        let started = Instant::now();
        let counters = RunCounters::default();
        let files = &self.config.files;

        tracing::info!(
            files = files.len(),
            concurrency = self.config.max_concurrent_files,
            "load started"
        );

        let load_all = || -> Vec<LoadResult> {
            files
                .par_iter()
                .map(|path| {
                    let result = self.load_file(path, cancel);
                    counters.record(&result);
                    result
                })
                .collect()
        };
        let results = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_concurrent_files)
            .thread_name(|i| format!("bulkload-file-{i}"))
            .build()
        {
            Ok(pool) => pool.install(load_all),
            Err(e) => {
                tracing::warn!(error = %e, "cannot build file pool, using the global rayon pool");
                load_all()
            }
        };

        let report = RunReport::new(results, &counters, started.elapsed());
        for line in report.status_lines() {
            tracing::info!("{line}");
        }
        tracing::info!("{}", report.summary_line());
        Ok(report)
    }

    /// Load one file into the table named after it.
    pub fn load_file(&self, path: &Path, cancel: &CancelToken) -> LoadResult {
        let started = Instant::now();
        let table = table_name_for(path);
        let format = self.config.format_for(path);
        let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        let mut created = false;
        let outcome = match format {
            Some(format) => self.load_phases(path, format, &table, &mut created, cancel),
            None => Err(ConfigError::UnsupportedFile {
                path: path.to_path_buf(),
            }
            .into()),
        };

        let mut result = LoadResult {
            path: path.to_path_buf(),
            table,
            format,
            status: LoadStatus::Succeeded,
            rows: 0,
            file_size,
            elapsed: started.elapsed(),
            error: None,
            cleanup_error: None,
        };
        match outcome {
            Ok(rows) => {
                result.rows = rows;
                tracing::info!(file = %path.display(), table = %result.table, rows, "file loaded");
            }
            Err(err) => {
                if created {
                    result.cleanup_error = self.cleanup(&result.table);
                }
                tracing::warn!(
                    file = %path.display(),
                    table = %result.table,
                    kind = err.kind(),
                    error = %err,
                    "file failed"
                );
                result.status = LoadStatus::Failed;
                result.error = Some(err);
            }
        }
        result.elapsed = started.elapsed();
        result
    }

    fn load_phases(
        &self,
        path: &Path,
        format: RecordFormat,
        table: &str,
        created: &mut bool,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let check = || {
            if cancel.is_cancelled() {
                Err(LoadError::Cancelled)
            } else {
                Ok(())
            }
        };

        check()?;
        tracing::debug!(file = %path.display(), state = "inferring");
        let spec = infer_table(
            path,
            format,
            table,
            self.config.effective_lookup(),
            self.config.type_mode,
        )?;
        if spec.is_empty() {
            return Err(LoadError::Schema(format!(
                "no columns found in the first {} records",
                self.config.effective_lookup()
            )));
        }

        check()?;
        tracing::debug!(file = %path.display(), state = "table_creating", columns = spec.columns.len());
        *created = self.ensure_table(&spec)?;

        check()?;
        tracing::debug!(file = %path.display(), state = "streaming");
        let opts = StreamOptions::from(&self.config);
        stream_file(&self.store, &spec, path, format, &opts, cancel)
    }

    /// Create the table, honoring the reset policy. Returns whether this
    /// call created it.
    fn ensure_table(&self, spec: &TableSpec) -> Result<bool> {
        for attempt in 1..=CREATE_ATTEMPTS {
            match self.store.create_table(spec) {
                Ok(()) => return Ok(true),
                Err(StoreError::AlreadyExists(_)) if !self.config.reset_existing => {
                    tracing::debug!(table = %spec.name, "table exists, appending");
                    return Ok(false);
                }
                Err(StoreError::AlreadyExists(_)) => {
                    tracing::debug!(table = %spec.name, attempt, "table exists, resetting");
                    self.store.drop_table(&spec.name)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::AlreadyExists(spec.name.clone()).into())
    }

    fn cleanup(&self, table: &str) -> Option<String> {
        match self.store.drop_table(table) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(table, error = %e, "cannot drop table after failed load");
                Some(e.to_string())
            }
        }
    }
}
