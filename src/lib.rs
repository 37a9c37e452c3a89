//! # bulkload
//!
//! A **schema-inferring bulk loader** for CSV and JSON-Lines files. Point it at
//! a set of files and it creates one table per file, with column types
//! inferred from a sample, then streams every record into the table through
//! the store's bulk-load path.
//!
//! ## Key Features
//!
//! - **No predefined schema** - columns and types come from a bounded sample
//! - **Record-safe chunking** - input is split on record boundaries, quoted CSV newlines included
//! - **Parallel parsing** - a pool of parser threads per file, fed through bounded queues
//! - **Streaming bulk load** - serialization runs concurrently with the store's ingest
//! - **Many files at once** - bounded cross-file parallelism with per-file failure isolation
//! - **Transparent decompression** - gzip by default, zstd/bzip2/xz behind feature flags
//!
//! ## Quick Start
//!
//! ```no_run
//! use bulkload::{CancelToken, LoadConfig, Loader, MemoryStore, TypeMode};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let files = bulkload::expand_inputs(["exports/*.csv", "events/*.jsonl.gz"])?;
//! let config = LoadConfig::new(files)
//!     .with_max_concurrent_files(4)
//!     .with_type_mode(TypeMode::Dynamic)
//!     .with_reset_existing(true);
//!
//! let loader = Loader::new(MemoryStore::new(), config);
//! let report = loader.run(&CancelToken::new())?;
//!
//! for line in report.status_lines() {
//!     println!("{line}");
//! }
//! println!("{}", report.summary_line());
//! if report.has_failures() {
//!     std::process::exit(1);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## How a file is loaded
//!
//! 1. **Inference** ([`infer`]) reads the first `lookup_size` records and
//!    builds a [`TableSpec`]. CSV columns come from the header; JSON-Lines
//!    columns are the keys of every sampled object in first-seen order. A
//!    single text value makes a column [`ColumnType::Text`].
//! 2. **Table creation** goes through [`TableStore::create_table`]. An
//!    existing table is appended to, or dropped and recreated when
//!    `reset_existing` is set.
//! 3. **Streaming** ([`pipeline`]) runs the splitter, the parser pool, the
//!    serializer and the store's bulk load concurrently.
//! 4. **Cleanup**: when any step after table creation fails, the table this
//!    load created is dropped again.
//!
//! ## Stores
//!
//! Anything implementing [`TableStore`] can be loaded into. The crate ships
//! [`MemoryStore`] and, with the `sqlite-store` feature, `SqliteStore`.
//!
//! ## Feature Flags
//!
//! - `compression-gzip` (default) - gzip input via `flate2`
//! - `compression-zstd`, `compression-bzip2`, `compression-xz` - other codecs
//! - `sqlite-store` - the SQLite backend (bundled `rusqlite`)
//!
//! ## Logging
//!
//! Progress and per-file outcomes are emitted as [`tracing`] events. The
//! library never installs a subscriber.

pub mod cancel;
pub mod config;
pub mod error;
pub mod infer;
pub mod io;
pub mod loader;
pub mod naming;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod store;

pub use cancel::CancelToken;
pub use config::{LoadConfig, RecordFormat, TypeMode};
pub use error::{ConfigError, LoadError, Result};
pub use infer::{Column, ColumnType, TableSpec, TypeCounts, infer_csv, infer_jsonl, infer_table};
pub use io::{RecordSource, expand_glob, expand_inputs, open_record_source};
pub use loader::Loader;
pub use naming::{sanitize_identifier, table_name_for};
pub use pipeline::{StreamOptions, stream_file};
pub use report::{LoadResult, LoadStatus, RunCounters, RunReport, RunSummary};
#[cfg(feature = "sqlite-store")]
pub use store::SqliteStore;
pub use store::{CopyFormat, MemoryStore, StoreError, TableStore};
