//! Run configuration.
//!
//! [`LoadConfig`] is the typed entry point of a load run. It is usually built
//! in code with the `with_*` methods, but also deserializes from JSON so a
//! caller can keep run settings in a file:
//!
//! ```
//! use bulkload::config::{LoadConfig, TypeMode};
//!
//! let cfg = LoadConfig::from_json_str(
//!     r#"{"files": ["a.csv"], "type_mode": "alltext", "reset_existing": true}"#,
//! ).unwrap();
//! assert_eq!(cfg.type_mode, TypeMode::AllText);
//! assert_eq!(cfg.lookup_size, 400);
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Upper bound on the number of sampled rows, whatever the configured lookup.
pub const MAX_LOOKUP_ROWS: usize = 10_000;

pub const DEFAULT_LOOKUP_ROWS: usize = 400;
pub const DEFAULT_CONCURRENT_FILES: usize = 8;
pub const DEFAULT_PARSER_WORKERS: usize = 5;
pub const DEFAULT_READ_BUFFER: usize = 6 * 1024 * 1024;
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;
pub const DEFAULT_BATCH_SIZE: usize = 3000;

/// How column types are assigned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeMode {
    /// Infer a type per column from the sampled prefix.
    #[default]
    Dynamic,
    /// Store every column as text; columns are still discovered from the sample.
    #[serde(rename = "alltext")]
    AllText,
}

impl FromStr for TypeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dynamic" => Ok(TypeMode::Dynamic),
            "alltext" | "all_text" | "all-text" => Ok(TypeMode::AllText),
            other => Err(ConfigError::UnknownTypeMode(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for TypeMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Record layout of an input file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// One JSON object per line.
    #[serde(rename = "jsonl")]
    JsonLines,
}

/// Compression suffixes stripped before looking at the format extension.
pub(crate) const COMPRESSION_SUFFIXES: &[&str] = &[".gz", ".gzip", ".zst", ".zstd", ".bz2", ".bzip2", ".xz"];

const CSV_SUFFIXES: &[&str] = &[".csv"];
const JSONL_SUFFIXES: &[&str] = &[".jsonl", ".ndjson", ".json"];

impl RecordFormat {
    /// Detect the record format from a file name, ignoring a compression suffix.
    ///
    /// ```
    /// use bulkload::config::RecordFormat;
    ///
    /// assert_eq!(RecordFormat::from_path("logs/2024.json.gz"), Some(RecordFormat::JsonLines));
    /// assert_eq!(RecordFormat::from_path("sales.CSV"), Some(RecordFormat::Csv));
    /// assert_eq!(RecordFormat::from_path("notes.txt"), None);
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let name = path.as_ref().file_name()?.to_string_lossy().to_lowercase();
        let name = strip_any_suffix(&name, COMPRESSION_SUFFIXES).unwrap_or(&name);
        if CSV_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            Some(RecordFormat::Csv)
        } else if JSONL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            Some(RecordFormat::JsonLines)
        } else {
            None
        }
    }

    /// Extensions that identify this format.
    pub fn suffixes(self) -> &'static [&'static str] {
        match self {
            RecordFormat::Csv => CSV_SUFFIXES,
            RecordFormat::JsonLines => JSONL_SUFFIXES,
        }
    }

    /// Label used in status lines.
    pub fn label(self) -> &'static str {
        match self {
            RecordFormat::Csv => "CSV",
            RecordFormat::JsonLines => "JSONL",
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RecordFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(RecordFormat::Csv),
            "jsonl" | "json" | "ndjson" | "jsonlines" => Ok(RecordFormat::JsonLines),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for RecordFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

pub(crate) fn strip_any_suffix<'a>(name: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    suffixes.iter().find_map(|s| name.strip_suffix(s))
}

/// Typed configuration of one load run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Files to load; each becomes its own table.
    pub files: Vec<PathBuf>,
    /// Maximum number of files loaded at the same time.
    pub max_concurrent_files: usize,
    /// Number of leading records sampled for type inference (capped at [`MAX_LOOKUP_ROWS`]).
    pub lookup_size: usize,
    pub type_mode: TypeMode,
    /// Drop and recreate a table that already exists instead of appending to it.
    pub reset_existing: bool,
    /// Forces one record format for every file instead of detecting it per file.
    pub format: Option<RecordFormat>,
    /// Parser threads per file.
    pub parser_workers: usize,
    /// Size of each raw read from the source, in bytes.
    pub read_buffer_size: usize,
    /// Capacity of the chunk, record and pipe queues.
    pub queue_capacity: usize,
    /// Records rendered per serializer batch.
    pub batch_size: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            max_concurrent_files: DEFAULT_CONCURRENT_FILES,
            lookup_size: DEFAULT_LOOKUP_ROWS,
            type_mode: TypeMode::Dynamic,
            reset_existing: false,
            format: None,
            parser_workers: DEFAULT_PARSER_WORKERS.min(num_cpus::get().max(1)),
            read_buffer_size: DEFAULT_READ_BUFFER,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl LoadConfig {
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON; absent fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Unreadable(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Unreadable(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    #[must_use]
    pub fn with_max_concurrent_files(mut self, n: usize) -> Self {
        self.max_concurrent_files = n;
        self
    }

    #[must_use]
    pub fn with_lookup_size(mut self, n: usize) -> Self {
        self.lookup_size = n;
        self
    }

    #[must_use]
    pub fn with_type_mode(mut self, mode: TypeMode) -> Self {
        self.type_mode = mode;
        self
    }

    #[must_use]
    pub fn with_reset_existing(mut self, reset: bool) -> Self {
        self.reset_existing = reset;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: RecordFormat) -> Self {
        self.format = Some(format);
        self
    }

    #[must_use]
    pub fn with_parser_workers(mut self, n: usize) -> Self {
        self.parser_workers = n;
        self
    }

    #[must_use]
    pub fn with_read_buffer_size(mut self, bytes: usize) -> Self {
        self.read_buffer_size = bytes;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// The lookup size actually used for sampling.
    pub fn effective_lookup(&self) -> usize {
        self.lookup_size.min(MAX_LOOKUP_ROWS)
    }

    /// Record format for `path`, honoring the run-wide override.
    pub fn format_for(&self, path: &Path) -> Option<RecordFormat> {
        self.format.or_else(|| RecordFormat::from_path(path))
    }

    /// Check the configuration before any file is processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.files.is_empty() {
            return Err(ConfigError::NoFiles);
        }
        for (field, value) in [
            ("max_concurrent_files", self.max_concurrent_files),
            ("lookup_size", self.lookup_size),
            ("parser_workers", self.parser_workers),
            ("read_buffer_size", self.read_buffer_size),
            ("queue_capacity", self.queue_capacity),
            ("batch_size", self.batch_size),
        ] {
            if value == 0 {
                return Err(ConfigError::OutOfRange { field, value, min: 1 });
            }
        }
        if let Some(path) = self.files.iter().find(|p| self.format_for(p).is_none()) {
            return Err(ConfigError::UnsupportedFile { path: path.clone() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mode_parses_aliases() {
        assert_eq!("dynamic".parse::<TypeMode>(), Ok(TypeMode::Dynamic));
        assert_eq!("AllText".parse::<TypeMode>(), Ok(TypeMode::AllText));
        assert_eq!("all-text".parse::<TypeMode>(), Ok(TypeMode::AllText));
        assert_eq!(
            "strict".parse::<TypeMode>(),
            Err(ConfigError::UnknownTypeMode("strict".into()))
        );
    }

    #[test]
    fn format_detection_ignores_compression() {
        assert_eq!(RecordFormat::from_path("a.csv.gz"), Some(RecordFormat::Csv));
        assert_eq!(RecordFormat::from_path("a.ndjson.zst"), Some(RecordFormat::JsonLines));
        assert_eq!(RecordFormat::from_path("a.gz"), None);
        assert_eq!(RecordFormat::from_path("dir/"), None);
    }

    #[test]
    fn validate_rejects_unknown_files() {
        let cfg = LoadConfig::new(["a.csv", "b.parquet"]);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::UnsupportedFile { path: "b.parquet".into() })
        );
        let forced = cfg.with_format(RecordFormat::Csv);
        assert_eq!(forced.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_zero_counts() {
        let cfg = LoadConfig::new(["a.csv"]).with_parser_workers(0);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::OutOfRange { field: "parser_workers", .. })
        ));
        assert_eq!(LoadConfig::default().validate(), Err(ConfigError::NoFiles));
    }

    #[test]
    fn lookup_is_capped() {
        let cfg = LoadConfig::new(["a.csv"]).with_lookup_size(1_000_000);
        assert_eq!(cfg.effective_lookup(), MAX_LOOKUP_ROWS);
    }

    #[test]
    fn json_config_rejects_bad_type_mode() {
        let err = LoadConfig::from_json_str(r#"{"type_mode": "guess"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable(msg) if msg.contains("guess")));
    }
}
