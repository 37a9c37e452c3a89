//! Error types for bulkload.
//!
//! Every failure inside one file's load is reported as a [`LoadError`] and
//! stays contained in that file's [`LoadResult`](crate::report::LoadResult).
//! Only [`ConfigError`] is fatal for a whole run, and it is raised before any
//! file is touched.

use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single file load.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The file could not be opened, read or decompressed.
    #[error("cannot read '{path}': {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be parsed (bad delimiter structure, invalid JSON object).
    #[error("parse error in {location}: {message}")]
    Parse { location: String, message: String },

    /// Column discovery or classification failed.
    #[error("schema error: {0}")]
    Schema(String),

    /// Table creation, deletion or bulk load failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid run configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The caller's cancellation signal fired.
    #[error("load cancelled")]
    Cancelled,
}

impl LoadError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::Source {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(location: impl Into<String>, message: impl ToString) -> Self {
        LoadError::Parse {
            location: location.into(),
            message: message.to_string(),
        }
    }

    /// Short category name used in status lines.
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::Source { .. } => "source",
            LoadError::Parse { .. } => "parse",
            LoadError::Schema(_) => "schema",
            LoadError::Store(_) => "store",
            LoadError::Config(_) => "config",
            LoadError::Cancelled => "cancelled",
        }
    }
}

/// Invalid global configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no input files given")]
    NoFiles,

    #[error("unknown type mode '{0}': expected 'dynamic' or 'alltext'")]
    UnknownTypeMode(String),

    #[error("unknown record format '{0}': expected 'csv' or 'jsonl'")]
    UnknownFormat(String),

    #[error("cannot determine record format of '{path}'")]
    UnsupportedFile { path: PathBuf },

    #[error("invalid {field} {value}: must be at least {min}")]
    OutOfRange {
        field: &'static str,
        value: usize,
        min: usize,
    },

    #[error("cannot read configuration: {0}")]
    Unreadable(String),
}

/// Result type alias for LoadError
pub type Result<T> = std::result::Result<T, LoadError>;
