//! Type Inference Engine.
//!
//! Samples a bounded prefix of a file and produces the [`TableSpec`] the
//! table is created from, before the full streaming pass starts.
//!
//! - **CSV**: columns come from the header row. Each non-empty sampled value
//!   is classified as Integer (base-10 `i64`), Float (`f64`) or Text.
//! - **JSON-Lines**: columns are the union of keys over every sampled object,
//!   in first-seen order. Values classify by JSON kind: numbers are Numeric,
//!   arrays and objects are Json, strings and booleans are Text, nulls are
//!   ignored.
//!
//! Per column the observations resolve with [`TypeCounts::resolve`]: a single
//! Text observation makes the column Text; Integer mixed with Float widens to
//! Float; otherwise the most frequent classification wins, and a column with
//! no observations is Text. In [`TypeMode::AllText`] the sample is only used
//! to discover columns.

use crate::config::{MAX_LOOKUP_ROWS, RecordFormat, TypeMode};
use crate::error::{LoadError, Result};
use crate::io::open_record_source;
use crate::naming::unique_identifiers;
use crate::record::{JsonKind, is_blank, kind_of, parse_object, strip_bom};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Inferred storage type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Numeric,
    Text,
    Json,
}

impl ColumnType {
    /// SQL type name used in column definitions.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Text => "TEXT",
            ColumnType::Json => "JSON",
        }
    }

    // tie-break order between equally frequent classifications
    fn generality(self) -> u8 {
        match self {
            ColumnType::Integer => 0,
            ColumnType::Numeric => 1,
            ColumnType::Float => 2,
            ColumnType::Json => 3,
            ColumnType::Text => 4,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type())
    }
}

/// Observation counts for one column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeCounts {
    pub integer: usize,
    pub float: usize,
    pub numeric: usize,
    pub text: usize,
    pub json: usize,
}

impl TypeCounts {
    pub fn observe(&mut self, ty: ColumnType) {
        match ty {
            ColumnType::Integer => self.integer += 1,
            ColumnType::Float => self.float += 1,
            ColumnType::Numeric => self.numeric += 1,
            ColumnType::Text => self.text += 1,
            ColumnType::Json => self.json += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.integer + self.float + self.numeric + self.text + self.json
    }

    /// Resolve the column type.
    ///
    /// ```
    /// use bulkload::infer::{ColumnType, TypeCounts};
    ///
    /// let mut c = TypeCounts::default();
    /// c.observe(ColumnType::Integer);
    /// c.observe(ColumnType::Integer);
    /// c.observe(ColumnType::Float);
    /// assert_eq!(c.resolve(), ColumnType::Float);
    ///
    /// c.observe(ColumnType::Text);
    /// assert_eq!(c.resolve(), ColumnType::Text);
    /// ```
    pub fn resolve(&self) -> ColumnType {
        if self.text > 0 {
            return ColumnType::Text;
        }
        if self.integer > 0 && self.float > 0 {
            return ColumnType::Float;
        }
        [
            (ColumnType::Integer, self.integer),
            (ColumnType::Numeric, self.numeric),
            (ColumnType::Float, self.float),
            (ColumnType::Json, self.json),
        ]
        .into_iter()
        .filter(|&(_, n)| n > 0)
        .max_by_key(|&(ty, n)| (n, ty.generality()))
        .map_or(ColumnType::Text, |(ty, _)| ty)
    }
}

/// Classify one non-empty CSV value.
pub fn classify_text(value: &str) -> ColumnType {
    if value.parse::<i64>().is_ok() {
        ColumnType::Integer
    } else if value.parse::<f64>().is_ok() {
        ColumnType::Float
    } else {
        ColumnType::Text
    }
}

/// A named, typed column of the target table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Storage-safe column name.
    pub name: String,
    /// Header or key the column was discovered from.
    pub source: String,
    pub ty: ColumnType,
}

/// Table name plus ordered columns; created once per file before the load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Position of each source key, used to project JSON objects.
    pub fn source_index(&self) -> HashMap<String, usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.source.clone(), i))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn build_columns(sources: Vec<String>, counts: &[TypeCounts], mode: TypeMode) -> Vec<Column> {
    let names = unique_identifiers(sources.iter().map(String::as_str));
    sources
        .into_iter()
        .zip(names)
        .zip(counts)
        .map(|((source, name), counts)| Column {
            name,
            source,
            ty: match mode {
                TypeMode::AllText => ColumnType::Text,
                TypeMode::Dynamic => counts.resolve(),
            },
        })
        .collect()
}

fn csv_error(location: String, err: csv::Error) -> LoadError {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(io) => LoadError::unreadable(PathBuf::new(), io),
        _ => LoadError::parse(location, message),
    }
}

/// Infer columns of a CSV stream from its header and first `lookup` rows.
pub fn infer_csv<R: Read>(reader: R, lookup: usize, mode: TypeMode) -> Result<Vec<Column>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| csv_error("header row".into(), e))?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.to_string()
        })
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(LoadError::Schema("CSV input has no header row".into()));
    }

    let mut counts = vec![TypeCounts::default(); headers.len()];
    if mode == TypeMode::Dynamic {
        for (i, rec) in rdr.records().take(lookup.min(MAX_LOOKUP_ROWS)).enumerate() {
            let rec = rec.map_err(|e| csv_error(format!("sample row {}", i + 1), e))?;
            for (value, c) in rec.iter().zip(counts.iter_mut()) {
                if !value.is_empty() {
                    c.observe(classify_text(value));
                }
            }
        }
    }
    Ok(build_columns(headers, &counts, mode))
}

/// Infer columns of a JSON-Lines stream from its first `lookup` objects.
///
/// The result is empty when the sample holds no keys at all.
pub fn infer_jsonl<R: Read>(reader: R, lookup: usize, mode: TypeMode) -> Result<Vec<Column>> {
    let lookup = lookup.min(MAX_LOOKUP_ROWS);
    let mut rdr = BufReader::new(reader);
    let mut keys: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<TypeCounts> = Vec::new();

    let mut line = Vec::new();
    let mut line_no = 0usize;
    let mut sampled = 0usize;
    while sampled < lookup {
        line.clear();
        let n = rdr
            .read_until(b'\n', &mut line)
            .map_err(|e| LoadError::unreadable(PathBuf::new(), e))?;
        if n == 0 {
            break;
        }
        line_no += 1;
        let bytes = if line_no == 1 { strip_bom(&line) } else { &line[..] };
        if is_blank(bytes) {
            continue;
        }
        let obj = parse_object(bytes)
            .map_err(|e| LoadError::parse(format!("sample line {line_no}"), e))?;
        for (key, value) in obj.0 {
            let idx = match positions.get(&key) {
                Some(&idx) => idx,
                None => {
                    positions.insert(key.clone(), keys.len());
                    keys.push(key);
                    counts.push(TypeCounts::default());
                    keys.len() - 1
                }
            };
            if mode == TypeMode::Dynamic {
                match kind_of(value) {
                    JsonKind::Null => {}
                    JsonKind::Number => counts[idx].observe(ColumnType::Numeric),
                    JsonKind::Array | JsonKind::Object => counts[idx].observe(ColumnType::Json),
                    JsonKind::String | JsonKind::Bool => counts[idx].observe(ColumnType::Text),
                }
            }
        }
        sampled += 1;
    }
    Ok(build_columns(keys, &counts, mode))
}

/// Open `path` and infer the table it will be loaded into.
pub fn infer_table(
    path: &Path,
    format: RecordFormat,
    table: &str,
    lookup: usize,
    mode: TypeMode,
) -> Result<TableSpec> {
    let source = open_record_source(path).map_err(|e| LoadError::unreadable(path, e))?;
    let columns = match format {
        RecordFormat::Csv => infer_csv(source, lookup, mode),
        RecordFormat::JsonLines => infer_jsonl(source, lookup, mode),
    }
    .map_err(|e| match e {
        LoadError::Source { source, .. } => LoadError::unreadable(path, source),
        other => other,
    })?;
    tracing::debug!(
        file = %path.display(),
        table,
        columns = columns.len(),
        "inferred schema"
    );
    Ok(TableSpec::new(table, columns))
}
