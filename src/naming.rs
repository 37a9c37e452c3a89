//! Storage-safe identifiers for tables and columns.

use crate::config::{COMPRESSION_SUFFIXES, RecordFormat, strip_any_suffix};
use std::collections::HashSet;
use std::path::Path;

/// Turn an arbitrary header or key into a storage-safe identifier.
///
/// Lowercases, replaces every character that is not a letter or digit with
/// `_`, and prefixes names that would start with a digit.
///
/// ```
/// use bulkload::naming::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("Order ID"), "order_id");
/// assert_eq!(sanitize_identifier("2024-total"), "_2024_total");
/// assert_eq!(sanitize_identifier(""), "unnamed");
/// ```
pub fn sanitize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        return "unnamed".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Table name derived from a file path: the file stem without format and
/// compression extensions, sanitized.
///
/// ```
/// use bulkload::naming::table_name_for;
///
/// assert_eq!(table_name_for("exports/Daily Sales.csv.gz"), "daily_sales");
/// assert_eq!(table_name_for("events.jsonl"), "events");
/// ```
pub fn table_name_for(path: impl AsRef<Path>) -> String {
    let file = path
        .as_ref()
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = file.to_lowercase();
    let mut keep = lower.len();
    if let Some(rest) = strip_any_suffix(&lower, COMPRESSION_SUFFIXES) {
        keep = rest.len();
    }
    for format in [RecordFormat::Csv, RecordFormat::JsonLines] {
        if let Some(rest) = strip_any_suffix(&lower[..keep], format.suffixes()) {
            keep = rest.len();
            break;
        }
    }
    sanitize_identifier(&lower[..keep])
}

/// Sanitize a list of names, suffixing `_2`, `_3`, ... onto collisions so
/// every output name is distinct. Output order matches input order.
pub fn unique_identifiers<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        let base = sanitize_identifier(name);
        let mut candidate = base.clone();
        let mut n = 2;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        out.push(candidate);
    }
    out
}
