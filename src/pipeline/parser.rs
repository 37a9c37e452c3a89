//! Chunk parsers.
//!
//! A parser turns one record-aligned [`Chunk`] into records laid out in the
//! table's column order. Parsers are shared by every worker of a file, so
//! they hold only read-only schema data plus atomic counters.

use crate::error::{LoadError, Result};
use crate::infer::TableSpec;
use crate::pipeline::splitter::Chunk;
use crate::record::{Record, is_blank, parse_object, render, strip_bom};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Parses one chunk into column-ordered records.
pub trait ChunkParser: Sync {
    /// Append the records of `chunk` to `out`, in chunk order.
    fn parse_chunk(&self, chunk: &Chunk, out: &mut Vec<Record>) -> Result<()>;
}

/// Positional CSV records; the header has already been consumed.
pub struct CsvChunkParser {
    width: usize,
}

impl CsvChunkParser {
    pub fn new(spec: &TableSpec) -> Self {
        Self {
            width: spec.columns.len(),
        }
    }
}

impl ChunkParser for CsvChunkParser {
    fn parse_chunk(&self, chunk: &Chunk, out: &mut Vec<Record>) -> Result<()> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(chunk.data.as_slice());
        let mut row = csv::StringRecord::new();
        let mut n = 0usize;
        loop {
            let more = rdr
                .read_record(&mut row)
                .map_err(|e| LoadError::parse(format!("chunk {} record {}", chunk.seq, n + 1), e))?;
            if !more {
                break;
            }
            n += 1;
            if row.len() != self.width {
                return Err(LoadError::parse(
                    format!("chunk {} record {n}", chunk.seq),
                    format!("expected {} fields, found {}", self.width, row.len()),
                ));
            }
            out.push(row.iter().map(str::to_string).collect());
        }
        Ok(())
    }
}

/// JSON-Lines objects projected onto the inferred columns.
///
/// Keys missing from an object leave an empty field. Keys that were not seen
/// during sampling are dropped and counted in [`dropped_keys`](Self::dropped_keys).
pub struct JsonlChunkParser {
    positions: HashMap<String, usize>,
    width: usize,
    dropped: AtomicU64,
}

impl JsonlChunkParser {
    pub fn new(spec: &TableSpec) -> Self {
        Self {
            positions: spec.source_index(),
            width: spec.columns.len(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Number of key occurrences dropped because they are not table columns.
    pub fn dropped_keys(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ChunkParser for JsonlChunkParser {
    fn parse_chunk(&self, chunk: &Chunk, out: &mut Vec<Record>) -> Result<()> {
        let mut dropped = 0;
        for (i, line) in chunk.data.split(|&b| b == b'\n').enumerate() {
            let line = if chunk.seq == 0 && i == 0 { strip_bom(line) } else { line };
            if is_blank(line) {
                continue;
            }
            let location = || format!("chunk {} line {}", chunk.seq, i + 1);
            let obj = parse_object(line).map_err(|e| LoadError::parse(location(), e))?;
            let mut record = vec![String::new(); self.width];
            for (key, value) in obj.0 {
                match self.positions.get(&key) {
                    Some(&pos) => {
                        record[pos] = render(value).map_err(|e| LoadError::parse(location(), e))?;
                    }
                    None => dropped += 1,
                }
            }
            out.push(record);
        }
        if dropped > 0 {
            self.dropped.fetch_add(dropped, Ordering::Relaxed);
        }
        Ok(())
    }
}
