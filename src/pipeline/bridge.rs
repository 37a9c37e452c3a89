//! Format bridge: streams one file into the store.
//!
//! [`stream_file`] wires four concurrent stages together, all scoped to the
//! call:
//!
//! ```text
//! splitter --chunks--> parser pool --records--> serializer --pipe--> store.bulk_load
//! ```
//!
//! Every link is bounded, so the slowest stage sets the pace. The stages
//! share a [`FirstError`] slot and a cancel token derived from the caller's.
//! A stage that fails records its error, which fires the token; the others
//! notice it, or notice that their neighbour hung up, and exit without
//! recording anything further. The serializer aborts the pipe instead of
//! finishing it when the token has fired, so the store never commits a
//! partial stream.

use crate::cancel::CancelToken;
use crate::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_PARSER_WORKERS, DEFAULT_QUEUE_CAPACITY, DEFAULT_READ_BUFFER,
    LoadConfig, RecordFormat,
};
use crate::error::{LoadError, Result};
use crate::infer::TableSpec;
use crate::io::open_record_source;
use crate::pipeline::parser::{ChunkParser, CsvChunkParser, JsonlChunkParser};
use crate::pipeline::pipe::{PipeWriter, pipe};
use crate::pipeline::splitter::{Boundary, ChunkSplitter, feed_chunks, skip_csv_record};
use crate::pipeline::workers::{FirstError, ParserPool};
use crate::record::Record;
use crate::store::{CopyFormat, StoreError, TableStore};
use crossbeam_channel::{Receiver, bounded};
use std::io::BufReader;
use std::path::Path;
use std::thread;

/// Tuning of one file's pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamOptions {
    pub workers: usize,
    pub read_buffer_size: usize,
    pub queue_capacity: usize,
    pub batch_size: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_PARSER_WORKERS,
            read_buffer_size: DEFAULT_READ_BUFFER,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl From<&LoadConfig> for StreamOptions {
    fn from(cfg: &LoadConfig) -> Self {
        Self {
            workers: cfg.parser_workers,
            read_buffer_size: cfg.read_buffer_size,
            queue_capacity: cfg.queue_capacity,
            batch_size: cfg.batch_size,
        }
    }
}

enum Parser {
    Csv(CsvChunkParser),
    Jsonl(JsonlChunkParser),
}

impl Parser {
    fn as_dyn(&self) -> &dyn ChunkParser {
        match self {
            Parser::Csv(p) => p,
            Parser::Jsonl(p) => p,
        }
    }
}

/// Render one batch as CSV bytes.
fn render_batch(batch: &[Record]) -> Result<Vec<u8>> {
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::with_capacity(batch.len() * 64));
    for record in batch {
        w.write_record(record)
            .map_err(|e| LoadError::parse("serializer", e))?;
    }
    w.into_inner()
        .map_err(|e| LoadError::parse("serializer", e.error()))
}

/// Render and send `batch`; returns false when the pipeline must stop.
fn flush_batch(batch: &mut Vec<Record>, writer: &mut PipeWriter, errors: &FirstError) -> bool {
    if batch.is_empty() {
        return true;
    }
    let bytes = match render_batch(batch) {
        Ok(bytes) => bytes,
        Err(e) => {
            errors.record(e);
            return false;
        }
    };
    batch.clear();
    // a send fails only once the store stopped reading, which it reports itself
    writer.send_block(bytes).is_ok()
}

/// Batch records from `records` into `writer` until the queue closes.
///
/// Returns the number of records written. The pipe is finished only when
/// the queue closed without the token firing; otherwise it is aborted.
fn serialize_records(
    records: Receiver<Record>,
    mut writer: PipeWriter,
    batch_size: usize,
    errors: &FirstError,
) -> u64 {
    let cancel = errors.token();
    let mut batch: Vec<Record> = Vec::with_capacity(batch_size);
    let mut written = 0u64;

    for record in records.iter() {
        if cancel.is_cancelled() {
            break;
        }
        batch.push(record);
        if batch.len() >= batch_size {
            let n = batch.len() as u64;
            if !flush_batch(&mut batch, &mut writer, errors) {
                return written;
            }
            written += n;
        }
    }

    if cancel.is_cancelled() {
        writer.abort("load aborted");
        return written;
    }
    let n = batch.len() as u64;
    if flush_batch(&mut batch, &mut writer, errors) && writer.finish().is_ok() {
        written += n;
        tracing::debug!(records = written, "serializer finished");
    }
    written
}

/// Stream every record of `path` into `spec.name` and return the rows the
/// store reported.
///
/// The table must already exist. The source is opened afresh, decompressed
/// when needed, and for CSV its header line is skipped.
///
/// # Errors
///
/// The first error of any stage: [`LoadError::Source`] for read failures,
/// [`LoadError::Parse`] for malformed records, [`LoadError::Store`] when the
/// bulk load fails, and [`LoadError::Cancelled`] when `cancel` fires.
pub fn stream_file<S: TableStore + ?Sized>(
    store: &S,
    spec: &TableSpec,
    path: &Path,
    format: RecordFormat,
    opts: &StreamOptions,
    cancel: &CancelToken,
) -> Result<u64> {
    let token = cancel.child();
    let errors = FirstError::new(token.clone());

    let mut source = BufReader::new(open_record_source(path).map_err(|e| LoadError::unreadable(path, e))?);
    let (parser, boundary) = match format {
        RecordFormat::Csv => {
            skip_csv_record(&mut source).map_err(|e| LoadError::unreadable(path, e))?;
            (Parser::Csv(CsvChunkParser::new(spec)), Boundary::QuoteAware)
        }
        RecordFormat::JsonLines => (Parser::Jsonl(JsonlChunkParser::new(spec)), Boundary::Newline),
    };

    let (chunk_tx, chunk_rx) = bounded(opts.queue_capacity);
    let (record_tx, record_rx) = bounded(opts.queue_capacity);
    let (writer, mut reader) = pipe(opts.queue_capacity, token.clone());
    let columns = spec.column_names();
    let pool = ParserPool::new(opts.workers);
    let splitter = ChunkSplitter::new(source, opts.read_buffer_size, boundary).with_cancel(token.clone());

    tracing::debug!(file = %path.display(), table = %spec.name, workers = pool.workers(), "streaming started");

    let rows = thread::scope(|s| {
        let errors = &errors;
        let token = &token;
        let parser = parser.as_dyn();

        s.spawn(move || match feed_chunks(splitter, &chunk_tx, token) {
            Ok(chunks) => tracing::debug!(chunks, "splitter finished"),
            Err(e) => {
                errors.record(LoadError::unreadable(path, e));
            }
        });
        s.spawn(move || pool.run(parser, chunk_rx, record_tx, errors));
        s.spawn(move || serialize_records(record_rx, writer, opts.batch_size, errors));

        let loaded = store.bulk_load(&spec.name, &columns, &mut reader, &CopyFormat::default());
        let rows = match loaded {
            Ok(rows) if reader.is_finished() => Some(rows),
            Ok(_) => {
                errors.record(LoadError::Store(StoreError::Load {
                    table: spec.name.clone(),
                    message: "store stopped reading before the end of the data".into(),
                }));
                None
            }
            Err(e) => {
                errors.record(LoadError::Store(e));
                None
            }
        };
        // unblocks a serializer still writing
        drop(reader);
        rows
    });

    if let Parser::Jsonl(p) = &parser {
        let dropped = p.dropped_keys();
        if dropped > 0 {
            tracing::warn!(
                file = %path.display(),
                dropped,
                "ignored keys that were not in the sampled schema"
            );
        }
    }

    match (errors.into_inner(), rows) {
        (Some(err), _) => Err(err),
        (None, _) if cancel.is_cancelled() => Err(LoadError::Cancelled),
        (None, Some(rows)) => Ok(rows),
        (None, None) => Err(LoadError::Cancelled),
    }
}
