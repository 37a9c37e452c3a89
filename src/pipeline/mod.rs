//! Per-file streaming pipeline.
//!
//! - [`splitter`]: record-aligned chunks from a byte source
//! - [`parser`]: chunk parsers for CSV and JSON-Lines
//! - [`workers`]: the parser pool and first-error collector
//! - [`pipe`]: bounded byte stream into the store
//! - [`bridge`]: wires the stages together in [`stream_file`]

pub mod bridge;
pub mod parser;
pub mod pipe;
pub mod splitter;
pub mod workers;

pub use bridge::{StreamOptions, stream_file};
pub use parser::{ChunkParser, CsvChunkParser, JsonlChunkParser};
pub use pipe::{PipeReader, PipeWriter, pipe};
pub use splitter::{Boundary, Chunk, ChunkSplitter};
pub use workers::{FirstError, ParserPool};
