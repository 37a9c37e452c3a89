//! Opening record sources and discovering input files.

pub mod compression;
pub mod glob;

pub use compression::{RecordSource, open_record_source};
pub use glob::{expand_glob, expand_inputs};
