//! Transparent decompression of record sources.
//!
//! Sources are opened through [`open_record_source`], which wraps the file in
//! a decompressor when it is compressed and otherwise hands back a buffered
//! reader. The returned reader is `Send` so it can be moved into the splitter
//! thread.
//!
//! ## Built-in Codecs
//!
//! - **Gzip** (`.gz`) - via `flate2` (feature: `compression-gzip`, default)
//! - **Zstd** (`.zst`) - via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` (feature: `compression-xz`)
//!
//! ## Detection
//! File extensions are checked first, falling back to magic bytes only when
//! the name says nothing. This avoids peeking at file headers in the common
//! case and still catches compressed files with misleading names.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Boxed source handed to the splitter.
pub type RecordSource = Box<dyn Read + Send>;

/// A decompression algorithm that can wrap a raw byte source.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &'static str;

    /// File extensions associated with this codec, lowercase with the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Magic byte signature for content-based detection.
    fn magic_bytes(&self) -> &'static [u8];

    /// Wrap a reader with decompression.
    fn wrap_reader(&self, reader: RecordSource) -> io::Result<RecordSource>;
}

static CODECS: &[&dyn CompressionCodec] = &[
    #[cfg(feature = "compression-gzip")]
    &GzipCodec,
    #[cfg(feature = "compression-zstd")]
    &ZstdCodec,
    #[cfg(feature = "compression-bzip2")]
    &Bzip2Codec,
    #[cfg(feature = "compression-xz")]
    &XzCodec,
];

/// Codecs compiled into this build.
pub fn codecs() -> &'static [&'static dyn CompressionCodec] {
    CODECS
}

fn detect_from_extension(path: &Path) -> Option<&'static dyn CompressionCodec> {
    let name = path.to_string_lossy().to_lowercase();
    codecs()
        .iter()
        .copied()
        .find(|c| c.extensions().iter().any(|ext| name.ends_with(ext)))
}

fn detect_from_magic<R: BufRead>(reader: &mut R) -> io::Result<Option<&'static dyn CompressionCodec>> {
    let buf = reader.fill_buf()?;
    Ok(codecs()
        .iter()
        .copied()
        .find(|c| !buf.is_empty() && buf.starts_with(c.magic_bytes())))
}

/// Wrap `reader` with a decompressor chosen from `path_hint` or the stream's magic bytes.
pub fn auto_detect_reader<R: Read + Send + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> io::Result<RecordSource> {
    if let Some(codec) = detect_from_extension(path_hint.as_ref()) {
        tracing::debug!(codec = codec.name(), path = %path_hint.as_ref().display(), "decompressing by extension");
        return codec.wrap_reader(Box::new(reader));
    }

    let mut buffered = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buffered)? {
        tracing::debug!(codec = codec.name(), path = %path_hint.as_ref().display(), "decompressing by magic bytes");
        return codec.wrap_reader(Box::new(buffered));
    }
    Ok(Box::new(buffered))
}

/// Open a local file as a record byte stream, decompressing transparently.
pub fn open_record_source(path: impl AsRef<Path>) -> io::Result<RecordSource> {
    let path = path.as_ref();
    let file = File::open(path)?;
    auto_detect_reader(file, path)
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> &'static [u8] {
        &[0x1f, 0x8b]
    }

    fn wrap_reader(&self, reader: RecordSource) -> io::Result<RecordSource> {
        // concatenated gzip members are common for appended log exports
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> &'static [u8] {
        &[0x28, 0xb5, 0x2f, 0xfd]
    }

    fn wrap_reader(&self, reader: RecordSource) -> io::Result<RecordSource> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as RecordSource)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> &'static [u8] {
        &[0x42, 0x5a, 0x68]
    }

    fn wrap_reader(&self, reader: RecordSource) -> io::Result<RecordSource> {
        Ok(Box::new(bzip2::read::BzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &'static str {
        "xz"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> &'static [u8] {
        &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]
    }

    fn wrap_reader(&self, reader: RecordSource) -> io::Result<RecordSource> {
        Ok(Box::new(xz2::read::XzDecoder::new(reader)))
    }
}
