//! Record Boundary Splitter.
//!
//! Turns a byte source into chunks that always end on a record boundary, so
//! each chunk can be parsed on its own by any worker. Bytes after the last
//! boundary of a read are carried over to the next chunk; a record longer
//! than the read buffer simply grows that carry-over until its terminator
//! shows up. Concatenating every emitted chunk reproduces the source exactly
//! (terminators are kept inside the chunks).
//!
//! Two boundary rules exist:
//! - [`Boundary::Newline`]: the last `\n` of each read, found by a backward
//!   scan. Used for JSON-Lines, where a newline can never appear inside a
//!   record.
//! - [`Boundary::QuoteAware`]: the last `\n` that sits outside a
//!   double-quoted field, found by a forward scan that follows CSV field
//!   state across reads. Used for CSV, whose quoted fields may span lines.
//!   A quote only opens a field when it is the field's first byte; a quote
//!   in the middle of an unquoted field (`12" pipe`) is literal.

use crate::cancel::CancelToken;
use crossbeam_channel::Sender;
use std::io::{self, BufRead, ErrorKind, Read};

/// A record-aligned slice of the input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the source, starting at 0.
    pub seq: u64,
    pub data: Vec<u8>,
    /// False only for a final chunk whose last record had no terminator.
    pub terminated: bool,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Where a chunk may end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Boundary {
    #[default]
    Newline,
    QuoteAware,
}

/// Position inside a CSV record, one byte at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum CsvScan {
    #[default]
    FieldStart,
    Unquoted,
    Quoted,
    /// A quote seen inside a quoted field: either its end or the first half of `""`.
    QuoteInQuoted,
}

impl CsvScan {
    /// Advance over `b`; true when `b` is a `\n` ending a record.
    fn step(&mut self, b: u8) -> bool {
        use CsvScan::*;
        let (next, ends) = match (*self, b) {
            (Quoted, b'"') => (QuoteInQuoted, false),
            (Quoted, _) => (Quoted, false),
            (QuoteInQuoted, b'"') => (Quoted, false),
            (FieldStart, b'"') => (Quoted, false),
            (_, b'\n') => (FieldStart, true),
            (_, b',' | b'\r') => (FieldStart, false),
            (_, _) => (Unquoted, false),
        };
        *self = next;
        ends
    }
}

/// Consume the first non-blank CSV record of `reader`, quoted newlines
/// included. Blank lines before it are consumed too.
pub fn skip_csv_record<R: BufRead>(reader: &mut R) -> io::Result<()> {
    let mut scan = CsvScan::default();
    let mut content = false;
    loop {
        let (used, done) = {
            let buf = match reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if buf.is_empty() {
                return Ok(());
            }
            let mut end = None;
            for (i, &b) in buf.iter().enumerate() {
                content |= !b.is_ascii_whitespace();
                if scan.step(b) && content {
                    end = Some(i + 1);
                    break;
                }
            }
            (end.unwrap_or(buf.len()), end.is_some())
        };
        reader.consume(used);
        if done {
            return Ok(());
        }
    }
}

/// Iterator of record-aligned chunks over a reader.
///
/// ```
/// use bulkload::pipeline::splitter::{Boundary, ChunkSplitter};
///
/// let input = b"a\nbb\nccc".as_slice();
/// let chunks: Vec<_> = ChunkSplitter::new(input, 3, Boundary::Newline)
///     .collect::<std::io::Result<_>>()
///     .unwrap();
/// let joined: Vec<u8> = chunks.iter().flat_map(|c| c.data.clone()).collect();
/// assert_eq!(joined, b"a\nbb\nccc");
/// assert!(chunks.iter().all(|c| !c.terminated || c.data.ends_with(b"\n")));
/// ```
pub struct ChunkSplitter<R> {
    reader: R,
    buf: Vec<u8>,
    leftover: Vec<u8>,
    boundary: Boundary,
    seq: u64,
    done: bool,
    // quote-aware state: bytes of `leftover` already scanned, and the field state there
    scanned: usize,
    scan: CsvScan,
    cancel: Option<CancelToken>,
}

impl<R: Read> ChunkSplitter<R> {
    /// Create a splitter reading at most `buf_size` bytes at a time.
    pub fn new(reader: R, buf_size: usize, boundary: Boundary) -> Self {
        Self {
            reader,
            buf: vec![0; buf_size.max(1)],
            leftover: Vec::new(),
            boundary,
            seq: 0,
            done: false,
            scanned: 0,
            scan: CsvScan::default(),
            cancel: None,
        }
    }

    /// Stop reading once `cancel` fires. The token is checked before every
    /// read, so a record longer than the buffer does not keep the splitter
    /// reading to the end of the source.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    fn emit(&mut self, data: Vec<u8>, terminated: bool) -> Chunk {
        let chunk = Chunk {
            seq: self.seq,
            data,
            terminated,
        };
        self.seq += 1;
        chunk
    }

    fn absorb_newline(&mut self, n: usize) -> Option<Chunk> {
        let block = &self.buf[..n];
        match block.iter().rposition(|&b| b == b'\n') {
            None => {
                self.leftover.extend_from_slice(block);
                None
            }
            Some(pos) => {
                let mut data = std::mem::take(&mut self.leftover);
                data.extend_from_slice(&block[..=pos]);
                self.leftover.extend_from_slice(&block[pos + 1..]);
                Some(self.emit(data, true))
            }
        }
    }

    fn absorb_quote_aware(&mut self, n: usize) -> Option<Chunk> {
        self.leftover.extend_from_slice(&self.buf[..n]);
        let mut last = None;
        for (i, &b) in self.leftover.iter().enumerate().skip(self.scanned) {
            if self.scan.step(b) {
                last = Some(i);
            }
        }
        self.scanned = self.leftover.len();

        let pos = last?;
        let rest = self.leftover.split_off(pos + 1);
        let data = std::mem::replace(&mut self.leftover, rest);
        self.scanned = self.leftover.len();
        Some(self.emit(data, true))
    }
}

impl<R: Read> Iterator for ChunkSplitter<R> {
    type Item = io::Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.cancelled() {
                self.done = true;
                return None;
            }
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    if self.leftover.is_empty() {
                        return None;
                    }
                    let data = std::mem::take(&mut self.leftover);
                    return Some(Ok(self.emit(data, false)));
                }
                Ok(n) => {
                    let chunk = match self.boundary {
                        Boundary::Newline => self.absorb_newline(n),
                        Boundary::QuoteAware => self.absorb_quote_aware(n),
                    };
                    if chunk.is_some() {
                        return chunk.map(Ok);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Feed every chunk of `splitter` into a bounded queue.
///
/// Blocks while the queue is full. Stops early, without error, when `cancel`
/// fires or every receiver is gone. Returns the number of chunks sent.
pub fn feed_chunks<R: Read>(
    splitter: ChunkSplitter<R>,
    chunks: &Sender<Chunk>,
    cancel: &CancelToken,
) -> io::Result<u64> {
    let mut sent = 0;
    for chunk in splitter {
        if cancel.is_cancelled() {
            tracing::debug!(sent, "splitter stopped by cancellation");
            break;
        }
        if chunks.send(chunk?).is_err() {
            tracing::debug!(sent, "splitter stopped, no chunk consumers left");
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn split(input: &[u8], size: usize, boundary: Boundary) -> Vec<Chunk> {
        ChunkSplitter::new(input, size, boundary)
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn long_record_grows_leftover() {
        let chunks = split(b"0123456789\nab\n", 4, Boundary::Newline);
        assert_eq!(chunks[0].data, b"0123456789\n");
        assert!(chunks.iter().all(|c| c.terminated));
    }

    #[test]
    fn final_unterminated_record_is_emitted() {
        let chunks = split(b"x\ny", 16, Boundary::Newline);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].data, b"y");
        assert!(!chunks[1].terminated);
    }

    #[test]
    fn empty_input_has_no_chunks() {
        assert!(split(b"", 8, Boundary::Newline).is_empty());
    }

    #[test]
    fn sequence_numbers_are_dense() {
        let chunks = split(b"a\nb\nc\nd\n", 2, Boundary::Newline);
        let seqs: Vec<_> = chunks.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, (0..chunks.len() as u64).collect::<Vec<_>>());
    }

    #[test]
    fn quoted_newlines_do_not_end_chunks() {
        let input = b"1,\"line one\nline two\"\n2,plain\n";
        for size in 1..input.len() + 2 {
            for chunk in split(input, size, Boundary::QuoteAware) {
                let quotes = chunk.data.iter().filter(|&&b| b == b'"').count();
                assert_eq!(quotes % 2, 0, "chunk split inside quotes at size {size}");
            }
        }
    }

    #[test]
    fn stray_quote_in_unquoted_field_is_literal() {
        let input = b"1,12\" pipe\n2,\"multi\nline\"\n3,x\n";
        for size in 1..input.len() + 2 {
            let chunks = split(input, size, Boundary::QuoteAware);
            for chunk in &chunks {
                assert!(
                    !chunk.data.ends_with(b"\"multi\n"),
                    "size {size}: chunk cut inside a quoted field"
                );
            }
            let ends: usize = chunks.iter().map(|c| c.data.len()).sum();
            assert_eq!(ends, input.len());
        }
    }

    #[test]
    fn skip_csv_record_honors_quoted_newlines() {
        let mut r = io::BufReader::with_capacity(3, b"\n\"first\nname\",b\n1,2\n".as_slice());
        skip_csv_record(&mut r).unwrap();
        let mut rest = String::new();
        r.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "1,2\n");
    }

    #[test]
    fn cancelled_splitter_stops_reading() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut it = ChunkSplitter::new(b"no terminator here".as_slice(), 2, Boundary::Newline)
            .with_cancel(cancel);
        assert!(it.next().is_none());
    }

    #[test]
    fn escaped_quotes_keep_parity() {
        let input = b"\"a\"\"b\"\nc\n";
        let chunks = split(input, 1, Boundary::QuoteAware);
        assert_eq!(chunks[0].data, b"\"a\"\"b\"\n");
        assert_eq!(chunks[1].data, b"c\n");
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::InvalidData, "corrupt"))
        }
    }

    #[test]
    fn read_error_is_surfaced_once() {
        let mut it = ChunkSplitter::new(Failing, 8, Boundary::Newline);
        assert!(matches!(it.next(), Some(Err(_))));
        assert!(it.next().is_none());
    }

    #[test]
    fn feed_stops_when_receiver_is_gone() {
        let (tx, rx) = bounded(1);
        drop(rx);
        let sent = feed_chunks(
            ChunkSplitter::new(b"a\nb\n".as_slice(), 2, Boundary::Newline),
            &tx,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(sent, 0);
    }

    #[test]
    fn feed_stops_on_cancel() {
        let (tx, rx) = bounded(8);
        let cancel = CancelToken::new();
        cancel.cancel();
        let sent = feed_chunks(
            ChunkSplitter::new(b"a\nb\n".as_slice(), 2, Boundary::Newline),
            &tx,
            &cancel,
        )
        .unwrap();
        assert_eq!(sent, 0);
        assert!(rx.try_recv().is_err());
    }
}
