//! Bounded in-memory byte stream between the serializer and the bulk load.
//!
//! The writer half moves whole blocks into a bounded queue, so a slow store
//! throttles the serializer. The stream ends in one of three ways:
//!
//! - [`PipeWriter::finish`]: the reader sees end-of-data.
//! - [`PipeWriter::abort`]: the reader fails with the given reason.
//! - the writer is dropped without either: the reader fails with
//!   [`ErrorKind::UnexpectedEof`], so a crashed producer never looks like a
//!   complete load.
//!
//! The reader also fails once the pipeline's cancel token fires.

use crate::cancel::CancelToken;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;

const CANCEL_POLL: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub enum PipeMessage {
    Data(Vec<u8>),
    Done,
    Abort(String),
}

/// Create a pipe holding at most `capacity` blocks in flight.
pub fn pipe(capacity: usize, cancel: CancelToken) -> (PipeWriter, PipeReader) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            block: Vec::new(),
            pos: 0,
            finished: false,
            failure: None,
            cancel,
        },
    )
}

fn broken_pipe() -> io::Error {
    io::Error::new(ErrorKind::BrokenPipe, "bulk load stopped reading")
}

/// Sole producer of a pipe.
pub struct PipeWriter {
    tx: Sender<PipeMessage>,
}

impl PipeWriter {
    /// Send a block without copying it.
    pub fn send_block(&mut self, block: Vec<u8>) -> io::Result<()> {
        if block.is_empty() {
            return Ok(());
        }
        self.tx
            .send(PipeMessage::Data(block))
            .map_err(|_| broken_pipe())
    }

    /// Signal end-of-data.
    pub fn finish(self) -> io::Result<()> {
        self.tx.send(PipeMessage::Done).map_err(|_| broken_pipe())
    }

    /// Make the reader fail with `reason`.
    pub fn abort(self, reason: impl Into<String>) {
        // the reader may already be gone
        let _ = self.tx.send(PipeMessage::Abort(reason.into()));
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send_block(buf.to_vec())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sole consumer of a pipe, handed to the store's bulk load.
pub struct PipeReader {
    rx: Receiver<PipeMessage>,
    block: Vec<u8>,
    pos: usize,
    finished: bool,
    failure: Option<String>,
    cancel: CancelToken,
}

impl PipeReader {
    /// True once the writer finished and every byte has been read.
    pub fn is_finished(&self) -> bool {
        self.finished && self.pos >= self.block.len()
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.block.len() {
                let n = buf.len().min(self.block.len() - self.pos);
                buf[..n].copy_from_slice(&self.block[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            if let Some(reason) = &self.failure {
                return Err(io::Error::other(reason.clone()));
            }
            if self.cancel.is_cancelled() {
                return Err(io::Error::other("cancelled"));
            }
            match self.rx.recv_timeout(CANCEL_POLL) {
                Ok(PipeMessage::Data(block)) => {
                    self.block = block;
                    self.pos = 0;
                }
                Ok(PipeMessage::Done) => self.finished = true,
                Ok(PipeMessage::Abort(reason)) => self.failure = Some(reason),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "record stream closed without finishing",
                    ));
                }
            }
        }
    }
}
