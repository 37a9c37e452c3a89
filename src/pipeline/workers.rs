//! Parser Worker Pool and the pipeline's first-error collector.

use crate::cancel::CancelToken;
use crate::error::LoadError;
use crate::pipeline::parser::ChunkParser;
use crate::pipeline::splitter::Chunk;
use crate::record::Record;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

/// First-error-wins slot shared by every stage of one file's pipeline.
///
/// Recording an error also fires the pipeline's cancel token so sibling
/// stages wind down. Once the token has fired, a later error is only a
/// consequence of the shutdown: if nothing was recorded yet (the caller
/// cancelled), the slot keeps [`LoadError::Cancelled`] instead.
pub struct FirstError {
    slot: Mutex<Option<LoadError>>,
    cancel: CancelToken,
}

impl FirstError {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            slot: Mutex::new(None),
            cancel,
        }
    }

    /// Record `err`; returns true when it became the reported error.
    pub fn record(&self, err: LoadError) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let first = slot.is_none();
        if first {
            let err = if self.cancel.is_cancelled() {
                LoadError::Cancelled
            } else {
                err
            };
            tracing::debug!(error = %err, "pipeline error recorded");
            *slot = Some(err);
        }
        drop(slot);
        self.cancel.cancel();
        first
    }

    pub fn is_set(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    /// The recorded error, if any.
    pub fn into_inner(self) -> Option<LoadError> {
        self.slot.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A fixed number of threads parsing chunks concurrently.
///
/// Records of one chunk leave in chunk order; records of different chunks
/// interleave freely.
#[derive(Clone, Copy, Debug)]
pub struct ParserPool {
    workers: usize,
}

impl ParserPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Parse every chunk from `chunks` and send the records to `records`.
    ///
    /// Returns once every worker has exited, which happens when the chunk
    /// queue is drained and closed, when the token in `errors` fires, or when
    /// the record consumer is gone. The first parse error is recorded in
    /// `errors`. Returns the number of records sent.
    pub fn run<P: ChunkParser + ?Sized>(
        &self,
        parser: &P,
        chunks: Receiver<Chunk>,
        records: Sender<Record>,
        errors: &FirstError,
    ) -> u64 {
        let produced = AtomicU64::new(0);
        thread::scope(|s| {
            for id in 0..self.workers {
                let chunks = chunks.clone();
                let records = records.clone();
                let produced = &produced;
                s.spawn(move || {
                    let sent = parse_worker(id, parser, &chunks, &records, errors);
                    produced.fetch_add(sent, Ordering::Relaxed);
                });
            }
            drop(chunks);
            drop(records);
        });
        produced.into_inner()
    }
}

fn parse_worker<P: ChunkParser + ?Sized>(
    id: usize,
    parser: &P,
    chunks: &Receiver<Chunk>,
    records: &Sender<Record>,
    errors: &FirstError,
) -> u64 {
    let cancel = errors.token();
    let mut local = Vec::new();
    let mut sent = 0;
    for chunk in chunks.iter() {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(e) = parser.parse_chunk(&chunk, &mut local) {
            errors.record(e);
            break;
        }
        for record in local.drain(..) {
            if records.send(record).is_err() {
                tracing::debug!(worker = id, sent, "record consumer gone");
                return sent;
            }
            sent += 1;
        }
    }
    tracing::debug!(worker = id, sent, "parser worker finished");
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crossbeam_channel::{bounded, unbounded};

    struct Lines;

    impl ChunkParser for Lines {
        fn parse_chunk(&self, chunk: &Chunk, out: &mut Vec<Record>) -> Result<()> {
            for line in chunk.data.split(|&b| b == b'\n').filter(|l| !l.is_empty()) {
                if line == b"bad" {
                    return Err(LoadError::parse(format!("chunk {}", chunk.seq), "bad line"));
                }
                out.push(vec![String::from_utf8_lossy(line).into_owned()]);
            }
            Ok(())
        }
    }

    fn chunk(seq: u64, data: &str) -> Chunk {
        Chunk {
            seq,
            data: data.as_bytes().to_vec(),
            terminated: true,
        }
    }

    #[test]
    fn all_records_arrive_and_chunk_order_is_kept() {
        let (ctx, crx) = bounded(4);
        let (rtx, rrx) = unbounded();
        let errors = FirstError::new(CancelToken::new());
        let feeder = thread::spawn(move || {
            for i in 0..50u64 {
                ctx.send(chunk(i, &format!("{i}-a\n{i}-b\n"))).unwrap();
            }
        });
        let sent = ParserPool::new(3).run(&Lines, crx, rtx, &errors);
        feeder.join().unwrap();

        let got: Vec<String> = rrx.iter().map(|mut r| r.remove(0)).collect();
        assert_eq!(sent, 100);
        assert_eq!(got.len(), 100);
        for i in 0..50 {
            let a = got.iter().position(|r| *r == format!("{i}-a")).unwrap();
            let b = got.iter().position(|r| *r == format!("{i}-b")).unwrap();
            assert!(a < b);
        }
        assert!(errors.into_inner().is_none());
    }

    #[test]
    fn first_error_wins_and_cancels() {
        let (ctx, crx) = unbounded();
        let (rtx, _rrx) = unbounded();
        for i in 0..10 {
            ctx.send(chunk(i, "bad\n")).unwrap();
        }
        drop(ctx);
        let errors = FirstError::new(CancelToken::new());
        ParserPool::new(4).run(&Lines, crx, rtx, &errors);
        assert!(errors.token().is_cancelled());
        assert!(matches!(errors.into_inner(), Some(LoadError::Parse { .. })));
    }

    #[test]
    fn errors_after_cancellation_become_cancelled() {
        let parent = CancelToken::new();
        let errors = FirstError::new(parent.child());
        parent.cancel();
        assert!(errors.record(LoadError::Schema("late".into())));
        assert!(!errors.record(LoadError::Schema("later".into())));
        assert!(matches!(errors.into_inner(), Some(LoadError::Cancelled)));
    }
}
