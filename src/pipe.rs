//! Bounded in-memory pipe between the writing caller and the transfer worker
//!
//! The pipe is a fixed-capacity ring buffer with a blocking writer end and a
//! blocking reader end. It is the only backpressure mechanism in the crate:
//! once the buffer is full the writer parks until the transfer worker drains
//! bytes into the network.

use crate::transform::SinkLayer;
use log::debug;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Buffer size used when a request does not ask for one (1 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Resolve a configured buffer size, replacing zero with [`DEFAULT_BUFFER_SIZE`]
pub fn resolve_capacity(requested: Option<usize>) -> usize {
    match requested {
        Some(size) if size > 0 => size,
        _ => DEFAULT_BUFFER_SIZE,
    }
}

#[derive(Debug, Clone)]
struct AbortReason {
    kind: io::ErrorKind,
    message: String,
}

impl AbortReason {
    fn to_error(&self) -> io::Error {
        io::Error::new(self.kind, self.message.clone())
    }
}

#[derive(Debug)]
struct PipeState {
    buf: VecDeque<u8>,
    capacity: usize,
    ended: bool,
    abort: Option<AbortReason>,
    reader_released: bool,
    bytes_written: u64,
    bytes_read: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<PipeState>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake_all(&self) {
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}

/// Snapshot of a pipe's counters and flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeStats {
    pub capacity: usize,
    pub buffered: usize,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub ended: bool,
    pub aborted: bool,
    pub reader_released: bool,
}

/// Create a bounded pipe
///
/// A capacity of zero is replaced by [`DEFAULT_BUFFER_SIZE`].
pub fn bounded(capacity: usize) -> (PipeWriter, PipeReader) {
    let capacity = resolve_capacity(Some(capacity));
    let shared = Arc::new(Shared {
        state: Mutex::new(PipeState {
            // Allocation grows on demand so huge capacities stay cheap until used
            buf: VecDeque::with_capacity(capacity.min(64 * 1024)),
            capacity,
            ended: false,
            abort: None,
            reader_released: false,
            bytes_written: 0,
            bytes_read: 0,
        }),
        not_full: Condvar::new(),
        not_empty: Condvar::new(),
    });

    (
        PipeWriter {
            shared: shared.clone(),
        },
        PipeReader { shared },
    )
}

/// Control handle over a pipe, usable from either side
///
/// Used by the transfer worker to abort a writer it can no longer serve and
/// by the sink to guarantee end-of-data and reader release on every path.
#[derive(Debug, Clone)]
pub struct PipeControl {
    shared: Arc<Shared>,
}

impl PipeControl {
    /// Mark that no more data will be written. Idempotent.
    pub fn signal_end(&self) {
        let mut state = self.shared.lock();
        if !state.ended {
            state.ended = true;
            debug!("Pipe end signaled after {} bytes", state.bytes_written);
        }
        drop(state);
        self.shared.wake_all();
    }

    /// Release every blocked reader and writer with an error
    ///
    /// The first reason wins; later aborts are ignored.
    pub fn abort(&self, kind: io::ErrorKind, message: impl Into<String>) {
        let mut state = self.shared.lock();
        if state.abort.is_none() {
            let message = message.into();
            debug!("Pipe aborted: {}", message);
            state.abort = Some(AbortReason { kind, message });
        }
        drop(state);
        self.shared.wake_all();
    }

    /// Discard buffered bytes and refuse further writes
    pub fn release_reader(&self) {
        let mut state = self.shared.lock();
        state.reader_released = true;
        state.buf.clear();
        drop(state);
        self.shared.wake_all();
    }

    /// Current counters and flags
    pub fn stats(&self) -> PipeStats {
        let state = self.shared.lock();
        PipeStats {
            capacity: state.capacity,
            buffered: state.buf.len(),
            bytes_written: state.bytes_written,
            bytes_read: state.bytes_read,
            ended: state.ended,
            aborted: state.abort.is_some(),
            reader_released: state.reader_released,
        }
    }
}

/// Writer end of a bounded pipe
#[derive(Debug)]
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// A control handle over this pipe
    pub fn control(&self) -> PipeControl {
        PipeControl {
            shared: self.shared.clone(),
        }
    }

    /// Fixed capacity of the pipe
    pub fn capacity(&self) -> usize {
        self.shared.lock().capacity
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let mut state = self.shared.lock();
        loop {
            if let Some(reason) = &state.abort {
                return Err(reason.to_error());
            }
            if state.reader_released {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe reader has been released",
                ));
            }
            if state.ended {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe already signaled end of data",
                ));
            }
            if state.buf.len() < state.capacity {
                break;
            }
            state = self
                .shared
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let n = (state.capacity - state.buf.len()).min(data.len());
        state.buf.extend(&data[..n]);
        state.bytes_written += n as u64;
        drop(state);
        self.shared.not_empty.notify_one();
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let state = self.shared.lock();
        match &state.abort {
            Some(reason) => Err(reason.to_error()),
            None => Ok(()),
        }
    }
}

impl SinkLayer for PipeWriter {
    fn close(self: Box<Self>) -> io::Result<()> {
        self.control().signal_end();
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if !state.ended && state.abort.is_none() {
            state.abort = Some(AbortReason {
                kind: io::ErrorKind::UnexpectedEof,
                message: "pipe writer dropped before end of data".to_string(),
            });
            drop(state);
            self.shared.wake_all();
        }
    }
}

/// Reader end of a bounded pipe, consumed once as an upload body
#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// A control handle over this pipe
    pub fn control(&self) -> PipeControl {
        PipeControl {
            shared: self.shared.clone(),
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        let mut state = self.shared.lock();
        loop {
            if let Some(reason) = &state.abort {
                return Err(reason.to_error());
            }
            if state.reader_released {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe reader has been released",
                ));
            }
            if !state.buf.is_empty() {
                break;
            }
            if state.ended {
                return Ok(0);
            }
            state = self
                .shared
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let n = out.len().min(state.buf.len());
        for (dst, src) in out.iter_mut().zip(state.buf.drain(..n)) {
            *dst = src;
        }
        state.bytes_read += n as u64;
        drop(state);
        self.shared.not_full.notify_one();
        Ok(n)
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.control().release_reader();
    }
}
