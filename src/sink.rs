//! The blocking sink handed to callers
//!
//! Writes go through the transform layers into the bounded pipe while the
//! transfer worker drains the pipe into the network. Closing the sink is the
//! only synchronization point: it returns once the upload has definitively
//! succeeded or failed.

use crate::error::{Result, StreamifyError};
use crate::pipe::{PipeControl, PipeStats};
use crate::transfer::{TransferHandle, TransferReport};
use crate::transform::SinkLayer;
use log::warn;
use std::io::{self, Write};

/// Lifecycle of a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Writes are accepted
    Accepting,
    /// Close has begun; layers are finishing and the transfer is draining
    Closing,
    /// The transfer outcome is known, resources are being released
    Settled,
    /// The transfer settled and every resource was released
    Closed,
}

/// Write end of an upload
pub struct StreamingSink {
    top: Option<Box<dyn SinkLayer>>,
    control: PipeControl,
    transfer: TransferHandle,
    state: SinkState,
}

impl std::fmt::Debug for StreamingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSink")
            .field("url", &self.transfer.url())
            .field("state", &self.state)
            .finish()
    }
}

impl StreamingSink {
    /// Assemble a sink from its outermost layer, the pipe control and the running transfer
    pub fn new(top: Box<dyn SinkLayer>, control: PipeControl, transfer: TransferHandle) -> Self {
        Self {
            top: Some(top),
            control,
            transfer,
            state: SinkState::Accepting,
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Destination of the upload
    pub fn url(&self) -> &str {
        self.transfer.url()
    }

    /// Counters of the underlying pipe
    pub fn pipe_stats(&self) -> PipeStats {
        self.control.stats()
    }

    /// Finish every layer, wait for the transfer and report its result
    ///
    /// A transfer failure always takes precedence; a layer that failed to
    /// close is attached to it as the suppressed error. Only the first call
    /// does any work, later calls return [`StreamifyError::SinkClosed`].
    pub fn close(&mut self) -> Result<TransferReport> {
        if self.state != SinkState::Accepting {
            return Err(StreamifyError::SinkClosed);
        }
        self.state = SinkState::Closing;

        let layers = match self.top.take() {
            Some(top) => top.close(),
            None => Ok(()),
        };

        // The worker must see an end on every path or it would read forever
        match &layers {
            Ok(()) => self.control.signal_end(),
            Err(e) => self
                .control
                .abort(e.kind(), format!("sink layers failed to close: {}", e)),
        }

        let outcome = self.transfer.wait();
        self.state = SinkState::Settled;
        self.control.release_reader();
        self.state = SinkState::Closed;

        let release = layers
            .err()
            .map(|e| StreamifyError::resource_release("transform chain", e));

        match (outcome, release) {
            (Ok(report), None) => Ok(report),
            (Ok(_), Some(release)) => Err(release),
            (Err(transfer), release) => Err(StreamifyError::transfer(transfer, release)),
        }
    }

    /// Close by value
    pub fn finish(mut self) -> Result<TransferReport> {
        self.close()
    }

    /// Close on tokio's blocking pool
    pub async fn close_async(mut self) -> Result<TransferReport> {
        tokio::task::spawn_blocking(move || self.close())
            .await
            .map_err(|e| StreamifyError::Io(io::Error::other(e)))?
    }
}

impl Write for StreamingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match (self.state, self.top.as_mut()) {
            (SinkState::Accepting, Some(top)) => top.write(buf),
            _ => Err(StreamifyError::SinkClosed.into_io()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match (self.state, self.top.as_mut()) {
            (SinkState::Accepting, Some(top)) => top.flush(),
            _ => Err(StreamifyError::SinkClosed.into_io()),
        }
    }
}

impl Drop for StreamingSink {
    fn drop(&mut self) {
        if self.state == SinkState::Accepting {
            warn!(
                "Sink for '{}' dropped without close, aborting upload",
                self.transfer.url()
            );
            // Abort before dropping layers: their drop glue may try to flush into the pipe
            self.control
                .abort(io::ErrorKind::Other, "sink dropped before close");
            self.top.take();
        }
    }
}
