//! Single-settle completion cell shared by the sink and the transfer worker
//!
//! The worker settles the outcome once; the sink blocks on it while closing.
//! Settling races (e.g. a failure guard firing after a normal result) are
//! resolved by the first writer: every later attempt is a no-op.

use crate::error::TransferError;
use crate::transfer::TransferReport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Result carried by a settled outcome
pub type TransferResult = std::result::Result<TransferReport, TransferError>;

enum Slot {
    Pending,
    Settled(TransferResult),
    Taken,
}

/// A once-settled transfer result with a blocking wait
pub struct TransferOutcome {
    settled: AtomicBool,
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl Default for TransferOutcome {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransferOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferOutcome")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl TransferOutcome {
    /// Create a pending outcome
    pub fn new() -> Self {
        Self {
            settled: AtomicBool::new(false),
            slot: Mutex::new(Slot::Pending),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a result has been recorded
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Record the result; returns `false` if another result won the race
    pub fn settle(&self, result: TransferResult) -> bool {
        if self
            .settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        *self.lock() = Slot::Settled(result);
        self.ready.notify_all();
        true
    }

    /// Block until settled and take the result
    ///
    /// The result can be taken once; later calls return `None`.
    pub fn wait(&self) -> Option<TransferResult> {
        let mut slot = self.lock();
        loop {
            match std::mem::replace(&mut *slot, Slot::Taken) {
                Slot::Pending => {
                    *slot = Slot::Pending;
                    slot = self
                        .ready
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Slot::Settled(result) => return Some(result),
                Slot::Taken => return None,
            }
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`
    ///
    /// Returns `Err(())` if the outcome is still pending when the timeout expires.
    #[allow(clippy::result_unit_err)]
    pub fn wait_timeout(&self, timeout: Duration) -> std::result::Result<Option<TransferResult>, ()> {
        let slot = self.lock();
        let (mut slot, _) = self
            .ready
            .wait_timeout_while(slot, timeout, |slot| matches!(slot, Slot::Pending))
            .unwrap_or_else(PoisonError::into_inner);

        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Pending => {
                *slot = Slot::Pending;
                Err(())
            }
            Slot::Settled(result) => Ok(Some(result)),
            Slot::Taken => Ok(None),
        }
    }
}
