//! External sequence sources
//!
//! The ledger never generates its own ordering. Every write and every rate
//! query reads the current value from a [`SequenceSource`]: a block height fed
//! in by the host, a test-controlled counter, or wall-clock seconds.

use std::sync::atomic::{AtomicU64, Ordering};

/// Supplies the current external sequence value
pub trait SequenceSource: Send + Sync {
    /// Current sequence; expected to be non-decreasing across calls
    fn current(&self) -> u64;
}

/// Sequence advanced explicitly by the embedding host (or a test)
#[derive(Debug, Default)]
pub struct ManualSequence {
    value: AtomicU64,
}

impl ManualSequence {
    /// Start at `initial`
    pub fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    /// Jump to `value`
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Move forward by `by` and return the new value, stopping at `u64::MAX`
    pub fn advance(&self, by: u64) -> u64 {
        let step = |v: u64| Some(v.saturating_add(by));
        match self
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, step)
        {
            Ok(prev) | Err(prev) => prev.saturating_add(by),
        }
    }
}

impl SequenceSource for ManualSequence {
    fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

/// Wall-clock seconds since the Unix epoch
#[derive(Debug, Default, Clone, Copy)]
pub struct ClockSequence;

impl SequenceSource for ClockSequence {
    fn current(&self) -> u64 {
        // Pre-epoch clocks clamp to zero
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }
}
