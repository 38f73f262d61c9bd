//! Poller counters.
//!
//! Written by the poller thread with relaxed atomics, readable from any
//! thread at any time. Counters survive a shutdown/restart of the same
//! `AsyncSelect`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PollerStats {
    cycles: AtomicU64,
    polls: AtomicU64,
    poll_errors: AtomicU64,
    events: AtomicU64,
    closes: AtomicU64,
}

/// Point-in-time copy of [`PollerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Cycles that found at least one entry.
    pub cycles: u64,
    /// Multiplexer calls.
    pub polls: u64,
    /// Multiplexer calls that failed (and dispatched nothing).
    pub poll_errors: u64,
    /// Callbacks invoked.
    pub events: u64,
    /// Entries removed after a CLOSE event.
    pub closes: u64,
}

impl PollerStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn poll_error(&self) {
        self.poll_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn close(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
        }
    }
}
