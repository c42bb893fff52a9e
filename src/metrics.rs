//! Optional execution counters for the pool.
//!
//! Compiled in only with the `metrics` feature; the counters are relaxed
//! atomics bumped on the dispatch paths, cheap enough to leave on in
//! benchmarking builds.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by the pool's shared state.
#[derive(Debug)]
pub struct Metrics {
    /// Dispatches through `run`.
    pub runs: AtomicU64,
    /// Tiles executed by their owning slot.
    pub owned_tiles: AtomicU64,
    /// Tiles stolen from a peer's tail.
    pub stolen_tiles: AtomicU64,
    /// Times a worker exhausted its spin budget and parked on the condvar.
    pub parked_waits: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            runs: AtomicU64::new(0),
            owned_tiles: AtomicU64::new(0),
            stolen_tiles: AtomicU64::new(0),
            parked_waits: AtomicU64::new(0),
        }
    }

    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            owned_tiles: self.owned_tiles.load(Ordering::Relaxed),
            stolen_tiles: self.stolen_tiles.load(Ordering::Relaxed),
            parked_waits: self.parked_waits.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

/// Point-in-time copy of the pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub runs: u64,
    pub owned_tiles: u64,
    pub stolen_tiles: u64,
    pub parked_waits: u64,
}

impl MetricsSnapshot {
    /// Total tiles executed in all runs so far.
    pub fn total_tiles(&self) -> u64 {
        self.owned_tiles + self.stolen_tiles
    }
}
