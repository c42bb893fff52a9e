//! # tilepool - CPU-Pinned Worker Pool for Tiled Numeric Loops
//!
//! A fixed-size worker pool for data-parallel numeric workloads on a single
//! machine, tuned for heterogeneous CPUs such as ARM big.LITTLE. The pool
//! evaluates an indexed body across a preconfigured set of worker threads
//! with CPU affinity pinning, range-based work stealing, and a hybrid
//! spin/wait wakeup discipline sized for microsecond-scale tasks.
//!
//! ## Architecture
//!
//! - **Worker slots**: each thread owns a contiguous index range, consumed
//!   from the head by its owner and from the tail by stealing peers.
//! - **Event word**: a single atomic broadcasting INIT/RUN/SHUTDOWN commands
//!   plus a generation marker so back-to-back runs stay distinguishable.
//! - **Countdown latch**: the submitter observes completion without
//!   oversleeping by spinning briefly before parking on a condition variable.
//! - **Tile planner**: `compute_1d`/`compute_2d`/`compute_3d` slice stepped
//!   iteration spaces into tiles and map tile indices back to sub-ranges.
//!
//! ## Example
//!
//! ```no_run
//! use tilepool::{AffinityPolicy, TilePool};
//!
//! let mut pool = TilePool::new(4, AffinityPolicy::BigOnly);
//! pool.init();
//!
//! pool.compute_1d(
//!     |start, end, step| {
//!         for _i in (start..end).step_by(step) {
//!             // process item i
//!         }
//!     },
//!     0,
//!     1 << 20,
//!     1, // range and step
//!     0, // tile size: pick a default
//!     1, // rough cost per item
//! );
//! ```

use std::time::Duration;

pub mod latch;
pub mod topology;

mod compute;
mod event;
#[cfg(feature = "metrics")]
pub mod metrics;
mod pool;
mod worker;

pub use latch::CountdownLatch;
#[cfg(feature = "metrics")]
pub use metrics::MetricsSnapshot;
pub use pool::TilePool;
pub use topology::{AffinityPolicy, TopologyError};

/// Budget for busy-spinning before a waiter parks on a condition variable.
///
/// Worker tasks are typically microseconds long; spinning first avoids the
/// park/unpark cost for the common short case while bounding wasted CPU when
/// a run takes longer. Exposed so benchmarks can reference the tuning point.
pub const SPIN_WAIT_BUDGET: Duration = Duration::from_nanos(2_000_000);

/// Tiles targeted per worker on machines with asymmetric cores, so faster
/// cores can steal extra tiles from slower ones.
pub(crate) const TILES_PER_WORKER: usize = 2;

/// Below this many cost units a parallel dispatch costs more than it saves.
pub(crate) const SINGLE_THREAD_COST_CUTOFF: usize = 100;
