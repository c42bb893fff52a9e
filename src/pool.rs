//! The pool itself: owns the event word, the latch, the worker slots and
//! the worker threads, and drives the dispatch protocol.

use crate::event::EventWord;
use crate::latch::CountdownLatch;
use crate::topology::{self, AffinityPolicy};
use crate::worker::{self, BodyRef, WorkerSlot};
use crate::SPIN_WAIT_BUDGET;
use crossbeam::utils::CachePadded;
use std::any::Any;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// State shared between the pool handle and its worker threads.
pub(crate) struct PoolShared {
    pub(crate) event: EventWord,
    pub(crate) event_lock: Mutex<()>,
    pub(crate) event_changed: Condvar,
    pub(crate) latch: CountdownLatch,
    pub(crate) slots: Box<[CachePadded<WorkerSlot>]>,
    body_panicked: AtomicBool,
    panic_payload: Mutex<Option<Box<dyn Any + Send>>>,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: crate::metrics::Metrics,
}

impl PoolShared {
    pub(crate) fn body_panicked(&self) -> bool {
        self.body_panicked.load(Ordering::Relaxed)
    }

    pub(crate) fn record_body_panic(&self, payload: Box<dyn Any + Send>) {
        let mut slot = self.panic_payload.lock().unwrap();
        if slot.is_none() {
            *slot = Some(payload);
        }
        self.body_panicked.store(true, Ordering::Relaxed);
    }

    fn reset_body_panic(&self) {
        self.body_panicked.store(false, Ordering::Relaxed);
        *self.panic_payload.lock().unwrap() = None;
    }

    fn take_body_panic(&self) -> Option<Box<dyn Any + Send>> {
        self.panic_payload.lock().unwrap().take()
    }
}

/// A fixed-size worker pool for indexed data-parallel dispatch.
///
/// The pool is sized and optionally pinned at construction, started with
/// [`init`](Self::init), driven through [`run`](Self::run) or the
/// `compute_*` planners, and torn down by [`destroy`](Self::destroy) or
/// drop. The submitting thread always participates as slot 0, so a pool of
/// `T` threads owns `T - 1` OS threads.
pub struct TilePool {
    shared: Arc<PoolShared>,
    threads: Vec<JoinHandle<()>>,
    run_lock: Mutex<()>,
    default_tile_count: usize,
    started: bool,
}

impl TilePool {
    /// Builds a pool for `thread_count_hint` threads under `policy`.
    ///
    /// The hint is clamped to the probed CPU count and, when a policy
    /// selects a core subset, to that subset's size. Probe and affinity
    /// failures are logged and leave the pool unpinned; they never fail
    /// construction. Workers are not started until [`init`](Self::init).
    pub fn new(thread_count_hint: usize, policy: AffinityPolicy) -> Self {
        let max_freqs = topology::max_freq_per_cpu().unwrap_or_else(|err| {
            tracing::error!(%err, "failed to probe cpu max frequencies");
            Vec::new()
        });

        let mut thread_count = thread_count_hint.min(max_freqs.len()).max(1);

        let cores_to_use = topology::cores_for_policy(&max_freqs, policy, thread_count);
        if !cores_to_use.is_empty() {
            tracing::debug!(cores = ?cores_to_use, "binding pool threads to cores");
            // The submitter runs slot 0, so it gets the same mask.
            if let Err(err) = topology::set_current_thread_affinity(&cores_to_use) {
                tracing::error!(%err, "failed to set submitter affinity");
            }
            if thread_count > cores_to_use.len() {
                thread_count = cores_to_use.len();
            }
        }
        tracing::debug!(thread_count, "pool size selected");

        let default_tile_count =
            topology::default_tile_count_for(&max_freqs, &cores_to_use, thread_count);
        assert!(default_tile_count > 0, "default tile count must be positive");

        let slots: Box<[CachePadded<WorkerSlot>]> = (0..thread_count)
            .map(|_| CachePadded::new(WorkerSlot::new(cores_to_use.clone())))
            .collect();

        let shared = Arc::new(PoolShared {
            event: EventWord::new(),
            event_lock: Mutex::new(()),
            event_changed: Condvar::new(),
            latch: CountdownLatch::new(SPIN_WAIT_BUDGET),
            slots,
            body_panicked: AtomicBool::new(false),
            panic_payload: Mutex::new(None),
            #[cfg(feature = "metrics")]
            metrics: crate::metrics::Metrics::new(),
        });

        TilePool {
            shared,
            threads: Vec::new(),
            run_lock: Mutex::new(()),
            default_tile_count,
            started: false,
        }
    }

    /// Number of worker slots, counting the submitter as slot 0.
    pub fn thread_count(&self) -> usize {
        self.shared.slots.len()
    }

    /// Target tile count used when a planner is left to pick tile sizes.
    pub fn default_tile_count(&self) -> usize {
        self.default_tile_count
    }

    /// Starts the worker threads and waits until each has checked in.
    ///
    /// Single-threaded pools have no workers to start; calling this again on
    /// a running pool is a no-op.
    pub fn init(&mut self) {
        let thread_count = self.thread_count();
        if thread_count <= 1 || self.started {
            return;
        }
        tracing::debug!(thread_count, "starting pool workers");
        self.started = true;

        self.shared.latch.reset(thread_count - 1);
        // Workers observe the INIT command as their first event; no notify
        // is needed because nobody can be parked yet.
        self.shared.event.store(EventWord::init_value(), Ordering::Release);

        for tid in 1..thread_count {
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name(format!("tilepool-worker-{tid}"))
                .spawn(move || worker::worker_main(&shared, tid))
                .expect("failed to spawn pool worker thread");
            self.threads.push(handle);
        }

        self.shared.latch.wait();
    }

    /// Invokes `body` exactly once for every index in `[0, iterations)`.
    ///
    /// The range is partitioned contiguously across the slots; workers drain
    /// their own share from the head and then steal from peers' tails, so
    /// uneven bodies still finish together. The calling thread participates
    /// as slot 0 and returns only after every index has been executed.
    /// Concurrent submitters are serialized. A panic inside `body` is caught
    /// on the executing thread and re-raised here once the dispatch has
    /// fully drained.
    ///
    /// Multi-threaded pools must be started with [`init`](Self::init) before
    /// the first run.
    pub fn run<F>(&self, body: F, iterations: usize)
    where
        F: Fn(usize) + Sync,
    {
        self.run_erased(BodyRef::erase(&body), iterations);
    }

    fn run_erased(&self, body: BodyRef, iterations: usize) {
        let slots = &self.shared.slots;
        let thread_count = slots.len();
        debug_assert!(
            self.started || thread_count <= 1,
            "run() on an uninitialized multi-threaded pool"
        );

        let run_guard = self.run_lock.lock().unwrap();
        #[cfg(feature = "metrics")]
        self.shared.metrics.runs.fetch_add(1, Ordering::Relaxed);

        let per_thread = iterations / thread_count;
        let remainder = iterations % thread_count;
        let mut offset = 0;
        for (tid, slot) in slots.iter().enumerate() {
            let len = per_thread + usize::from(tid < remainder);
            slot.assign(offset, offset + len, body);
            offset += len;
        }

        self.shared.reset_body_panic();
        self.shared.latch.reset(thread_count - 1);
        {
            let _publish = self.shared.event_lock.lock().unwrap();
            let current = self.shared.event.load(Ordering::Relaxed);
            self.shared
                .event
                .store(EventWord::next_run(current), Ordering::Release);
            self.shared.event_changed.notify_all();
        }

        worker::run_slot(&self.shared, 0);
        self.shared.latch.wait();

        for slot in slots.iter() {
            slot.clear_body();
        }

        let payload = self.shared.take_body_panic();
        drop(run_guard);
        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
    }

    /// Stops and joins the worker threads. Idempotent; also runs on drop.
    ///
    /// Waits for any in-flight run to drain before broadcasting SHUTDOWN, so
    /// no submitted work is lost.
    pub fn destroy(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        tracing::debug!("shutting down pool workers");

        let _run_guard = self.run_lock.lock().unwrap();
        self.shared.latch.wait();
        {
            let _publish = self.shared.event_lock.lock().unwrap();
            self.shared
                .event
                .store(EventWord::shutdown_value(), Ordering::Release);
            self.shared.event_changed.notify_all();
        }

        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("<unnamed>").to_owned();
            if handle.join().is_err() {
                tracing::error!(worker = %name, "pool worker panicked before join");
            }
        }
        self.started = false;
    }

    /// Snapshot of the pool's execution counters.
    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> crate::metrics::MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl Drop for TilePool {
    fn drop(&mut self) {
        self.destroy();
    }
}
