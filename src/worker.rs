//! Worker slots and the worker thread loop.
//!
//! Each slot holds a contiguous index range claimed from both ends: the
//! owning worker advances the head while idle peers steal from the tail.
//! `range_len` is the sole linearization point; winning its CAS decrement
//! licenses exactly one index from exactly one end, so the head and tail can
//! move with plain atomic increments afterwards.

use crate::event::{Command, EventWord};
use crate::pool::PoolShared;
use crate::topology;
use crate::SPIN_WAIT_BUDGET;
use std::cell::UnsafeCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Type-erased reference to the indexed body of the current run.
///
/// `data` points at the caller's closure on the submitting `run` frame and
/// `call` is the monomorphized trampoline that reconstructs the concrete
/// type. The pair is only dereferenced between a RUN publication and the
/// latch reaching zero, both of which happen inside that frame, so the
/// pointee is always alive at the call site.
#[derive(Clone, Copy)]
pub(crate) struct BodyRef {
    data: *const (),
    call: unsafe fn(*const (), usize),
}

impl BodyRef {
    pub(crate) fn erase<F: Fn(usize) + Sync>(body: &F) -> Self {
        BodyRef {
            data: body as *const F as *const (),
            call: trampoline::<F>,
        }
    }

    /// # Safety
    ///
    /// The closure behind `data` must still be alive, which the dispatch
    /// protocol guarantees for the whole RUN window.
    pub(crate) unsafe fn invoke(self, index: usize) {
        unsafe { (self.call)(self.data, index) }
    }
}

unsafe fn trampoline<F: Fn(usize)>(data: *const (), index: usize) {
    let body = unsafe { &*(data as *const F) };
    body(index);
}

/// Per-slot scheduling state. Slot 0 belongs to the submitting thread.
pub(crate) struct WorkerSlot {
    /// Head index, advanced only by the owning worker.
    range_start: AtomicUsize,
    /// One past the tail index, decremented only by stealers.
    range_end: AtomicUsize,
    /// Remaining items; the only field claims synchronize on.
    range_len: AtomicUsize,
    /// Body of the in-flight run; valid only while the event word says RUN.
    body: UnsafeCell<Option<BodyRef>>,
    /// CPU ids this slot's thread is bound to. Fixed at construction.
    pub(crate) cpu_cores: Vec<usize>,
}

// SAFETY: the range fields are atomics. `body` is written by the submitter
// while every worker is quiescent (before the RUN event is released) and
// only read by workers after acquiring that event, so the cell is never
// accessed concurrently with a write. The erased pointer inside stays valid
// for the whole RUN window (see `BodyRef`).
unsafe impl Send for WorkerSlot {}
unsafe impl Sync for WorkerSlot {}

impl WorkerSlot {
    pub(crate) fn new(cpu_cores: Vec<usize>) -> Self {
        WorkerSlot {
            range_start: AtomicUsize::new(0),
            range_end: AtomicUsize::new(0),
            range_len: AtomicUsize::new(0),
            body: UnsafeCell::new(None),
            cpu_cores,
        }
    }

    /// Installs the range and body for the next run. Plain stores suffice:
    /// no worker observes the slot until the RUN event is released.
    pub(crate) fn assign(&self, start: usize, end: usize, body: BodyRef) {
        self.range_start.store(start, Ordering::Relaxed);
        self.range_end.store(end, Ordering::Relaxed);
        self.range_len.store(end - start, Ordering::Relaxed);
        unsafe { *self.body.get() = Some(body) };
    }

    /// Drops the published body handle once a run has fully drained, so no
    /// erased pointer outlives its stack frame.
    pub(crate) fn clear_body(&self) {
        unsafe { *self.body.get() = None };
    }

    fn body(&self) -> Option<BodyRef> {
        unsafe { *self.body.get() }
    }
}

/// One worker's share of a run: drain our own range from the head, then
/// sweep the peers in ring order and steal their tails until every range in
/// the pool is empty. The submitter calls this too, as slot 0.
pub(crate) fn run_slot(shared: &PoolShared, tid: usize) {
    let slots = &shared.slots;
    let slot = &slots[tid];

    if let Some(body) = slot.body() {
        loop {
            let remaining = slot.range_len.load(Ordering::Acquire);
            if remaining == 0 {
                break;
            }
            if slot
                .range_len
                .compare_exchange(remaining, remaining - 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                // Only the owner touches the head.
                let index = slot.range_start.fetch_add(1, Ordering::Relaxed);
                invoke_guarded(shared, body, index);
                #[cfg(feature = "metrics")]
                shared.metrics.owned_tiles.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    let count = slots.len();
    for offset in 1..count {
        let peer = &slots[(tid + offset) % count];
        let Some(body) = peer.body() else {
            continue;
        };
        loop {
            let remaining = peer.range_len.load(Ordering::Acquire);
            if remaining == 0 {
                break;
            }
            if peer
                .range_len
                .compare_exchange(remaining, remaining - 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                // Stealers only touch the tail.
                let tail = peer.range_end.fetch_sub(1, Ordering::AcqRel);
                invoke_guarded(shared, body, tail - 1);
                #[cfg(feature = "metrics")]
                shared.metrics.stolen_tiles.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Runs one body invocation, containing panics so the claim accounting and
/// the latch still complete. The first payload wins; once a panic has been
/// recorded the remaining claims finish as no-ops.
fn invoke_guarded(shared: &PoolShared, body: BodyRef, index: usize) {
    if shared.body_panicked() {
        return;
    }
    // SAFETY: claims only happen during RUN, when the erased body is alive
    // (see `BodyRef`).
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { body.invoke(index) }));
    if let Err(payload) = outcome {
        shared.record_body_panic(payload);
    }
}

/// Main loop for slots `1..T`. Spins on the event word for the wakeup
/// budget, parks on the condition variable past it, and dispatches on the
/// command bits: INIT and RUN acknowledge through the latch, SHUTDOWN
/// returns.
pub(crate) fn worker_main(shared: &PoolShared, tid: usize) {
    let cores = &shared.slots[tid].cpu_cores;
    if !cores.is_empty() {
        match topology::set_current_thread_affinity(cores) {
            Ok(()) => tracing::debug!(tid, ?cores, "pinned worker thread"),
            Err(err) => tracing::error!(tid, %err, "failed to pin worker thread"),
        }
    }

    let mut last_event = EventWord::NONE;
    loop {
        let mut raw = shared.event.spin_wait_for_change(last_event, SPIN_WAIT_BUDGET);
        if raw == last_event {
            #[cfg(feature = "metrics")]
            shared.metrics.parked_waits.fetch_add(1, Ordering::Relaxed);
            let mut guard = shared.event_lock.lock().unwrap();
            while shared.event.load(Ordering::Acquire) == last_event {
                guard = shared.event_changed.wait(guard).unwrap();
            }
        }

        raw = shared.event.load(Ordering::Acquire);
        match EventWord::command(raw) {
            Command::Init => shared.latch.count_down(),
            Command::Run => {
                run_slot(shared, tid);
                shared.latch.count_down();
            }
            Command::Shutdown => return,
            Command::None => {}
        }
        last_event = raw;
    }
}
