//! The event word workers watch for pool commands.
//!
//! One 32-bit atomic carries both the current command and a generation
//! marker. The low 31 bits hold the command; the top bit flips on every RUN
//! publication, so a worker comparing against the last value it acted on can
//! tell two consecutive RUNs apart even though the command bits repeat.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

const CMD_NONE: u32 = 0;
const CMD_INIT: u32 = 1;
const CMD_RUN: u32 = 2;
const CMD_SHUTDOWN: u32 = 4;

const COMMAND_MASK: u32 = 0x7fff_ffff;
const GENERATION_BIT: u32 = !COMMAND_MASK;

/// Spins between clock reads; `Instant::now` is too costly per iteration.
const SPINS_PER_CLOCK_CHECK: u32 = 64;

/// Command decoded from an event word value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    None,
    Init,
    Run,
    Shutdown,
}

pub(crate) struct EventWord(AtomicU32);

impl EventWord {
    /// Raw value before any command has been published.
    pub(crate) const NONE: u32 = CMD_NONE;

    pub(crate) fn new() -> Self {
        Self(AtomicU32::new(CMD_NONE))
    }

    pub(crate) fn load(&self, order: Ordering) -> u32 {
        self.0.load(order)
    }

    pub(crate) fn store(&self, raw: u32, order: Ordering) {
        self.0.store(raw, order);
    }

    pub(crate) fn init_value() -> u32 {
        CMD_INIT
    }

    pub(crate) fn shutdown_value() -> u32 {
        CMD_SHUTDOWN
    }

    /// Value publishing a new RUN: same command bits, flipped generation.
    pub(crate) fn next_run(current: u32) -> u32 {
        CMD_RUN | (!current & GENERATION_BIT)
    }

    pub(crate) fn command(raw: u32) -> Command {
        match raw & COMMAND_MASK {
            CMD_INIT => Command::Init,
            CMD_RUN => Command::Run,
            CMD_SHUTDOWN => Command::Shutdown,
            _ => Command::None,
        }
    }

    /// Busy-polls until the word differs from `last` or the budget elapses,
    /// returning the most recent value observed either way.
    pub(crate) fn spin_wait_for_change(&self, last: u32, budget: Duration) -> u32 {
        let start = Instant::now();
        loop {
            for _ in 0..SPINS_PER_CLOCK_CHECK {
                let raw = self.0.load(Ordering::Acquire);
                if raw != last {
                    return raw;
                }
                std::hint::spin_loop();
            }
            if start.elapsed() >= budget {
                return self.0.load(Ordering::Acquire);
            }
        }
    }
}
