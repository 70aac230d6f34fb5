//! Waiting strategies of the ring buffer.
//!
//! A waiter passes its readiness condition to the strategy, the strategy decides how to burn the
//! time until the condition holds: spinning, parking or a bit of both. The signal methods are
//! called by the other side after it moved a cursor.
use crate::config::WaitingKind;
use parking_lot::{Condvar, Mutex};
use std::hint;
use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Result of a wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

pub trait WaitingStrategy: Send + Sync {
    /// The producer committed bytes.
    fn signal_write_done(&self);
    /// A reader committed bytes or released a gate.
    fn signal_read_done(&self);
    /// Wait until there is space to write, i.e. until `ready` returns true.
    fn wait_for_write(
        &self,
        ready: &dyn Fn() -> bool,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> WaitOutcome;
    /// Wait until there is data to read.
    fn wait_for_read(
        &self,
        ready: &dyn Fn() -> bool,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> WaitOutcome;
}

impl WaitingKind {
    pub(crate) fn strategy(self) -> Box<dyn WaitingStrategy> {
        match self {
            WaitingKind::Spin => Box::new(SpinWait),
            WaitingKind::Blocking => Box::new(BlockingWait::default()),
            WaitingKind::Hybrid => Box::new(HybridWait::default()),
        }
    }
}

fn interrupted(deadline: Option<Instant>, cancel: &CancellationToken) -> Option<WaitOutcome> {
    if cancel.is_cancelled() {
        return Some(WaitOutcome::Cancelled);
    }

    match deadline {
        Some(d) if Instant::now() >= d => Some(WaitOutcome::TimedOut),
        _ => None,
    }
}

/// Spins with the spin loop hint and yields now and then, so an oversubscribed machine still
/// makes progress.
#[derive(Debug, Default)]
pub struct SpinWait;

const SPINS_BEFORE_YIELD: u32 = 128;

impl SpinWait {
    fn spin(&self, ready: &dyn Fn() -> bool, deadline: Option<Instant>, cancel: &CancellationToken) -> WaitOutcome {
        let mut spins = 0u32;

        loop {
            if ready() {
                return WaitOutcome::Ready;
            }

            if let Some(outcome) = interrupted(deadline, cancel) {
                return outcome;
            }

            spins += 1;

            if spins % SPINS_BEFORE_YIELD == 0 {
                thread::yield_now();
            } else {
                hint::spin_loop();
            }
        }
    }
}

impl WaitingStrategy for SpinWait {
    fn signal_write_done(&self) {}

    fn signal_read_done(&self) {}

    fn wait_for_write(
        &self,
        ready: &dyn Fn() -> bool,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        self.spin(ready, deadline, cancel)
    }

    fn wait_for_read(
        &self,
        ready: &dyn Fn() -> bool,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        self.spin(ready, deadline, cancel)
    }
}

/// Parks the thread on a condition variable per direction.
///
/// Cancellation tokens cannot notify a condvar, so a parked thread wakes up at least every
/// millisecond to look at the token.
#[derive(Debug, Default)]
pub struct BlockingWait {
    written: Signal,
    read: Signal,
}

#[derive(Debug, Default)]
struct Signal {
    lock: Mutex<()>,
    cond: Condvar,
    /// Parked threads, the signalling side skips the lock while it is zero.
    waiters: AtomicUsize,
}

const PARK_SLICE: Duration = Duration::from_millis(1);

impl Signal {
    fn notify(&self) {
        // pairs with the fence in `wait`: either the waiter sees the moved cursor or we see it
        fence(Ordering::SeqCst);

        if self.waiters.load(Ordering::SeqCst) == 0 {
            return;
        }

        let _guard = self.lock.lock();
        self.cond.notify_all();
    }

    fn wait(&self, ready: &dyn Fn() -> bool, deadline: Option<Instant>, cancel: &CancellationToken) -> WaitOutcome {
        let mut guard = self.lock.lock();

        self.waiters.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        let outcome = loop {
            if ready() {
                break WaitOutcome::Ready;
            }

            if let Some(outcome) = interrupted(deadline, cancel) {
                break outcome;
            }

            let slice = match deadline {
                Some(d) => d.saturating_duration_since(Instant::now()).min(PARK_SLICE),
                None => PARK_SLICE,
            };

            self.cond.wait_for(&mut guard, slice);
        };

        self.waiters.fetch_sub(1, Ordering::SeqCst);

        outcome
    }
}

impl WaitingStrategy for BlockingWait {
    fn signal_write_done(&self) {
        self.written.notify();
    }

    fn signal_read_done(&self) {
        self.read.notify();
    }

    fn wait_for_write(
        &self,
        ready: &dyn Fn() -> bool,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        self.read.wait(ready, deadline, cancel)
    }

    fn wait_for_read(
        &self,
        ready: &dyn Fn() -> bool,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        self.written.wait(ready, deadline, cancel)
    }
}

/// Spins a bounded number of times, then parks like [`BlockingWait`].
#[derive(Debug)]
pub struct HybridWait {
    spins: u32,
    blocking: BlockingWait,
}

impl Default for HybridWait {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl HybridWait {
    pub fn new(spins: u32) -> Self {
        Self {
            spins,
            blocking: BlockingWait::default(),
        }
    }

    fn spin_first(&self, ready: &dyn Fn() -> bool) -> bool {
        for _ in 0..self.spins {
            if ready() {
                return true;
            }

            hint::spin_loop();
        }

        false
    }
}

impl WaitingStrategy for HybridWait {
    fn signal_write_done(&self) {
        self.blocking.signal_write_done();
    }

    fn signal_read_done(&self) {
        self.blocking.signal_read_done();
    }

    fn wait_for_write(
        &self,
        ready: &dyn Fn() -> bool,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        if self.spin_first(ready) {
            return WaitOutcome::Ready;
        }

        self.blocking.wait_for_write(ready, deadline, cancel)
    }

    fn wait_for_read(
        &self,
        ready: &dyn Fn() -> bool,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        if self.spin_first(ready) {
            return WaitOutcome::Ready;
        }

        self.blocking.wait_for_read(ready, deadline, cancel)
    }
}
