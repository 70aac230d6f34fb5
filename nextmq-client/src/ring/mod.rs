//! Single producer byte ring with reading gates.
//!
//! The socket reader thread is the only producer, it reserves contiguous space at the write
//! cursor, reads from the socket into it and commits. The frame processing thread is the reader
//! which moves the read cursor. Cursors are logical stream offsets growing forever, they are
//! masked into the physical storage.
//!
//! A [`ReadingGate`] pins a range which the read cursor has already passed, so the producer
//! cannot overwrite it. That way the frame reader can parse ahead while a consumer on another
//! thread still looks at a message body in place.
use crate::config::WaitingKind;
use crate::error::RingError;
use crate::wait::{WaitOutcome, WaitingStrategy};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

mod gate;

pub use gate::ReadingGate;

/// Size of the gate table.
pub const MAX_GATES: usize = 32;

#[derive(Debug, Default)]
struct GateSlot {
    position: AtomicU64,
    remaining: AtomicU64,
    /// Set after the slot is claimed and filled, a claimed slot without it is skipped.
    in_effect: AtomicBool,
}

pub struct RingBuffer {
    storage: Box<[UnsafeCell<u8>]>,
    capacity: u64,
    mask: u64,
    write: CachePadded<AtomicU64>,
    read: CachePadded<AtomicU64>,
    gate_mask: CachePadded<AtomicU32>,
    gates: [GateSlot; MAX_GATES],
    closed: AtomicBool,
    waiting: Box<dyn WaitingStrategy>,
}

// SAFETY: the storage is only written in ranges reserved by the single producer and only read in
// committed ranges which are pinned by the read cursor or a gate, the cursors are atomics.
unsafe impl Sync for RingBuffer {}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("write", &self.write.load(Ordering::Relaxed))
            .field("read", &self.read.load(Ordering::Relaxed))
            .field("gates", &self.active_gates())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RingBuffer {
    /// Panics if `capacity` is not a power of two.
    pub fn new(capacity: usize, waiting: WaitingKind) -> Self {
        Self::with_strategy(capacity, waiting.strategy())
    }

    pub fn with_strategy(capacity: usize, waiting: Box<dyn WaitingStrategy>) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity > 1,
            "Ring capacity must be a power of two, got {}",
            capacity
        );

        let storage = (0..capacity)
            .map(|_| UnsafeCell::new(0u8))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            storage,
            capacity: capacity as u64,
            mask: capacity as u64 - 1,
            write: CachePadded::new(AtomicU64::new(0)),
            read: CachePadded::new(AtomicU64::new(0)),
            gate_mask: CachePadded::new(AtomicU32::new(0)),
            gates: std::array::from_fn(|_| GateSlot::default()),
            closed: AtomicBool::new(false),
            waiting,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn write_position(&self) -> u64 {
        self.write.load(Ordering::Acquire)
    }

    pub fn read_position(&self) -> u64 {
        self.read.load(Ordering::Acquire)
    }

    /// Number of committed bytes the read cursor has not passed yet.
    pub fn readable_len(&self) -> usize {
        (self.write.load(Ordering::Acquire) - self.read.load(Ordering::Acquire)) as usize
    }

    /// Lowest position still needed by a reader: the read cursor or an active gate.
    fn gate_floor(&self, read: u64) -> u64 {
        let mut floor = read;
        let mut mask = self.gate_mask.load(Ordering::Acquire);

        while mask != 0 {
            let index = mask.trailing_zeros() as usize;
            mask &= mask - 1;

            let slot = &self.gates[index];

            if slot.in_effect.load(Ordering::Acquire) {
                floor = floor.min(slot.position.load(Ordering::Acquire));
            }
        }

        floor
    }

    /// Returns the write position and how many bytes, at most `n`, can be written there in one
    /// contiguous run.
    pub(crate) fn reserve_for_write(&self, n: usize) -> (u64, usize) {
        let write = self.write.load(Ordering::Relaxed);
        // the read cursor is loaded before the gates: a gate published before a read commit is
        // then guaranteed to show up in the scan
        let read = self.read.load(Ordering::Acquire);
        let floor = self.gate_floor(read);

        debug_assert!(floor <= write);

        let free = (self.capacity - (write - floor)).saturating_sub(1);
        let contiguous = self.capacity - (write & self.mask);

        (write, (n as u64).min(free).min(contiguous) as usize)
    }

    /// Publishes `n` bytes of the range returned by `reserve_for_write`.
    pub(crate) fn commit_write(&self, n: usize) {
        let write = self.write.load(Ordering::Relaxed);

        debug_assert!(write + n as u64 - self.gate_floor(self.read.load(Ordering::Acquire)) < self.capacity);

        self.write.store(write + n as u64, Ordering::Release);
        self.waiting.signal_write_done();
    }

    /// Returns the read position (the read cursor or the gate position) and how many committed
    /// bytes, at most `n`, can be read there in one contiguous run.
    pub(crate) fn reserve_for_read(&self, n: usize, gate: Option<&ReadingGate>) -> (u64, usize) {
        let write = self.write.load(Ordering::Acquire);

        let (start, limit) = match gate {
            Some(g) => (g.position(), g.remaining() as u64),
            None => (self.read.load(Ordering::Acquire), u64::MAX),
        };

        let ready = write.saturating_sub(start);
        let contiguous = self.capacity - (start & self.mask);

        (start, (n as u64).min(ready).min(contiguous).min(limit) as usize)
    }

    pub(crate) fn commit_read(&self, n: usize) {
        let read = self.read.load(Ordering::Relaxed);

        debug_assert!(read + n as u64 <= self.write.load(Ordering::Acquire));

        self.read.store(read + n as u64, Ordering::Release);
        self.waiting.signal_read_done();
    }

    /// # Safety
    ///
    /// The range must come from `reserve_for_write` of the single producer and must not be
    /// committed yet.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn write_slice(&self, position: u64, len: usize) -> &mut [u8] {
        let offset = (position & self.mask) as usize;

        debug_assert!(offset + len <= self.storage.len());

        // SAFETY: in bounds, UnsafeCell<u8> has the layout of u8, exclusivity is on the caller
        std::slice::from_raw_parts_mut(UnsafeCell::raw_get(self.storage.as_ptr().add(offset)), len)
    }

    /// # Safety
    ///
    /// The range must be contiguous, committed and pinned by the read cursor or by a gate as long
    /// as the slice lives.
    pub(crate) unsafe fn read_slice(&self, position: u64, len: usize) -> &[u8] {
        let offset = (position & self.mask) as usize;

        debug_assert!(offset + len <= self.storage.len());

        // SAFETY: in bounds, the producer doesn't touch pinned ranges
        std::slice::from_raw_parts(UnsafeCell::raw_get(self.storage.as_ptr().add(offset)), len)
    }

    /// The two parts of a range which may wrap around the physical end.
    ///
    /// # Safety
    ///
    /// Same as [`RingBuffer::read_slice`], apart from the contiguity.
    pub(crate) unsafe fn view(&self, position: u64, len: usize) -> (&[u8], &[u8]) {
        let offset = (position & self.mask) as usize;
        let first = len.min(self.storage.len() - offset);

        (
            self.read_slice(position, first),
            self.read_slice(position + first as u64, len - first),
        )
    }

    /// Closes the ring, waiters return once the remaining data is consumed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.waiting.signal_write_done();
        self.waiting.signal_read_done();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn waiting(&self) -> &dyn WaitingStrategy {
        self.waiting.as_ref()
    }

    /// Waits until at least one byte is writable and returns at most `n` of contiguous space.
    pub fn wait_for_write(
        &self,
        n: usize,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<(u64, usize), RingError> {
        loop {
            if self.is_closed() {
                return Err(RingError::Closed);
            }

            let (position, available) = self.reserve_for_write(n);

            if available > 0 {
                return Ok((position, available));
            }

            let ready = || self.is_closed() || self.reserve_for_write(1).1 > 0;

            match self.waiting.wait_for_write(&ready, deadline, cancel) {
                WaitOutcome::Ready => continue,
                WaitOutcome::TimedOut => return Err(RingError::TimedOut),
                WaitOutcome::Cancelled => return Err(RingError::Cancelled),
            }
        }
    }

    /// Waits until at least `n` bytes are readable at the read cursor, returns the readable length.
    ///
    /// `n` must not exceed the capacity minus one, that much is never readable.
    pub fn wait_for_read(
        &self,
        n: usize,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<usize, RingError> {
        loop {
            let available = self.readable_len();

            if available >= n {
                return Ok(available);
            }

            if self.is_closed() {
                // the producer may have committed right before closing
                let available = self.readable_len();

                return if available >= n { Ok(available) } else { Err(RingError::Closed) };
            }

            let ready = || self.is_closed() || self.readable_len() >= n;

            match self.waiting.wait_for_read(&ready, deadline, cancel) {
                WaitOutcome::Ready => continue,
                WaitOutcome::TimedOut => return Err(RingError::TimedOut),
                WaitOutcome::Cancelled => return Err(RingError::Cancelled),
            }
        }
    }

    /// Copies `data` into the ring, waiting for space as needed. Producer side. On error a part
    /// of `data` may be committed already.
    pub(crate) fn write_all(
        &self,
        mut data: &[u8],
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<(), RingError> {
        while !data.is_empty() {
            let (position, available) = self.wait_for_write(data.len(), deadline, cancel)?;

            // SAFETY: reserved above by the single producer
            let dst = unsafe { self.write_slice(position, available) };

            dst.copy_from_slice(&data[..available]);
            self.commit_write(available);

            data = &data[available..];
        }

        Ok(())
    }

    /// Fills `dst` from the ring, waiting for data as needed. Reader side.
    #[cfg(test)]
    pub(crate) fn read_exact(&self, dst: &mut [u8], cancel: &CancellationToken) -> Result<(), RingError> {
        let mut filled = 0;

        while filled < dst.len() {
            self.wait_for_read(1, None, cancel)?;

            let (position, available) = self.reserve_for_read(dst.len() - filled, None);

            // SAFETY: committed and pinned by the read cursor until commit_read
            let src = unsafe { self.read_slice(position, available) };

            dst[filled..filled + available].copy_from_slice(src);
            self.commit_read(available);

            filled += available;
        }

        Ok(())
    }

    /// Reads from `src` into the ring until end of stream, the ring is closed or the token is
    /// cancelled. Producer side, returns the number of bytes transferred.
    pub(crate) fn fill_from<R: Read>(&self, src: &mut R, cancel: &CancellationToken) -> io::Result<u64> {
        let mut total = 0u64;

        loop {
            let (position, available) = match self.wait_for_write(self.capacity(), None, cancel) {
                Ok(reserved) => reserved,
                Err(RingError::Closed) | Err(RingError::Cancelled) => return Ok(total),
                Err(e) => return Err(io::Error::new(io::ErrorKind::Other, e)),
            };

            // SAFETY: reserved above by the single producer
            let dst = unsafe { self.write_slice(position, available) };

            match src.read(dst) {
                Ok(0) => return Ok(total),
                Ok(n) => {
                    self.commit_write(n);
                    total += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
