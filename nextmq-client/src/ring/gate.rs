use super::RingBuffer;
use crate::error::RingError;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Pins `remaining` bytes from `position` so the producer cannot overwrite them. The gate moves
/// forward as it is advanced and releases its slot on drop.
#[derive(Debug)]
pub struct ReadingGate {
    ring: Arc<RingBuffer>,
    index: usize,
}

impl RingBuffer {
    /// Claims a gate slot for the range. The range has to be committed and pinned already, by the
    /// read cursor or by another gate, at the time of the call.
    pub(crate) fn add_gate(self: &Arc<Self>, position: u64, length: usize) -> Result<ReadingGate, RingError> {
        let mut mask = self.gate_mask.load(Ordering::Acquire);

        loop {
            if mask == u32::MAX {
                return Err(RingError::GatesExhausted);
            }

            let index = (!mask).trailing_zeros() as usize;

            match self.gate_mask.compare_exchange_weak(
                mask,
                mask | (1 << index),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let slot = &self.gates[index];

                    slot.position.store(position, Ordering::Relaxed);
                    slot.remaining.store(length as u64, Ordering::Relaxed);
                    slot.in_effect.store(true, Ordering::Release);

                    return Ok(ReadingGate {
                        ring: self.clone(),
                        index,
                    });
                }
                Err(current) => mask = current,
            }
        }
    }

    pub fn active_gates(&self) -> usize {
        self.gate_mask.load(Ordering::Acquire).count_ones() as usize
    }
}

impl ReadingGate {
    pub fn position(&self) -> u64 {
        self.ring.gates[self.index].position.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.ring.gates[self.index].remaining.load(Ordering::Acquire) as usize
    }

    /// The contiguous part of the pinned range at the gate position.
    pub fn chunk(&self) -> &[u8] {
        let (position, len) = self.ring.reserve_for_read(self.remaining(), Some(self));

        // SAFETY: the range is committed and this gate pins it while `self` is borrowed
        unsafe { self.ring.read_slice(position, len) }
    }

    /// The whole pinned range, in two parts if it wraps. It never reaches past the write cursor.
    pub fn view(&self) -> (&[u8], &[u8]) {
        let position = self.position();
        let committed = self.ring.write_position().saturating_sub(position) as usize;

        // SAFETY: committed, and this gate pins it while `self` is borrowed
        unsafe { self.ring.view(position, self.remaining().min(committed)) }
    }

    /// Moves the gate forward, the passed bytes can be overwritten after this.
    pub(crate) fn advance(&mut self, n: usize) {
        let slot = &self.ring.gates[self.index];
        let n = n.min(self.remaining());

        slot.position.fetch_add(n as u64, Ordering::AcqRel);
        slot.remaining.fetch_sub(n as u64, Ordering::AcqRel);

        self.ring.waiting().signal_read_done();
    }
}

impl Drop for ReadingGate {
    fn drop(&mut self) {
        self.ring.gates[self.index].in_effect.store(false, Ordering::Release);
        self.ring.gate_mask.fetch_and(!(1u32 << self.index), Ordering::AcqRel);
        self.ring.waiting().signal_read_done();
    }
}
