//! Fixed ring of streaming buffers.
//!
//! Owned by one scheduler. Buffers are handed out in strict rotation and a
//! slot only comes back once the sink reports the buffer it held as finished.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

/// Fixed-size PCM buffers cycled between a filler and an output voice.
#[derive(Debug)]
pub struct BufferRing {
    /// Storage for every slot.
    buffers: Box<[Box<[u8]>]>,
    /// Slot handed out next.
    next: usize,
    /// Submitted buffers the sink has not finished.
    in_flight: usize,
    /// Set once the producer has no more data.
    finished: bool,
}

impl BufferRing {
    /// Create `count` zeroed buffers of `size` bytes each.
    pub fn new(count: usize, size: usize) -> Self {
        let buffers = (0..count.max(1))
            .map(|_| vec![0u8; size].into_boxed_slice())
            .collect();

        Self {
            buffers,
            next: 0,
            in_flight: 0,
            finished: false,
        }
    }

    /// Number of slots.
    pub const fn capacity(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffers.first().map_or(0, |b| b.len())
    }

    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub const fn has_free(&self) -> bool {
        self.in_flight < self.buffers.len()
    }

    /// Borrow the next slot to fill, if one is free.
    ///
    /// The slot stays free until [`mark_submitted`](Self::mark_submitted).
    pub fn next_free(&mut self) -> Option<&mut [u8]> {
        if self.has_free() {
            Some(&mut self.buffers[self.next])
        } else {
            None
        }
    }

    /// Record that the slot from `next_free` went to the sink.
    pub fn mark_submitted(&mut self) {
        debug_assert!(self.has_free());
        self.next = (self.next + 1) % self.buffers.len();
        self.in_flight += 1;
    }

    /// Return finished slots to the pool. Returns how many were released.
    pub fn release(&mut self, count: usize) -> usize {
        let released = count.min(self.in_flight);
        self.in_flight -= released;
        released
    }

    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn set_finished(&mut self) {
        self.finished = true;
    }
}
