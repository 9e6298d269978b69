//! Bounded free-index allocator.
//!
//! Both the open file table and the per-process descriptor tables hand out
//! fixed-range integer slots. The free set is kept in a circular queue so
//! that `allocate` and `release` are O(1) and freed slots are reused in FIFO
//! order. Invariant: every index in `[0, N)` is in exactly one of
//! {free queue, occupied table entry}.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    /// No free slot left.
    Exhausted,
    /// Release would exceed capacity. Indicates a double free; callers
    /// treat this as a kernel assertion failure, not a user error.
    Overflow,
}

pub struct SlotQueue<const N: usize> {
    slots: [usize; N],
    head: usize,
    len: usize,
}

impl<const N: usize> SlotQueue<N> {
    /// Queue holding every index in `[0, N)`, in ascending order.
    pub const fn full() -> Self {
        let mut slots = [0usize; N];
        let mut i = 0;
        while i < N {
            slots[i] = i;
            i += 1;
        }
        Self {
            slots,
            head: 0,
            len: N,
        }
    }

    /// Pop the front of the free queue.
    pub fn allocate(&mut self) -> Result<usize, SlotError> {
        if self.len == 0 {
            return Err(SlotError::Exhausted);
        }
        let index = self.slots[self.head];
        self.head = (self.head + 1) % N;
        self.len -= 1;
        Ok(index)
    }

    /// Push a slot back onto the end of the free queue. A double free
    /// surfaces as `Overflow` once the queue fills back up; callers treat
    /// that as a kernel assertion failure.
    pub fn release(&mut self, index: usize) -> Result<(), SlotError> {
        debug_assert!(index < N);
        if self.len == N {
            return Err(SlotError::Overflow);
        }
        self.slots[(self.head + self.len) % N] = index;
        self.len += 1;
        Ok(())
    }

    /// Remove a specific index from the free queue, preserving the order of
    /// the remaining entries. Returns false when the index is not free.
    ///
    /// Needed by dup2 targeting a handle that was never allocated: the
    /// target must leave the free set before it can be bound.
    pub fn claim(&mut self, index: usize) -> bool {
        let mut i = 0;
        while i < self.len {
            let pos = (self.head + i) % N;
            if self.slots[pos] == index {
                // Shift the tail left over the removed element.
                let mut j = i;
                while j + 1 < self.len {
                    let dst = (self.head + j) % N;
                    let src = (self.head + j + 1) % N;
                    self.slots[dst] = self.slots[src];
                    j += 1;
                }
                self.len -= 1;
                return true;
            }
            i += 1;
        }
        false
    }

    pub fn free_count(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
