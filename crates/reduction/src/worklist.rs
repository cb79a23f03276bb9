#![forbid(unsafe_code)]

use std::collections::VecDeque;

use bitvec::order::Lsb0;
use bitvec::vec::BitVec;

use crate::BlockIndex;

/// An insertion ordered set of candidate splitter blocks.
///
/// # Details
///
/// Backed by a queue and a membership bit per block, so that `push`,
/// `contains` and `remove` are constant time. Removal clears the membership
/// bit and leaves the queue entry behind; `pop` skips such stale entries.
/// This supports the bookkeeping rule where the largest block resulting from
/// a split is taken back out of the worklist.
#[derive(Default)]
pub struct Worklist {
    queue: VecDeque<BlockIndex>,
    pending: BitVec<u64, Lsb0>,
    len: usize,
}

impl Worklist {
    /// Creates an empty worklist with membership bits for the given number of
    /// blocks.
    pub fn with_capacity(num_of_blocks: usize) -> Worklist {
        Worklist {
            queue: VecDeque::with_capacity(num_of_blocks),
            pending: BitVec::repeat(false, num_of_blocks),
            len: 0,
        }
    }

    /// Adds the given block, unless it is already pending.
    pub fn push(&mut self, block: BlockIndex) {
        if block.value() >= self.pending.len() {
            self.pending.resize(block.value() + 1, false);
        }

        if !self.pending[block.value()] {
            self.pending.set(block.value(), true);
            self.queue.push_back(block);
            self.len += 1;
        }
    }

    /// Removes and returns the oldest pending block.
    pub fn pop(&mut self) -> Option<BlockIndex> {
        while let Some(block) = self.queue.pop_front() {
            if self.pending[block.value()] {
                self.pending.set(block.value(), false);
                self.len -= 1;
                return Some(block);
            }
        }

        None
    }

    /// Returns true iff the given block is pending.
    pub fn contains(&self, block: BlockIndex) -> bool {
        block.value() < self.pending.len() && self.pending[block.value()]
    }

    /// Takes the given block back out of the worklist, if it is pending.
    pub fn remove(&mut self, block: BlockIndex) {
        if self.contains(block) {
            self.pending.set(block.value(), false);
            self.len -= 1;
        }
    }

    /// Returns the number of pending blocks.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true iff no blocks are pending.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes all pending blocks and returns them in ascending order.
    pub fn drain_sorted(&mut self) -> Vec<BlockIndex> {
        let mut blocks: Vec<BlockIndex> = Vec::with_capacity(self.len);
        while let Some(block) = self.pop() {
            blocks.push(block);
        }

        blocks.sort_unstable();
        blocks
    }
}
