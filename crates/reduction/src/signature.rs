#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;

use bitvec::order::Lsb0;
use bitvec::vec::BitVec;

use lumper_mc::StateIndex;

use crate::BlockIndex;
use crate::weight_cmp;

/// The signature of a state for one refinement round.
///
/// # Details
///
/// Stores the block the state belonged to before the round, and for every
/// splitter block that the state can reach the accumulated probability mass
/// of doing so. The entries are kept ascending by block with strictly
/// positive weights; weight for the same block as the previous entry is
/// merged instead of appended.
#[derive(Clone, Debug)]
pub struct Signature {
    state: StateIndex,
    old_block: BlockIndex,
    blocks: Vec<BlockIndex>,
    weights: Vec<f64>,
}

impl Signature {
    /// Creates a signature with a single entry.
    pub fn new(state: StateIndex, old_block: BlockIndex, block: BlockIndex, weight: f64) -> Signature {
        Signature {
            state,
            old_block,
            blocks: vec![block],
            weights: vec![weight],
        }
    }

    /// Adds the given weight for the given block, merging with the last entry
    /// when it is for the same block. The block may not be smaller than the
    /// last entry's block.
    pub fn add(&mut self, block: BlockIndex, weight: f64) {
        let last = self.blocks.len() - 1;
        debug_assert!(
            self.blocks[last] <= block,
            "Signature entries must be added in ascending block order"
        );

        if self.blocks[last] == block {
            self.weights[last] += weight;
        } else {
            self.blocks.push(block);
            self.weights.push(weight);
        }
    }

    /// Returns the state of this signature.
    pub fn state(&self) -> StateIndex {
        self.state
    }

    /// Returns the block to which the state belonged before this round.
    pub fn old_block(&self) -> BlockIndex {
        self.old_block
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true iff the signature has no entries.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the pivot for the given sort position; even positions compare
    /// the entry's block and odd positions its weight.
    fn position_pivot(&self, position: usize) -> PositionPivot {
        if position % 2 == 0 {
            PositionPivot::Block(self.blocks[position / 2])
        } else {
            PositionPivot::Weight(self.weights[position / 2])
        }
    }

    /// Compares the given sort position of this signature to the pivot.
    fn cmp_position(&self, pivot: PositionPivot, position: usize) -> Ordering {
        match pivot {
            PositionPivot::Block(block) => self.blocks[position / 2].cmp(&block),
            PositionPivot::Weight(weight) => weight_cmp(self.weights[position / 2], weight),
        }
    }

    /// Compares two signatures in the order the sort produces: old block,
    /// then length, then the interleaved (block, weight) positions with
    /// tolerant weight comparison.
    pub fn cmp_tolerant(&self, other: &Signature) -> Ordering {
        self.old_block
            .cmp(&other.old_block)
            .then_with(|| self.blocks.len().cmp(&other.blocks.len()))
            .then_with(|| {
                for position in 0..2 * self.blocks.len() {
                    let ordering = self.cmp_position(other.position_pivot(position), position);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t", self.state, self.old_block)?;
        for (block, weight) in self.blocks.iter().zip(self.weights.iter()) {
            write!(f, "({}, {:.2})\t", block, weight)?;
        }
        Ok(())
    }
}

/// The pivot value at one sort position of a signature.
#[derive(Clone, Copy)]
enum PositionPivot {
    Block(BlockIndex),
    Weight(f64),
}

/// A list of signatures that can be sorted such that equal signatures are
/// adjacent, with a flag marking the first signature of every group.
#[derive(Default)]
pub struct SignatureBatch {
    signatures: Vec<Signature>,
    is_first: BitVec<u64, Lsb0>,
}

impl SignatureBatch {
    /// Removes all signatures.
    pub fn clear(&mut self) {
        self.signatures.clear();
        self.is_first.clear();
    }

    /// Returns the number of signatures in the batch.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Returns true iff the batch holds no signatures.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Adds the given signature at the end of the batch.
    pub fn push(&mut self, signature: Signature) {
        self.signatures.push(signature);
    }

    /// Returns the signature at the given index.
    pub fn get(&self, index: usize) -> &Signature {
        &self.signatures[index]
    }

    /// Returns a mutable reference to the signature at the given index, used
    /// to extend it while accumulating a round.
    pub fn get_mut(&mut self, index: usize) -> &mut Signature {
        &mut self.signatures[index]
    }

    /// Tests whether the signature at the given index is the first of its
    /// group of equal signatures. Only meaningful after [SignatureBatch::sort].
    pub fn is_first(&self, index: usize) -> bool {
        self.is_first[index]
    }

    /// Sorts the batch with a three-part radix quicksort: by old block, then
    /// by signature length, then lexicographically over the interleaved
    /// (block, weight) positions with tolerant weight comparison. Afterwards
    /// the first signature of every group of equal signatures is flagged.
    pub fn sort(&mut self) {
        self.is_first.clear();
        self.is_first.resize(self.signatures.len(), false);

        if !self.signatures.is_empty() {
            self.quicksort(0, self.signatures.len() - 1, GroupKey::OldBlock);
        }
    }

    /// Sorts the subrange [low, high] by the given grouping key, descending
    /// into the length key and then the positional sort for equal groups.
    fn quicksort(&mut self, low: usize, high: usize, key: GroupKey) {
        self.is_first.set(low, true);
        if high == low {
            return;
        }

        let pivot = self.group_value(low, key);
        let mut less = low;
        let mut greater = high;
        let mut i = low + 1;
        while i <= greater {
            match self.group_value(i, key).cmp(&pivot) {
                Ordering::Less => {
                    self.signatures.swap(less, i);
                    less += 1;
                    i += 1;
                }
                Ordering::Greater => {
                    self.signatures.swap(i, greater);
                    greater -= 1;
                }
                Ordering::Equal => i += 1,
            }
        }

        if less > low {
            self.quicksort(low, less - 1, key);
        }
        match key {
            GroupKey::OldBlock => self.quicksort(less, greater, GroupKey::Length),
            GroupKey::Length => self.three_way_quicksort(less, greater, 0),
        }
        if greater < high {
            self.quicksort(greater + 1, high, key);
        }

        self.is_first.set(less, true);
        if greater < high {
            self.is_first.set(greater + 1, true);
        }
    }

    /// Sorts the subrange [low, high] of signatures that agree on old block,
    /// length and every position before `position`, partitioning on the value
    /// at `position`. Flags the first signature of every distinct group.
    fn three_way_quicksort(&mut self, low: usize, high: usize, position: usize) {
        if high <= low {
            return;
        }

        let size = self.signatures[low].len();
        let pivot = self.signatures[low].position_pivot(position);

        let mut less = low;
        let mut greater = high;
        let mut i = low + 1;
        while i <= greater {
            match self.signatures[i].cmp_position(pivot, position) {
                Ordering::Less => {
                    self.signatures.swap(less, i);
                    less += 1;
                    i += 1;
                }
                Ordering::Greater => {
                    self.signatures.swap(i, greater);
                    greater -= 1;
                }
                Ordering::Equal => i += 1,
            }
        }

        if less > low {
            self.three_way_quicksort(low, less - 1, position);
        }
        if position + 1 < 2 * size {
            self.three_way_quicksort(less, greater, position + 1);
        }
        if greater < high {
            self.three_way_quicksort(greater + 1, high, position);
        }

        self.is_first.set(less, true);
        if greater < high {
            self.is_first.set(greater + 1, true);
        }
    }

    /// Returns the grouping value of the given signature.
    fn group_value(&self, index: usize, key: GroupKey) -> usize {
        match key {
            GroupKey::OldBlock => self.signatures[index].old_block().value(),
            GroupKey::Length => self.signatures[index].len(),
        }
    }
}

impl fmt::Display for SignatureBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        for (index, signature) in self.signatures.iter().enumerate() {
            let first = if self.is_first.get(index).map(|b| *b).unwrap_or(false) {
                "* "
            } else {
                "  "
            };
            writeln!(f, "{first}{signature}")?;
        }
        Ok(())
    }
}

/// The grouping keys of the first two radix passes.
#[derive(Clone, Copy)]
enum GroupKey {
    OldBlock,
    Length,
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::Rng;
    use test_log::test;

    use lumper_utilities::random_test;

    use crate::ACCURACY;

    fn random_signature(rng: &mut impl Rng) -> Signature {
        let state = StateIndex::new(rng.random_range(0..4));
        let old_block = BlockIndex::new(rng.random_range(0..5));

        let first_block = rng.random_range(0..3);
        let mut signature = Signature::new(
            state,
            old_block,
            BlockIndex::new(first_block),
            (1 + rng.random_range(0..3)) as f64 / 3.0,
        );

        let mut block = first_block;
        for _ in 0..rng.random_range(0..4) {
            block += 1 + rng.random_range(0..2);
            signature.add(BlockIndex::new(block), (1 + rng.random_range(0..3)) as f64 / 3.0);
        }

        signature
    }

    #[test]
    fn test_signature_accumulation() {
        let mut signature = Signature::new(StateIndex::new(0), BlockIndex::new(1), BlockIndex::new(2), 0.25);

        // Weight for the same block is merged, later blocks are appended.
        signature.add(BlockIndex::new(2), 0.25);
        signature.add(BlockIndex::new(4), 0.5);

        assert_eq!(signature.len(), 2);
        assert_eq!(
            signature.cmp_position(PositionPivot::Weight(0.5), 1),
            Ordering::Equal
        );
        assert_eq!(
            signature.cmp_position(PositionPivot::Block(BlockIndex::new(4)), 2),
            Ordering::Equal
        );
    }

    #[test]
    fn test_random_batch_sort() {
        random_test(100, |rng| {
            let mut batch = SignatureBatch::default();
            for _ in 0..rng.random_range(1..50) {
                batch.push(random_signature(rng));
            }

            batch.sort();

            // The batch is sorted and the group flags match the tolerant
            // comparison of adjacent signatures.
            assert!(batch.is_first(0));
            for index in 1..batch.len() {
                let ordering = batch.get(index - 1).cmp_tolerant(batch.get(index));
                assert_ne!(
                    ordering,
                    Ordering::Greater,
                    "Signatures {} and {} are out of order in {batch}",
                    index - 1,
                    index
                );

                assert_eq!(
                    batch.is_first(index),
                    ordering == Ordering::Less,
                    "Group flag of signature {index} is incorrect in {batch}"
                );
            }
        });
    }

    #[test]
    fn test_batch_sort_tolerant_weights() {
        let mut batch = SignatureBatch::default();
        let mut left = Signature::new(StateIndex::new(0), BlockIndex::new(0), BlockIndex::new(1), 0.5);
        left.add(BlockIndex::new(2), 0.5);
        let mut right = Signature::new(
            StateIndex::new(1),
            BlockIndex::new(0),
            BlockIndex::new(1),
            0.5 + ACCURACY / 2.0,
        );
        right.add(BlockIndex::new(2), 0.5 - ACCURACY / 2.0);
        batch.push(left);
        batch.push(right);

        batch.sort();

        // The weights differ by less than the accuracy, so the signatures
        // form a single group.
        assert!(batch.is_first(0));
        assert!(!batch.is_first(1));
    }
}
