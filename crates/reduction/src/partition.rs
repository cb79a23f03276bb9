#![forbid(unsafe_code)]

use std::fmt;

use lumper_mc::StateIndex;
use lumper_utilities::TagIndex;

/// A zero sized tag for the block.
pub struct BlockTag {}

/// The index for blocks.
pub type BlockIndex = TagIndex<usize, BlockTag>;

/// A trait for partition refinement algorithms that expose the block number
/// for every state. Can be used to compute the quotient Markov chain.
///
/// The invariants are that the union of all blocks is the original set, and
/// that each block contains distinct elements.
pub trait Partition {
    /// Returns the block number for the given state.
    fn block_number(&self, state_index: StateIndex) -> BlockIndex;

    /// Returns the number of blocks in the partition.
    fn num_of_blocks(&self) -> usize;

    /// Returns the number of elements in the partition.
    fn len(&self) -> usize;

    /// Returns whether the partition is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Defines a partition based on an explicit indexing of elements to their
/// block number. This is the exchange format of every splitting strategy.
#[derive(Clone, Debug)]
pub struct IndexedPartition {
    partition: Vec<BlockIndex>,

    num_of_blocks: usize,
}

impl IndexedPartition {
    /// Create a new partition where all elements are in a single block.
    pub fn new(num_of_elements: usize) -> IndexedPartition {
        IndexedPartition {
            partition: vec![BlockIndex::new(0); num_of_elements],
            num_of_blocks: if num_of_elements == 0 { 0 } else { 1 },
        }
    }

    /// Create a new partition with the given partitioning.
    pub fn with_partition(partition: Vec<BlockIndex>, num_of_blocks: usize) -> IndexedPartition {
        IndexedPartition {
            partition,
            num_of_blocks,
        }
    }

    /// Iterates over the block numbers of all elements.
    pub fn iter(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        self.partition.iter().copied()
    }

    /// Sets the block number of the given element.
    pub fn set_block(&mut self, element_index: StateIndex, block_number: BlockIndex) {
        self.num_of_blocks = self.num_of_blocks.max(block_number.value() + 1);

        self.partition[element_index] = block_number;
    }
}

impl Partition for IndexedPartition {
    fn block_number(&self, state_index: StateIndex) -> BlockIndex {
        self.partition[state_index.value()]
    }

    fn num_of_blocks(&self) -> usize {
        self.num_of_blocks
    }

    fn len(&self) -> usize {
        self.partition.len()
    }
}

impl fmt::Display for IndexedPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;

        let mut first = true;

        for block_index in 0..self.num_of_blocks {
            // Print all elements with the same block number.
            let mut first_block = true;
            for (element_index, _) in self.iter().enumerate().filter(|(_, value)| *value == block_index) {
                if !first_block {
                    write!(f, ", ")?;
                } else {
                    if !first {
                        write!(f, ", ")?;
                    }

                    write!(f, "{{")?;
                }

                write!(f, "{element_index}")?;
                first_block = false;
            }

            if !first_block {
                write!(f, "}}")?;
                first = false;
            }
        }

        write!(f, " }}")
    }
}

/// Returns a partition inducing the same equivalence relation as the given
/// one, with block numbers assigned densely in order of first occurrence.
/// Blocks without elements disappear.
pub fn renumber_partition(partition: &impl Partition) -> IndexedPartition {
    let mut mapping: Vec<Option<BlockIndex>> = vec![None; partition.num_of_blocks()];
    let mut result = IndexedPartition::new(partition.len());

    let mut next = 0;
    for state_index in (0..partition.len()).map(StateIndex::new) {
        let raw = partition.block_number(state_index);
        let block = *mapping[raw].get_or_insert_with(|| {
            let block = BlockIndex::new(next);
            next += 1;
            block
        });

        result.set_block(state_index, block);
    }

    result
}
