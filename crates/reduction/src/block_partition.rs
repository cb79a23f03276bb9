#![forbid(unsafe_code)]

use std::fmt;

use itertools::Itertools;

use lumper_mc::StateIndex;

use crate::BlockIndex;
use crate::Partition;
use crate::sort_by_weight;

/// A partition that explicitly stores a list of blocks and their indexing into
/// the list of elements.
///
/// # Details
///
/// All elements are kept in a single array partitioned into contiguous
/// per-block segments, together with the position of every element and the
/// block of every element. Every block tracks a borderline between its
/// unmarked and marked elements, so that marking an element is a single swap.
#[derive(Debug)]
pub struct BlockPartition {
    elements: Vec<StateIndex>,
    blocks: Vec<Block>,

    /// Stores the block index for each element.
    element_to_block: Vec<BlockIndex>,

    /// Stores the offset within the element array for every element.
    element_offset: Vec<usize>,
}

impl BlockPartition {
    /// Creates a partition with the same blocks as the given partition, with
    /// all elements unmarked.
    pub fn from_partition(partition: &impl Partition) -> BlockPartition {
        debug_assert!(!partition.is_empty(), "Cannot partition the empty set");

        // Counting sort of the elements by their block number.
        let num_of_elements = partition.len();
        let mut count = vec![0usize; partition.num_of_blocks()];
        for element in (0..num_of_elements).map(StateIndex::new) {
            count[partition.block_number(element)] += 1;
        }

        let mut blocks = Vec::with_capacity(partition.num_of_blocks());
        let mut offset = 0;
        for size in count.iter_mut() {
            debug_assert!(*size > 0, "The initial partition contains an empty block");

            blocks.push(Block::new_unmarked(offset, offset + *size));
            let begin = offset;
            offset += *size;
            *size = begin;
        }

        let mut elements = vec![StateIndex::new(0); num_of_elements];
        let mut element_to_block = vec![BlockIndex::new(0); num_of_elements];
        let mut element_offset = vec![0usize; num_of_elements];
        for element in (0..num_of_elements).map(StateIndex::new) {
            let block = partition.block_number(element);
            elements[count[block]] = element;
            element_offset[element] = count[block];
            element_to_block[element] = block;
            count[block] += 1;
        }

        let result = BlockPartition {
            elements,
            blocks,
            element_to_block,
            element_offset,
        };
        result.assert_consistent();
        result
    }

    /// Return a reference to the given block.
    pub fn block(&self, block_index: BlockIndex) -> &Block {
        &self.blocks[block_index]
    }

    /// Returns the element at the given position of the element array.
    pub fn element(&self, position: usize) -> StateIndex {
        self.elements[position]
    }

    /// Returns an iterator over the elements of a given block.
    pub fn iter_block(&self, block_index: BlockIndex) -> BlockIter<'_> {
        BlockIter {
            elements: &self.elements,
            index: self.blocks[block_index].begin,
            end: self.blocks[block_index].end,
        }
    }

    /// Marks the given element, such that it is returned by iter_marked.
    pub fn mark_element(&mut self, element: StateIndex) {
        let block_index = self.element_to_block[element];
        let offset = self.element_offset[element];
        let marked_split = self.blocks[block_index].marked_split;

        if offset < marked_split {
            // Element was not already marked.
            self.swap_elements(offset, marked_split - 1);
            self.blocks[block_index].marked_split -= 1;
        }

        self.blocks[block_index].assert_consistent();
    }

    /// Returns true iff the given element has already been marked.
    pub fn is_element_marked(&self, element: StateIndex) -> bool {
        let block_index = self.element_to_block[element];
        let offset = self.element_offset[element];

        offset >= self.blocks[block_index].marked_split
    }

    /// Splits the marked elements of the given block into their own block and
    /// returns its index. If every element is marked the block keeps its
    /// identity. Afterwards no element of the affected blocks is marked.
    pub fn split_marked(&mut self, block_index: BlockIndex) -> BlockIndex {
        let block = self.blocks[block_index];
        debug_assert!(
            block.has_marked(),
            "Cannot split off the marked elements of a block without marked elements"
        );

        if !block.has_unmarked() {
            // The whole block was marked, so it is trivially split.
            self.blocks[block_index].unmark_all();
            return block_index;
        }

        let new_block_index = BlockIndex::new(self.blocks.len());
        self.blocks.push(Block::new_unmarked(block.marked_split, block.end));
        self.blocks[block_index] = Block::new_unmarked(block.begin, block.marked_split);

        for position in block.marked_split..block.end {
            self.element_to_block[self.elements[position]] = new_block_index;
        }

        self.assert_consistent();
        new_block_index
    }

    /// Splits the leading elements [begin, at) of the given block into their
    /// own block and returns its index; the block keeps [at, end).
    pub fn split_prefix(&mut self, block_index: BlockIndex, at: usize) -> BlockIndex {
        let block = self.blocks[block_index];
        debug_assert!(
            block.begin < at && at < block.end,
            "Position {at} does not properly split block {block:?}"
        );

        let new_block_index = BlockIndex::new(self.blocks.len());
        self.blocks.push(Block::new_unmarked(block.begin, at));
        self.blocks[block_index] = Block::new_unmarked(at, block.end);

        for position in block.begin..at {
            self.element_to_block[self.elements[position]] = new_block_index;
        }

        self.assert_consistent();
        new_block_index
    }

    /// Sorts the elements of the given block ascending by their accumulated
    /// weight, treating weights within the accuracy as equal.
    pub fn sort_block_by_weight(&mut self, block_index: BlockIndex, weights: &[f64]) {
        let block = self.blocks[block_index];
        sort_by_weight(&mut self.elements[block.begin..block.end], weights);

        for position in block.begin..block.end {
            self.element_offset[self.elements[position]] = position;
        }

        self.assert_consistent();
    }

    /// Returns the number of blocks in the partition.
    pub fn num_of_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Swaps the elements at the given positions and updates their offsets.
    fn swap_elements(&mut self, left_index: usize, right_index: usize) {
        self.elements.swap(left_index, right_index);
        self.element_offset[self.elements[left_index]] = left_index;
        self.element_offset[self.elements[right_index]] = right_index;
    }

    /// Returns true iff the invariants of a partition hold.
    fn assert_consistent(&self) -> bool {
        if cfg!(debug_assertions) {
            let mut covered = vec![false; self.elements.len()];

            for block in &self.blocks {
                block.assert_consistent();

                for position in block.begin..block.end {
                    debug_assert!(
                        !covered[position],
                        "Partition {self}, position {position} is covered by multiple blocks"
                    );
                    covered[position] = true;
                }
            }

            debug_assert!(
                !covered.contains(&false),
                "Partition {self} contains positions that are not covered by a block"
            );

            for (current_element, block_index) in self.element_to_block.iter().enumerate() {
                let offset = self.element_offset[current_element];
                debug_assert_eq!(
                    self.elements[offset],
                    StateIndex::new(current_element),
                    "Partition {self:?}, element {current_element} does not have the correct offset"
                );

                let block = &self.blocks[block_index.value()];
                debug_assert!(
                    block.begin <= offset && offset < block.end,
                    "Partition {self:?}, element {current_element} lies outside block {block_index} as indicated by element_to_block"
                );
            }
        }

        true
    }
}

impl Partition for BlockPartition {
    fn block_number(&self, element: StateIndex) -> BlockIndex {
        self.element_to_block[element.value()]
    }

    fn num_of_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn len(&self) -> usize {
        self.elements.len()
    }
}

impl fmt::Display for BlockPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let blocks_str = self.blocks.iter().format_with(", ", |block, f| {
            let elements = block
                .iter_unmarked(&self.elements)
                .map(|e| (e, false))
                .chain(block.iter_marked(&self.elements).map(|e| (e, true)))
                .format_with(", ", |(e, marked), f| {
                    if marked {
                        f(&format_args!("{}*", e))
                    } else {
                        f(&format_args!("{}", e))
                    }
                });

            f(&format_args!("{{{}}}", elements))
        });

        write!(f, "{{{}}}", blocks_str)
    }
}

/// A block stores a subset of the elements in a partition.
///
/// # Details
///
/// A block uses `begin`, `marked_split` and `end` indices to indicate a range
/// `begin`..`end` of elements in the partition, where `marked_split`..`end`
/// are the marked elements. This is useful to be able to split off new blocks
/// cheaply.
///
/// Invariant: `begin` <= `marked_split` <= `end` && `begin` < `end`.
#[derive(Clone, Copy, Debug)]
pub struct Block {
    begin: usize,
    marked_split: usize,
    end: usize,
}

impl Block {
    /// Creates a new block where no element is marked.
    pub fn new_unmarked(begin: usize, end: usize) -> Block {
        debug_assert!(begin < end, "The range {begin} to {end} of this block is incorrect");

        Block {
            begin,
            marked_split: end,
            end,
        }
    }

    /// Returns the position of the first element of this block.
    pub fn begin(&self) -> usize {
        self.begin
    }

    /// Returns the position past the last element of this block.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Returns an iterator over the elements in this block.
    pub fn iter<'a>(&self, elements: &'a [StateIndex]) -> BlockIter<'a> {
        BlockIter {
            elements,
            index: self.begin,
            end: self.end,
        }
    }

    /// Returns an iterator over the marked elements in this block.
    pub fn iter_marked<'a>(&self, elements: &'a [StateIndex]) -> BlockIter<'a> {
        BlockIter {
            elements,
            index: self.marked_split,
            end: self.end,
        }
    }

    /// Returns an iterator over the unmarked elements in this block.
    pub fn iter_unmarked<'a>(&self, elements: &'a [StateIndex]) -> BlockIter<'a> {
        BlockIter {
            elements,
            index: self.begin,
            end: self.marked_split,
        }
    }

    /// Returns true iff the block has marked elements.
    pub fn has_marked(&self) -> bool {
        self.assert_consistent();

        self.marked_split < self.end
    }

    /// Returns true iff the block has unmarked elements.
    pub fn has_unmarked(&self) -> bool {
        self.assert_consistent();

        self.begin < self.marked_split
    }

    /// Returns the number of elements in the block.
    pub fn len(&self) -> usize {
        self.assert_consistent();

        self.end - self.begin
    }

    /// Returns true iff the block is empty.
    pub fn is_empty(&self) -> bool {
        self.assert_consistent();

        self.begin == self.end
    }

    /// Returns the number of marked elements in the block.
    pub fn len_marked(&self) -> usize {
        self.assert_consistent();

        self.end - self.marked_split
    }

    /// Unmark all elements in the block.
    fn unmark_all(&mut self) {
        self.marked_split = self.end;
    }

    /// Returns true iff the block is consistent.
    fn assert_consistent(self) {
        debug_assert!(self.begin < self.end, "The range of block {self:?} is incorrect",);

        debug_assert!(
            self.begin <= self.marked_split,
            "The marked_split lies before the beginning of the block {self:?}"
        );

        debug_assert!(
            self.marked_split <= self.end,
            "The marked_split lies after the end of the block {self:?}"
        );
    }
}

pub struct BlockIter<'a> {
    elements: &'a [StateIndex],
    index: usize,
    end: usize,
}

impl Iterator for BlockIter<'_> {
    type Item = StateIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index < self.end {
            let element = self.elements[self.index];
            self.index += 1;
            Some(element)
        } else {
            None
        }
    }
}
