#![forbid(unsafe_code)]

use bitvec::bitvec;
use bitvec::order::Lsb0;

use lumper_mc::StateIndex;
use lumper_mc::StateSet;

use crate::BlockIndex;
use crate::IndexedPartition;
use crate::ReductionError;

/// Builds the initial partition from atomic proposition satisfaction sets:
/// two states share a block iff they satisfy exactly the same propositions.
///
/// # Details
///
/// Starts from the first proposition and its complement and repeatedly splits
/// every cell into the part inside and the part outside the next proposition,
/// never materializing empty cells. Every later refinement respects this
/// partition.
pub fn labelled_partition(num_of_states: usize, propositions: &[StateSet]) -> Result<IndexedPartition, ReductionError> {
    for (index, proposition) in propositions.iter().enumerate() {
        if proposition.len() != num_of_states {
            return Err(ReductionError::PropositionSize {
                index,
                len: proposition.len(),
                expected: num_of_states,
            });
        }
    }

    if num_of_states == 0 {
        return Ok(IndexedPartition::new(0));
    }

    let mut cells: Vec<StateSet> = Vec::new();
    match propositions.first() {
        None => {
            // Without propositions all states are initially indistinguishable.
            cells.push(bitvec![u64, Lsb0; 1; num_of_states]);
        }
        Some(first) => {
            let inside = first.clone();
            let outside = !first.clone();
            if inside.any() {
                cells.push(inside);
            }
            if outside.any() {
                cells.push(outside);
            }
        }
    }

    for proposition in propositions.iter().skip(1) {
        let complement = !proposition.clone();

        let size = cells.len();
        for index in 0..size {
            let mut inside = cells[index].clone();
            inside &= proposition.as_bitslice();

            if inside.any() {
                let mut outside = cells[index].clone();
                outside &= complement.as_bitslice();

                cells[index] = inside;
                if outside.any() {
                    cells.push(outside);
                }
            }
        }
    }

    let mut partition = IndexedPartition::new(num_of_states);
    for (block, cell) in cells.iter().enumerate() {
        for state in cell.iter_ones() {
            partition.set_block(StateIndex::new(state), BlockIndex::new(block));
        }
    }

    Ok(partition)
}

/// Builds an initial partition from explicitly given blocks. Fails fast when
/// the blocks overlap or leave a state uncovered; empty blocks are skipped.
pub fn partition_from_blocks(num_of_states: usize, blocks: &[StateSet]) -> Result<IndexedPartition, ReductionError> {
    for (index, block) in blocks.iter().enumerate() {
        if block.len() != num_of_states {
            return Err(ReductionError::BlockSize {
                index,
                len: block.len(),
                expected: num_of_states,
            });
        }
    }

    let mut count = vec![0usize; num_of_states];
    let mut partition = IndexedPartition::new(num_of_states);

    let mut next = 0;
    for block in blocks {
        if block.not_any() {
            continue;
        }

        for state in block.iter_ones() {
            count[state] += 1;
            partition.set_block(StateIndex::new(state), BlockIndex::new(next));
        }
        next += 1;
    }

    for (state, &count) in count.iter().enumerate() {
        if count != 1 {
            return Err(ReductionError::NotAPartition { state, count });
        }
    }

    Ok(partition)
}
