#![forbid(unsafe_code)]

use log::info;
use log::trace;

use lumper_mc::IncomingTransitions;
use lumper_mc::StateIndex;
use lumper_utilities::TimeProgress;

use crate::BlockIndex;
use crate::IndexedPartition;
use crate::Partition;
use crate::Signature;
use crate::SignatureBatch;
use crate::Worklist;
use crate::renumber_partition;

/// Computes the probabilistic bisimilarity partition by sorting signature
/// batches, processing all co-pending splitter blocks of a round together.
///
/// # Details
///
/// Every round accumulates, for each state with a transition into one of the
/// round's splitters, a signature of the probability mass into each splitter.
/// Sorting the batch makes equal signatures adjacent, and every maximal run
/// that does not cover its whole old block becomes a new block. Of the
/// sub-blocks a block is split into, the largest one is exempted from the
/// next rounds.
pub fn signature_refinement_rounds(incoming: &IncomingTransitions, initial: &IndexedPartition) -> IndexedPartition {
    let num_of_states = initial.len();

    let mut block_of: Vec<BlockIndex> = (0..num_of_states)
        .map(|state| initial.block_number(StateIndex::new(state)))
        .collect();
    let mut members: Vec<Vec<StateIndex>> = vec![Vec::new(); initial.num_of_blocks()];
    for (state, &block) in block_of.iter().enumerate() {
        members[block].push(StateIndex::new(state));
    }

    // All initial blocks are potential splitters.
    let mut worklist = Worklist::with_capacity(members.len());
    for block in (0..members.len()).map(BlockIndex::new) {
        worklist.push(block);
    }

    let mut batch = SignatureBatch::default();
    let mut touched = vec![false; num_of_states];
    let mut batch_slot = vec![0usize; num_of_states];

    let progress = TimeProgress::new(
        |(iteration, blocks)| {
            info!("Iteration {iteration}, found {blocks} blocks...");
        },
        5,
    );

    let mut iteration = 0usize;
    while !worklist.is_empty() {
        // The splitters are processed in ascending order so that signature
        // entries are accumulated in ascending block order.
        let splitters = worklist.drain_sorted();

        batch.clear();
        touched.fill(false);
        for &splitter in &splitters {
            for &target in &members[splitter] {
                for edge in incoming.incoming_transitions(target) {
                    let source = edge.from;
                    if !touched[source] {
                        // First transition of this source into the splitters.
                        touched[source] = true;
                        batch_slot[source] = batch.len();
                        batch.push(Signature::new(source, block_of[source], splitter, edge.weight));
                    } else {
                        batch.get_mut(batch_slot[source]).add(splitter, edge.weight);
                    }
                }
            }
        }

        batch.sort();
        trace!("Iteration {iteration} batch {batch}");

        // Walk the sorted batch; runs of equal signatures within an old block
        // become new blocks.
        let mut checked = 0;
        while checked < batch.len() {
            let old_block = batch.get(checked).old_block();
            let old_size = members[old_block].len();

            let mut new_blocks: Vec<BlockIndex> = Vec::new();
            while checked < batch.len() && batch.get(checked).old_block() == old_block {
                let run_start = checked;
                checked += 1;
                while checked < batch.len() && !batch.is_first(checked) {
                    checked += 1;
                }

                if checked - run_start != old_size {
                    // The run does not cover the whole block, so it becomes a
                    // new block.
                    let new_block = BlockIndex::new(members.len());
                    let mut new_members = Vec::with_capacity(checked - run_start);
                    for index in run_start..checked {
                        let state = batch.get(index).state();
                        block_of[state] = new_block;
                        new_members.push(state);
                    }
                    members.push(new_members);
                    new_blocks.push(new_block);
                }
            }

            if !new_blocks.is_empty() {
                members[old_block].retain(|&state| block_of[state] == old_block);
                let remaining = members[old_block].len();

                let mut max_block = new_blocks[0];
                for &block in &new_blocks {
                    worklist.push(block);
                    if members[block].len() > members[max_block].len() {
                        max_block = block;
                    }
                }

                // Keep the largest sub-block out of the worklist; when a new
                // block outweighs what remains of the old block, the remainder
                // takes its place.
                if members[max_block].len() > remaining {
                    worklist.remove(max_block);
                    worklist.push(old_block);
                }
            }
        }

        iteration += 1;
        progress.print((iteration, members.len()));
    }

    renumber_partition(&IndexedPartition::with_partition(block_of, members.len()))
}

/// Computes the probabilistic bisimilarity partition by sorting signature
/// batches, scheduling individual splitter states as soon as they are known.
///
/// # Details
///
/// Instead of a worklist of blocks, a queue of states is maintained; every
/// state of a newly created block re-enters the queue. Produces the same
/// partition as [signature_refinement_rounds].
pub fn signature_refinement_queue(incoming: &IncomingTransitions, initial: &IndexedPartition) -> IndexedPartition {
    let num_of_states = initial.len();

    let mut block_of: Vec<BlockIndex> = (0..num_of_states)
        .map(|state| initial.block_number(StateIndex::new(state)))
        .collect();
    let mut block_size: Vec<usize> = vec![0; initial.num_of_blocks()];
    for &block in &block_of {
        block_size[block] += 1;
    }

    // All states are initially pending splitter states.
    let mut queue: Vec<StateIndex> = (0..num_of_states).map(StateIndex::new).collect();
    let mut cursor = 0;

    let mut batch = SignatureBatch::default();
    let mut touched = vec![false; num_of_states];
    let mut batch_slot = vec![0usize; num_of_states];

    let progress = TimeProgress::new(
        |(iteration, blocks)| {
            info!("Iteration {iteration}, found {blocks} blocks...");
        },
        5,
    );

    let mut iteration = 0usize;
    while cursor < queue.len() {
        // Group the pending states by their current block so that signature
        // entries are accumulated in ascending block order.
        let mut segment: Vec<StateIndex> = queue[cursor..].to_vec();
        segment.sort_unstable_by_key(|&state| (block_of[state], state));
        cursor = queue.len();

        batch.clear();
        touched.fill(false);
        for &target in &segment {
            let block = block_of[target];
            for edge in incoming.incoming_transitions(target) {
                let source = edge.from;
                if !touched[source] {
                    touched[source] = true;
                    batch_slot[source] = batch.len();
                    batch.push(Signature::new(source, block_of[source], block, edge.weight));
                } else {
                    batch.get_mut(batch_slot[source]).add(block, edge.weight);
                }
            }
        }

        batch.sort();
        trace!("Iteration {iteration} batch {batch}");

        let mut checked = 0;
        while checked < batch.len() {
            let old_block = batch.get(checked).old_block();
            while checked < batch.len() && batch.get(checked).old_block() == old_block {
                let run_start = checked;
                checked += 1;
                while checked < batch.len() && !batch.is_first(checked) {
                    checked += 1;
                }

                // The block size shrinks as runs split off, so the run that is
                // left covering the whole remainder keeps the old block.
                if checked - run_start != block_size[old_block] {
                    let new_block = BlockIndex::new(block_size.len());
                    block_size.push(0);
                    for index in run_start..checked {
                        let state = batch.get(index).state();
                        block_of[state] = new_block;
                        queue.push(state);
                        block_size[new_block] += 1;
                        block_size[old_block] -= 1;
                    }
                }
            }
        }

        iteration += 1;
        progress.print((iteration, block_size.len()));
    }

    renumber_partition(&IndexedPartition::with_partition(block_of, block_size.len()))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use lumper_mc::MarkovChain;
    use lumper_mc::random_markov_chain;
    use lumper_mc::random_propositions;
    use lumper_utilities::random_test;

    use super::*;
    use crate::labelled_partition;

    #[test]
    fn test_random_signature_variants_agree() {
        random_test(100, |rng| {
            let mc = random_markov_chain(rng, 10);
            let propositions = random_propositions(rng, 10, 2);
            let initial = labelled_partition(mc.num_of_states(), &propositions).unwrap();
            let incoming = IncomingTransitions::new(&mc);

            let rounds = signature_refinement_rounds(&incoming, &initial);
            let queue = signature_refinement_queue(&incoming, &initial);

            // Both variants renumber by first occurrence, so the partitions
            // are identical, not merely equivalent.
            assert_eq!(rounds.num_of_blocks(), queue.num_of_blocks());
            for state in mc.iter_states() {
                assert_eq!(
                    rounds.block_number(state),
                    queue.block_number(state),
                    "The signature variants disagree on state {state}"
                );
            }
        });
    }
}
