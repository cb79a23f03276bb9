#![forbid(unsafe_code)]

use log::info;
use log::trace;

use lumper_mc::IncomingTransitions;
use lumper_mc::StateIndex;
use lumper_utilities::TimeProgress;

use crate::BlockIndex;
use crate::BlockPartition;
use crate::IndexedPartition;
use crate::Partition;
use crate::Worklist;
use crate::is_weight_equal;
use crate::renumber_partition;

/// Computes the probabilistic bisimilarity partition with the array based
/// splitting strategy.
///
/// # Details
///
/// States and blocks are represented by numbers. All states are kept in a
/// single array so that states of the same block are next to each other, with
/// a borderline per block separating its marked states; marking is a single
/// swap. Per splitter, the predecessors' accumulated weights are grouped
/// around a majority candidate found by a linear voting pass, so that only
/// the states disagreeing with the majority have to be sorted. Of the blocks
/// a split produces, the largest one is exempted from the worklist, which
/// bounds the total work.
pub fn array_refinement(incoming: &IncomingTransitions, initial: &IndexedPartition) -> IndexedPartition {
    let num_of_states = initial.len();
    let mut partition = BlockPartition::from_partition(initial);

    // All initial blocks are potential splitters.
    let mut worklist = Worklist::with_capacity(partition.num_of_blocks());
    for block in (0..partition.num_of_blocks()).map(BlockIndex::new) {
        worklist.push(block);
    }

    // The total probability of going to the current splitter; zero doubles as
    // the untouched flag since all transition weights are positive.
    let mut weight = vec![0.0f64; num_of_states];
    let mut touched_states: Vec<StateIndex> = Vec::new();
    let mut touched_blocks: Vec<BlockIndex> = Vec::new();

    let progress = TimeProgress::new(
        |(iteration, blocks)| {
            info!("Iteration {iteration}, found {blocks} blocks...");
        },
        5,
    );

    let mut iteration = 0usize;
    while let Some(splitter) = worklist.pop() {
        touched_states.clear();
        touched_blocks.clear();

        // Accumulate the weight into the splitter for every predecessor.
        for target in partition.iter_block(splitter) {
            for edge in incoming.incoming_transitions(target) {
                if weight[edge.from] == 0.0 {
                    touched_states.push(edge.from);
                    weight[edge.from] = edge.weight;
                } else {
                    weight[edge.from] += edge.weight;
                }
            }
        }

        // Mark every touched state in its block.
        for &state in &touched_states {
            let block = partition.block_number(state);
            if !partition.block(block).has_marked() {
                touched_blocks.push(block);
            }
            partition.mark_element(state);
        }

        for &block in &touched_blocks {
            let blocks_before = partition.num_of_blocks();

            // Split off the marked part; a fully marked block keeps its
            // identity.
            let marked_block = partition.split_marked(block);

            // Estimate the majority weight with a single voting pass and mark
            // the states that disagree with it.
            let candidate = possible_majority(&partition, marked_block, &weight);
            let differing: Vec<StateIndex> = partition
                .iter_block(marked_block)
                .filter(|&state| !is_weight_equal(weight[state], candidate))
                .collect();
            for &state in &differing {
                partition.mark_element(state);
            }

            if partition.block(marked_block).has_marked() {
                // Only the minority disagreeing with the majority candidate
                // has to be distinguished pairwise, by sorting it on weight
                // and cutting at every tolerance boundary.
                let minority = partition.split_marked(marked_block);
                partition.sort_block_by_weight(minority, &weight);

                // Splitting off the finished prefix leaves the remainder of
                // the sorted run under the minority block.
                let (begin, end) = (partition.block(minority).begin(), partition.block(minority).end());
                for position in begin + 1..end {
                    if !is_weight_equal(weight[partition.element(position)], weight[partition.element(position - 1)]) {
                        partition.split_prefix(minority, position);
                    }
                }
            }

            // Add the new blocks as potential splitters, exempting the
            // largest of the blocks this split produced.
            let mut max_block = block;
            for new_block in (blocks_before..partition.num_of_blocks()).map(BlockIndex::new) {
                worklist.push(new_block);
                if partition.block(new_block).len() > partition.block(max_block).len() {
                    max_block = new_block;
                }
            }
            if max_block != block && !worklist.contains(block) {
                worklist.push(block);
                worklist.remove(max_block);
            }
        }

        // Reset the weights of the touched states for the next splitter.
        for &state in &touched_states {
            weight[state] = 0.0;
        }

        iteration += 1;
        progress.print((iteration, partition.num_of_blocks()));
        trace!("Iteration {iteration} partition {partition}");
    }

    renumber_partition(&partition)
}

/// Estimates the possible majority of the weights of all states in the block
/// with a single Boyer-Moore voting pass. When some weight occurs in more
/// than half of the block, it is the returned candidate.
fn possible_majority(partition: &BlockPartition, block: BlockIndex, weight: &[f64]) -> f64 {
    let mut count = 0usize;
    let mut candidate = 0.0;
    for state in partition.iter_block(block) {
        if count == 0 {
            candidate = weight[state];
            count = 1;
        } else if is_weight_equal(candidate, weight[state]) {
            count += 1;
        } else {
            count -= 1;
        }
    }

    candidate
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use lumper_mc::MarkovChain;
    use lumper_mc::random_markov_chain;
    use lumper_mc::random_propositions;
    use lumper_utilities::random_test;

    use super::*;
    use crate::Partition;
    use crate::baseline_refinement;
    use crate::labelled_partition;

    #[test]
    fn test_random_array_refinement() {
        random_test(100, |rng| {
            let mc = random_markov_chain(rng, 10);
            let propositions = random_propositions(rng, 10, 2);
            let initial = labelled_partition(mc.num_of_states(), &propositions).unwrap();
            let incoming = IncomingTransitions::new(&mc);

            let result = array_refinement(&incoming, &initial);
            let expected = baseline_refinement(&mc, &initial);

            assert_eq!(result.num_of_blocks(), expected.num_of_blocks());
            for state in mc.iter_states() {
                assert_eq!(
                    result.block_number(state),
                    expected.block_number(state),
                    "The array strategy disagrees with the baseline on state {state}"
                );
            }
        });
    }
}
