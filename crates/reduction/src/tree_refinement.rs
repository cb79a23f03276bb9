#![forbid(unsafe_code)]

use log::info;
use log::trace;

use lumper_mc::IncomingTransitions;
use lumper_mc::StateIndex;
use lumper_utilities::TimeProgress;
use rustc_hash::FxHashSet;

use crate::BlockIndex;
use crate::IndexedPartition;
use crate::Partition;
use crate::SplitterTree;
use crate::Worklist;
use crate::renumber_partition;

/// Computes the probabilistic bisimilarity partition by incrementally
/// grouping the predecessors of one splitter at a time in weight keyed search
/// trees.
///
/// # Details
///
/// Every predecessor of the current splitter is taken out of its owning block
/// and inserted into that block's tree under its accumulated weight into the
/// splitter; weights within the accuracy share a node, and every node owns a
/// block. Afterwards each block that lost states has dissolved into one block
/// per surviving node, its tree is reset, and the largest resulting sub-block
/// is exempted from the worklist. The tree implementation is interchangeable,
/// see [SplitterTree].
pub fn tree_refinement<T: SplitterTree>(incoming: &IncomingTransitions, initial: &IndexedPartition) -> IndexedPartition {
    let num_of_states = initial.len();

    let mut block_of: Vec<BlockIndex> = (0..num_of_states)
        .map(|state| initial.block_number(StateIndex::new(state)))
        .collect();
    let mut members: Vec<Vec<StateIndex>> = vec![Vec::new(); initial.num_of_blocks()];
    let mut position: Vec<usize> = vec![0; num_of_states];
    for (state, &block) in block_of.iter().enumerate() {
        position[state] = members[block].len();
        members[block].push(StateIndex::new(state));
    }
    let mut trees: Vec<T> = (0..members.len()).map(|_| T::default()).collect();

    // All initial blocks are potential splitters.
    let mut worklist = Worklist::with_capacity(members.len());
    for block in (0..members.len()).map(BlockIndex::new) {
        worklist.push(block);
    }

    // The total probability of going to the current splitter; zero doubles as
    // the untouched flag since all transition weights are positive.
    let mut weight = vec![0.0f64; num_of_states];
    let mut predecessors: Vec<StateIndex> = Vec::new();
    let mut partitioned: Vec<BlockIndex> = Vec::new();
    let mut partitioned_set: FxHashSet<BlockIndex> = FxHashSet::default();

    let progress = TimeProgress::new(
        |(iteration, blocks)| {
            info!("Iteration {iteration}, found {blocks} blocks...");
        },
        5,
    );

    let mut iteration = 0usize;
    while let Some(splitter) = worklist.pop() {
        if members[splitter].is_empty() {
            // The block dissolved completely in an earlier split.
            continue;
        }

        predecessors.clear();
        for &target in &members[splitter] {
            for edge in incoming.incoming_transitions(target) {
                if weight[edge.from] == 0.0 {
                    predecessors.push(edge.from);
                    weight[edge.from] = edge.weight;
                } else {
                    weight[edge.from] += edge.weight;
                }
            }
        }

        // Move every predecessor from its owning block into that block's
        // weight keyed tree.
        partitioned.clear();
        partitioned_set.clear();
        for &state in &predecessors {
            let block = block_of[state];

            // Remove the state from the member list of its block.
            let last = members[block].len() - 1;
            let offset = position[state];
            members[block].swap(offset, last);
            position[members[block][offset]] = offset;
            members[block].pop();

            let candidate = BlockIndex::new(members.len());
            let target_block = match trees[block].insert(weight[state], candidate) {
                Some(existing) => existing,
                None => {
                    members.push(Vec::new());
                    trees.push(T::default());
                    candidate
                }
            };

            block_of[state] = target_block;
            position[state] = members[target_block].len();
            members[target_block].push(state);

            if partitioned_set.insert(block) {
                partitioned.push(block);
            }
        }

        for &block in &partitioned {
            // The block has dissolved into one block per surviving tree node;
            // requeue them all and keep the largest sub-block out.
            let mut max_block = block;
            for node_block in trees[block].blocks() {
                worklist.push(node_block);
                if members[node_block].len() > members[max_block].len() {
                    max_block = node_block;
                }
            }

            if !worklist.contains(block) && max_block != block {
                worklist.push(block);
                worklist.remove(max_block);
            }

            if members[block].is_empty() {
                worklist.remove(block);
            }
            trees[block].clear();
        }

        // Reset the weights of the predecessors for the next splitter.
        for &state in &predecessors {
            weight[state] = 0.0;
        }

        iteration += 1;
        progress.print((iteration, members.len()));
        trace!("Iteration {iteration} splitter {splitter} produced {} blocks", members.len());
    }

    renumber_partition(&IndexedPartition::with_partition(block_of, members.len()))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use lumper_mc::MarkovChain;
    use lumper_mc::random_markov_chain;
    use lumper_mc::random_propositions;
    use lumper_utilities::random_test;

    use super::*;
    use crate::RedBlackTree;
    use crate::SplayTree;
    use crate::baseline_refinement;
    use crate::labelled_partition;

    #[test]
    fn test_random_tree_refinement() {
        random_test(100, |rng| {
            let mc = random_markov_chain(rng, 10);
            let propositions = random_propositions(rng, 10, 2);
            let initial = labelled_partition(mc.num_of_states(), &propositions).unwrap();
            let incoming = IncomingTransitions::new(&mc);

            let splay = tree_refinement::<SplayTree>(&incoming, &initial);
            let red_black = tree_refinement::<RedBlackTree>(&incoming, &initial);
            let expected = baseline_refinement(&mc, &initial);

            assert_eq!(splay.num_of_blocks(), expected.num_of_blocks());
            assert_eq!(red_black.num_of_blocks(), expected.num_of_blocks());
            for state in mc.iter_states() {
                assert_eq!(
                    splay.block_number(state),
                    expected.block_number(state),
                    "The splay tree strategy disagrees with the baseline on state {state}"
                );
                assert_eq!(
                    red_black.block_number(state),
                    expected.block_number(state),
                    "The red-black tree strategy disagrees with the baseline on state {state}"
                );
            }
        });
    }
}
