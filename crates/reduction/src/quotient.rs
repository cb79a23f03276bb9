#![forbid(unsafe_code)]

use lumper_mc::MarkovChain;
use lumper_mc::SparseMarkovChain;
use lumper_mc::StateIndex;

use crate::IndexedPartition;
use crate::Partition;

/// Returns the quotient of the given chain under the given partition: every
/// block becomes one state, and the transition weight between two blocks is
/// the summed weight from a representative state into the members of the
/// target block.
///
/// # Details
///
/// The first state of every block is chosen as its representative; any member
/// is valid since the members' distributions over blocks agree up to the
/// accuracy. The summed weights keep the chain's probability representation,
/// they are not evaluated to doubles.
pub fn quotient_markov_chain<M: MarkovChain>(mc: &M, partition: &IndexedPartition) -> SparseMarkovChain<M::Value> {
    debug_assert_eq!(
        partition.len(),
        mc.num_of_states(),
        "The partition does not cover the chain"
    );

    let mut representative: Vec<Option<StateIndex>> = vec![None; partition.num_of_blocks()];
    for state in mc.iter_states() {
        let block = partition.block_number(state);
        if representative[block.value()].is_none() {
            representative[block.value()] = Some(state);
        }
    }

    let mut quotient = SparseMarkovChain::new(partition.num_of_blocks());
    for (block, representative) in representative.iter().enumerate() {
        let representative = representative.expect("Every block of a dense partition has a representative");

        for transition in mc.outgoing_transitions(representative) {
            let target_block = partition.block_number(transition.to);
            quotient.add_to_probability(
                StateIndex::new(block),
                StateIndex::new(target_block.value()),
                transition.probability,
            );
        }
    }

    quotient
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use lumper_mc::Probability;

    use super::*;
    use crate::BlockIndex;

    #[test]
    fn test_quotient_sums_weights() {
        // States 1 and 2 form one block; the weight from state 0 into the
        // block is the sum of the weights into its members.
        let mut mc = SparseMarkovChain::new(3);
        mc.set_probability(StateIndex::new(0), StateIndex::new(1), 0.25);
        mc.set_probability(StateIndex::new(0), StateIndex::new(2), 0.75);
        mc.set_probability(StateIndex::new(1), StateIndex::new(1), 1.0);
        mc.set_probability(StateIndex::new(2), StateIndex::new(2), 1.0);

        let mut partition = IndexedPartition::new(3);
        partition.set_block(StateIndex::new(0), BlockIndex::new(0));
        partition.set_block(StateIndex::new(1), BlockIndex::new(1));
        partition.set_block(StateIndex::new(2), BlockIndex::new(1));

        let quotient = quotient_markov_chain(&mc, &partition);

        assert_eq!(quotient.num_of_states(), 2);
        assert!(
            (quotient.probability(StateIndex::new(0), StateIndex::new(1)).to_double() - 1.0).abs() < 1e-12
        );
        assert!(
            (quotient.probability(StateIndex::new(1), StateIndex::new(1)).to_double() - 1.0).abs() < 1e-12
        );
    }
}
