#![forbid(unsafe_code)]

use bitvec::bitvec;
use bitvec::order::Lsb0;
use thiserror::Error;

use lumper_mc::IncomingTransitions;
use lumper_mc::MarkovChain;
use lumper_mc::Model;
use lumper_mc::ModelKind;
use lumper_mc::Probability;
use lumper_mc::SparseMarkovChain;
use lumper_mc::StateIndex;
use lumper_mc::StateSet;
use lumper_utilities::Timing;

use crate::IndexedPartition;
use crate::Partition;
use crate::RedBlackTree;
use crate::SplayTree;
use crate::array_refinement;
use crate::baseline_refinement;
use crate::labelled_partition;
use crate::quotient_markov_chain;
use crate::signature_refinement_queue;
use crate::signature_refinement_rounds;
use crate::tree_refinement;

/// The interchangeable splitting strategies. All strategies produce the same
/// partition; they differ in their data structures and asymptotic behavior.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Strategy {
    /// Array based refinement with the majority candidate heuristic.
    Array,
    /// Signature sorting with all co-pending splitters processed per round.
    SignatureRounds,
    /// Signature sorting with per-state splitter scheduling.
    SignatureQueue,
    /// Incremental grouping with weight keyed splay trees.
    SplayTree,
    /// Incremental grouping with weight keyed red-black trees.
    RedBlackTree,
    /// Quadratic reference implementation used as a testing oracle.
    Baseline,
}

/// The reported failures of the reduction entry points. Degenerate inputs
/// such as empty chains or disconnected states are not errors.
#[derive(Debug, Error)]
pub enum ReductionError {
    /// The model is not the supported mutable explicit representation of a
    /// discrete-time chain. Not retryable.
    #[error("bisimulation minimisation is not supported for {0}s")]
    UnsupportedModel(ModelKind),

    /// A proposition satisfaction set does not match the state space.
    #[error("proposition {index} covers {len} states, but the chain has {expected}")]
    PropositionSize { index: usize, len: usize, expected: usize },

    /// An explicitly given initial block does not match the state space.
    #[error("initial block {index} covers {len} states, but the chain has {expected}")]
    BlockSize { index: usize, len: usize, expected: usize },

    /// The explicitly given initial blocks do not partition the state space.
    #[error("state {state} belongs to {count} initial blocks, expected exactly one")]
    NotAPartition { state: usize, count: usize },
}

/// Decides probabilistic bisimilarity for the given labelled Markov chain:
/// two states end up in the same block of the returned partition iff they are
/// probabilistic bisimilar. The initial partition is induced by the atomic
/// proposition satisfaction sets.
pub fn decide<V: Probability>(
    model: &Model<V>,
    propositions: &[StateSet],
    strategy: Strategy,
    timing: &mut Timing,
) -> Result<IndexedPartition, ReductionError> {
    let Model::DiscreteTime(mc) = model else {
        return Err(ReductionError::UnsupportedModel(model.kind()));
    };

    let initial = labelled_partition(mc.num_of_states(), propositions)?;
    Ok(refine(mc, &initial, strategy, timing))
}

/// Refines the given initial partition of the chain's states to the coarsest
/// stable partition, using the given strategy. Lower level entry point for
/// callers that construct the initial partition themselves, see
/// [crate::partition_from_blocks].
pub fn refine<M: MarkovChain>(
    mc: &M,
    initial: &IndexedPartition,
    strategy: Strategy,
    timing: &mut Timing,
) -> IndexedPartition {
    debug_assert_eq!(initial.len(), mc.num_of_states(), "The initial partition does not cover the chain");

    if mc.num_of_states() == 0 {
        return IndexedPartition::new(0);
    }

    if let Strategy::Baseline = strategy {
        let mut time = timing.start("refinement");
        let partition = baseline_refinement(mc, initial);
        time.finish();
        return partition;
    }

    let mut time_pre = timing.start("preprocess");
    let incoming = IncomingTransitions::new(mc);
    time_pre.finish();

    let mut time = timing.start("refinement");
    let partition = match strategy {
        Strategy::Array => array_refinement(&incoming, initial),
        Strategy::SignatureRounds => signature_refinement_rounds(&incoming, initial),
        Strategy::SignatureQueue => signature_refinement_queue(&incoming, initial),
        Strategy::SplayTree => tree_refinement::<SplayTree>(&incoming, initial),
        Strategy::RedBlackTree => tree_refinement::<RedBlackTree>(&incoming, initial),
        Strategy::Baseline => baseline_refinement(mc, initial),
    };
    time.finish();

    partition
}

/// Returns true iff the two states are bisimilar according to the partition.
pub fn are_bisimilar(partition: &IndexedPartition, left: StateIndex, right: StateIndex) -> bool {
    partition.block_number(left) == partition.block_number(right)
}

/// Decides probabilistic bisimilarity and returns the full pairwise matrix:
/// bit s·n + t is set iff states s and t are bisimilar.
pub fn bisimilar<V: Probability>(
    model: &Model<V>,
    propositions: &[StateSet],
    strategy: Strategy,
    timing: &mut Timing,
) -> Result<StateSet, ReductionError> {
    let partition = decide(model, propositions, strategy, timing)?;

    let num_of_states = partition.len();
    let mut matrix = bitvec![u64, Lsb0; 0; num_of_states * num_of_states];
    for left in (0..num_of_states).map(StateIndex::new) {
        for right in (0..num_of_states).map(StateIndex::new) {
            if are_bisimilar(&partition, left, right) {
                matrix.set(left.value() * num_of_states + right.value(), true);
            }
        }
    }

    Ok(matrix)
}

/// Performs bisimulation minimisation: reduces the given chain to its
/// quotient under probabilistic bisimilarity.
pub fn minimise<V: Probability>(
    model: &Model<V>,
    propositions: &[StateSet],
    strategy: Strategy,
    timing: &mut Timing,
) -> Result<SparseMarkovChain<V>, ReductionError> {
    let Model::DiscreteTime(mc) = model else {
        return Err(ReductionError::UnsupportedModel(model.kind()));
    };

    let initial = labelled_partition(mc.num_of_states(), propositions)?;
    let partition = refine(mc, &initial, strategy, timing);

    let mut time = timing.start("quotient");
    let quotient = quotient_markov_chain(mc, &partition);
    time.finish();

    Ok(quotient)
}

#[cfg(test)]
mod tests {
    use rand::Rng;
    use test_log::test;

    use lumper_mc::random_markov_chain;
    use lumper_mc::random_propositions;
    use lumper_utilities::random_test;

    use super::*;
    use crate::BlockIndex;

    const STRATEGIES: [Strategy; 6] = [
        Strategy::Array,
        Strategy::SignatureRounds,
        Strategy::SignatureQueue,
        Strategy::SplayTree,
        Strategy::RedBlackTree,
        Strategy::Baseline,
    ];

    /// Returns true iff the partitions induce the same equivalence relation,
    /// runs in O(n^2).
    fn equal_partitions(left: &impl Partition, right: &impl Partition) -> bool {
        // Check that states in the same block have a single (unique) number in
        // the other partition.
        for block_index in (0..left.num_of_blocks()).map(BlockIndex::new) {
            let mut other_block_index = None;

            for state_index in (0..left.len())
                .map(StateIndex::new)
                .filter(|&state_index| left.block_number(state_index) == block_index)
            {
                match other_block_index {
                    None => other_block_index = Some(right.block_number(state_index)),
                    Some(other_block_index) => {
                        if right.block_number(state_index) != other_block_index {
                            return false;
                        }
                    }
                }
            }
        }

        for block_index in (0..right.num_of_blocks()).map(BlockIndex::new) {
            let mut other_block_index = None;

            for state_index in (0..left.len())
                .map(StateIndex::new)
                .filter(|&state_index| right.block_number(state_index) == block_index)
            {
                match other_block_index {
                    None => other_block_index = Some(left.block_number(state_index)),
                    Some(other_block_index) => {
                        if left.block_number(state_index) != other_block_index {
                            return false;
                        }
                    }
                }
            }
        }

        true
    }

    /// Asserts that the bisimilarity matrix is an equivalence relation. A
    /// non-transitive triple is reported instead of silently resolved.
    fn assert_equivalence_matrix(matrix: &StateSet, num_of_states: usize) {
        let related = |s: usize, t: usize| matrix[s * num_of_states + t];

        for s in 0..num_of_states {
            assert!(related(s, s), "State {s} is not bisimilar to itself");
            for t in 0..num_of_states {
                assert_eq!(
                    related(s, t),
                    related(t, s),
                    "Bisimilarity of states {s} and {t} is not symmetric"
                );
                for u in 0..num_of_states {
                    if related(s, t) && related(t, u) {
                        assert!(
                            related(s, u),
                            "Non-transitive triple: {s} ~ {t} and {t} ~ {u} but not {s} ~ {u}"
                        );
                    }
                }
            }
        }
    }

    /// The scenario chain where two states differ by less than the accuracy:
    /// states 0 and 2 move to state 1 with probabilities s and s + e for an
    /// e below the accuracy, and to state 3 with the remainder.
    fn scenario_chain() -> (Model<f64>, Vec<StateSet>) {
        let s = 1.0 / 7.0;
        let e = 1E-10;

        let mut mc = SparseMarkovChain::new(4);
        mc.set_probability(StateIndex::new(1), StateIndex::new(1), 1.0);
        mc.set_probability(StateIndex::new(0), StateIndex::new(1), s);
        mc.set_probability(StateIndex::new(0), StateIndex::new(3), 1.0 - s);
        mc.set_probability(StateIndex::new(2), StateIndex::new(1), s + e);
        mc.set_probability(StateIndex::new(2), StateIndex::new(3), 1.0 - s - e);
        mc.set_probability(StateIndex::new(3), StateIndex::new(3), 1.0);

        let mut proposition = bitvec![u64, Lsb0; 0; 4];
        proposition.set(0, true);
        proposition.set(2, true);
        proposition.set(3, true);

        (Model::DiscreteTime(mc), vec![proposition])
    }

    #[test]
    fn test_random_cross_strategy_agreement() {
        random_test(100, |rng| {
            let num_of_states = rng.random_range(1..20);
            let mc = random_markov_chain(rng, num_of_states);
            let propositions = random_propositions(rng, num_of_states, 2);
            let model = Model::DiscreteTime(mc);
            let mut timing = Timing::new();

            let expected = decide(&model, &propositions, Strategy::Baseline, &mut timing).unwrap();

            for strategy in STRATEGIES {
                let result = decide(&model, &propositions, strategy, &mut timing).unwrap();
                assert!(
                    equal_partitions(&result, &expected),
                    "Strategy {strategy:?} disagrees with the baseline: {result} instead of {expected}"
                );
            }
        });
    }

    #[test]
    fn test_random_matrix_is_equivalence() {
        random_test(100, |rng| {
            let num_of_states = rng.random_range(1..15);
            let mc = random_markov_chain(rng, num_of_states);
            let propositions = random_propositions(rng, num_of_states, 2);
            let model = Model::DiscreteTime(mc);
            let mut timing = Timing::new();

            for strategy in STRATEGIES {
                let matrix = bisimilar(&model, &propositions, strategy, &mut timing).unwrap();
                assert_equivalence_matrix(&matrix, num_of_states);
            }
        });
    }

    #[test]
    fn test_random_refines_initial_partition() {
        random_test(100, |rng| {
            let num_of_states = rng.random_range(1..15);
            let mc = random_markov_chain(rng, num_of_states);
            let propositions = random_propositions(rng, num_of_states, 2);
            let model = Model::DiscreteTime(mc);
            let mut timing = Timing::new();

            let initial = labelled_partition(num_of_states, &propositions).unwrap();
            for strategy in STRATEGIES {
                let result = decide(&model, &propositions, strategy, &mut timing).unwrap();

                // States with different labels are never merged.
                for left in (0..num_of_states).map(StateIndex::new) {
                    for right in (0..num_of_states).map(StateIndex::new) {
                        if initial.block_number(left) != initial.block_number(right) {
                            assert!(
                                !are_bisimilar(&result, left, right),
                                "Strategy {strategy:?} merged the differently labelled states {left} and {right}"
                            );
                        }
                    }
                }
            }
        });
    }

    #[test]
    fn test_random_idempotence() {
        random_test(100, |rng| {
            let num_of_states = rng.random_range(1..15);
            let mc = random_markov_chain(rng, num_of_states);
            let propositions = random_propositions(rng, num_of_states, 2);
            let model = Model::DiscreteTime(mc);
            let mut timing = Timing::new();

            for strategy in STRATEGIES {
                let first = decide(&model, &propositions, strategy, &mut timing).unwrap();
                let second = decide(&model, &propositions, strategy, &mut timing).unwrap();
                assert!(equal_partitions(&first, &second));
            }
        });
    }

    #[test]
    fn test_scenario_below_accuracy() {
        let (model, propositions) = scenario_chain();
        let mut timing = Timing::new();

        for strategy in STRATEGIES {
            let partition = decide(&model, &propositions, strategy, &mut timing).unwrap();

            assert_eq!(partition.num_of_blocks(), 3, "Strategy {strategy:?}");

            // The probabilities of states 0 and 2 differ by less than the
            // accuracy, so they are bisimilar; states 1 and 3 stand alone.
            assert!(are_bisimilar(&partition, StateIndex::new(0), StateIndex::new(2)));
            assert!(!are_bisimilar(&partition, StateIndex::new(0), StateIndex::new(1)));
            assert!(!are_bisimilar(&partition, StateIndex::new(0), StateIndex::new(3)));
            assert!(!are_bisimilar(&partition, StateIndex::new(1), StateIndex::new(3)));
        }
    }

    #[test]
    fn test_scenario_minimise() {
        let (model, propositions) = scenario_chain();
        let mut timing = Timing::new();

        let quotient = minimise(&model, &propositions, Strategy::Array, &mut timing).unwrap();

        // The quotient collapses states 0 and 2 and keeps the transition
        // weights of the representative.
        assert_eq!(quotient.num_of_states(), 3);
        let total: f64 = (0..3)
            .map(|target| {
                quotient
                    .probability(StateIndex::new(0), StateIndex::new(target))
                    .to_double()
            })
            .sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_chain() {
        let model: Model<f64> = Model::DiscreteTime(SparseMarkovChain::new(0));
        let mut timing = Timing::new();

        for strategy in STRATEGIES {
            let partition = decide(&model, &[], strategy, &mut timing).unwrap();
            assert_eq!(partition.len(), 0);
            assert_eq!(partition.num_of_blocks(), 0);
        }
    }

    #[test]
    fn test_single_state() {
        let mut mc = SparseMarkovChain::new(1);
        mc.set_probability(StateIndex::new(0), StateIndex::new(0), 1.0);
        let model = Model::DiscreteTime(mc);
        let mut timing = Timing::new();

        for strategy in STRATEGIES {
            let partition = decide(&model, &[], strategy, &mut timing).unwrap();
            assert_eq!(partition.num_of_blocks(), 1);
        }
    }

    #[test]
    fn test_disconnected_states() {
        // States without any transitions are valid degenerate input.
        let model: Model<f64> = Model::DiscreteTime(SparseMarkovChain::new(3));
        let mut timing = Timing::new();

        for strategy in STRATEGIES {
            let partition = decide(&model, &[], strategy, &mut timing).unwrap();
            assert_eq!(partition.num_of_blocks(), 1, "Strategy {strategy:?}");
        }
    }

    #[test]
    fn test_uniform_chain_collapses() {
        let mut mc = SparseMarkovChain::new(5);
        for source in (0..5).map(StateIndex::new) {
            for target in (0..5).map(StateIndex::new) {
                mc.set_probability(source, target, 0.2);
            }
        }
        let model = Model::DiscreteTime(mc);
        let mut timing = Timing::new();

        for strategy in STRATEGIES {
            let partition = decide(&model, &[], strategy, &mut timing).unwrap();
            assert_eq!(partition.num_of_blocks(), 1, "Strategy {strategy:?}");
        }
    }

    #[test]
    fn test_fully_discriminated_chain() {
        // Every state carries a unique label combination, so every state
        // keeps its own block.
        let num_of_states = 8;
        let mut mc = SparseMarkovChain::new(num_of_states);
        for state in (0..num_of_states).map(StateIndex::new) {
            mc.set_probability(state, state, 1.0);
        }

        let mut propositions = Vec::new();
        for bit in 0..3 {
            let mut proposition = bitvec![u64, Lsb0; 0; num_of_states];
            for state in 0..num_of_states {
                if (state >> bit) & 1 == 1 {
                    proposition.set(state, true);
                }
            }
            propositions.push(proposition);
        }

        let model = Model::DiscreteTime(mc);
        let mut timing = Timing::new();

        for strategy in STRATEGIES {
            let partition = decide(&model, &propositions, strategy, &mut timing).unwrap();
            assert_eq!(partition.num_of_blocks(), num_of_states, "Strategy {strategy:?}");
        }
    }

    #[test]
    fn test_unsupported_model() {
        let model: Model<f64> = Model::ContinuousTime(SparseMarkovChain::new(2));
        let mut timing = Timing::new();

        let result = decide(&model, &[], Strategy::Array, &mut timing);
        assert!(matches!(result, Err(ReductionError::UnsupportedModel(ModelKind::ContinuousTime))));

        let result = minimise(&model, &[], Strategy::Array, &mut timing);
        assert!(matches!(result, Err(ReductionError::UnsupportedModel(ModelKind::ContinuousTime))));
    }
}
