#![forbid(unsafe_code)]

use bitvec::bitvec;
use bitvec::order::Lsb0;
use rand::Rng;

use crate::MarkovChain;
use crate::SparseMarkovChain;
use crate::StateIndex;
use crate::StateSet;

/// Generates a random Markov chain with the desired number of states.
///
/// Every ordered state pair becomes a transition with probability
/// 2·ln(n)/n, and the probability mass of a state is divided uniformly over
/// its chosen targets. States without any chosen target get a self loop, so
/// every row is a distribution.
pub fn random_markov_chain(rng: &mut impl Rng, num_of_states: usize) -> SparseMarkovChain<f64> {
    let mut chain = SparseMarkovChain::new(num_of_states);

    let threshold = 2.0 * (num_of_states as f64).ln() / num_of_states as f64;
    for source in chain.iter_states().collect::<Vec<_>>() {
        let targets: Vec<StateIndex> = chain
            .iter_states()
            .filter(|_| rng.random::<f64>() < threshold)
            .collect();

        if targets.is_empty() {
            chain.set_probability(source, source, 1.0);
        } else {
            let probability = 1.0 / targets.len() as f64;
            for target in targets {
                chain.set_probability(source, target, probability);
            }
        }
    }

    chain
}

/// Generates random atomic proposition satisfaction sets by drawing a label
/// mask for every state.
pub fn random_propositions(rng: &mut impl Rng, num_of_states: usize, num_of_propositions: u32) -> Vec<StateSet> {
    let mut propositions: Vec<StateSet> = (0..num_of_propositions)
        .map(|_| bitvec![u64, Lsb0; 0; num_of_states])
        .collect();

    for state in 0..num_of_states {
        let mask = rng.random_range(0..(1u64 << num_of_propositions));
        for (index, proposition) in propositions.iter_mut().enumerate() {
            if (mask >> index) & 1 == 1 {
                proposition.set(state, true);
            }
        }
    }

    propositions
}
