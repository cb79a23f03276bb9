#![forbid(unsafe_code)]

use crate::MarkovChain;
use crate::Probability;
use crate::StateIndex;

/// A single incoming transition of a state, with its weight already evaluated
/// to a double.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IncomingTransition {
    pub from: StateIndex,
    pub weight: f64,
}

/// Stores the incoming transitions for a given Markov chain.
///
/// Built in one pass over the chain; for every transition with positive
/// weight the pair (source, weight) is appended to the target's predecessor
/// list. Consumed read-only by the refinement algorithms.
pub struct IncomingTransitions {
    transition_from: Vec<StateIndex>,
    transition_weight: Vec<f64>,
    state2incoming: Vec<usize>,
}

impl IncomingTransitions {
    pub fn new(mc: &impl MarkovChain) -> Self {
        let mut state2incoming = vec![0usize; mc.num_of_states()];

        // Count the number of incoming transitions for each state.
        let mut num_of_transitions = 0;
        for state_index in mc.iter_states() {
            for transition in mc.outgoing_transitions(state_index) {
                if !transition.probability.is_zero() {
                    state2incoming[transition.to] += 1;
                    num_of_transitions += 1;
                }
            }
        }

        // Compute the start offsets (prefix sum).
        let mut offset = 0;
        for start in state2incoming.iter_mut() {
            let new_offset = offset + *start;
            *start = offset;
            offset = new_offset;
        }

        // Place the transitions.
        let mut transition_from = vec![StateIndex::new(0); num_of_transitions];
        let mut transition_weight = vec![0.0f64; num_of_transitions];
        for state_index in mc.iter_states() {
            for transition in mc.outgoing_transitions(state_index) {
                if !transition.probability.is_zero() {
                    let start = &mut state2incoming[transition.to];
                    transition_from[*start] = state_index;
                    transition_weight[*start] = transition.probability.to_double();
                    *start += 1;
                }
            }
        }

        // Reset the offsets.
        let mut previous = 0;
        for start in state2incoming.iter_mut() {
            let result = *start;
            *start = previous;
            previous = result;
        }

        // Add the sentinel state.
        state2incoming.push(num_of_transitions);

        Self {
            transition_from,
            transition_weight,
            state2incoming,
        }
    }

    /// Returns an iterator over the incoming transitions for the given state.
    pub fn incoming_transitions(&self, state_index: StateIndex) -> impl Iterator<Item = IncomingTransition> + '_ {
        let start = self.state2incoming[state_index.value()];
        let end = self.state2incoming[state_index.value() + 1];
        (start..end).map(move |i| IncomingTransition {
            from: self.transition_from[i],
            weight: self.transition_weight[i],
        })
    }
}
