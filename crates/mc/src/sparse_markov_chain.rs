#![forbid(unsafe_code)]

use std::fmt;

use crate::MarkovChain;
use crate::Probability;
use crate::StateIndex;
use crate::Transition;

/// The mutable explicit representation of a discrete-time Markov chain.
///
/// # Details
///
/// Stores for every state a sparse distribution over target states, kept
/// sorted by target index so that probability lookups are binary searches.
/// Only non-zero probabilities are stored; setting an entry to zero removes
/// it. This is the only representation the reduction algorithms accept.
#[derive(Clone, PartialEq)]
pub struct SparseMarkovChain<V> {
    rows: Vec<Vec<(StateIndex, V)>>,
}

impl<V: Probability> SparseMarkovChain<V> {
    /// Creates a new chain with the given number of states and no transitions.
    pub fn new(num_of_states: usize) -> Self {
        Self {
            rows: vec![Vec::new(); num_of_states],
        }
    }

    /// Sets the probability of moving from the source to the target state,
    /// replacing any previously stored value. Setting the zero value removes
    /// the entry.
    pub fn set_probability(&mut self, source: StateIndex, target: StateIndex, value: V) {
        debug_assert!(
            source.value() < self.rows.len() && target.value() < self.rows.len(),
            "Transition ({source}, {target}) out of bounds for {} states",
            self.rows.len()
        );

        let row = &mut self.rows[source];
        match row.binary_search_by_key(&target, |(to, _)| *to) {
            Ok(position) => {
                if value.is_zero() {
                    row.remove(position);
                } else {
                    row[position].1 = value;
                }
            }
            Err(position) => {
                if !value.is_zero() {
                    row.insert(position, (target, value));
                }
            }
        }
    }

    /// Adds the given value to the probability of moving from the source to
    /// the target state.
    pub fn add_to_probability(&mut self, source: StateIndex, target: StateIndex, value: V) {
        debug_assert!(
            source.value() < self.rows.len() && target.value() < self.rows.len(),
            "Transition ({source}, {target}) out of bounds for {} states",
            self.rows.len()
        );

        let row = &mut self.rows[source];
        match row.binary_search_by_key(&target, |(to, _)| *to) {
            Ok(position) => {
                row[position].1 = row[position].1.add(&value);
            }
            Err(position) => {
                if !value.is_zero() {
                    row.insert(position, (target, value));
                }
            }
        }
    }
}

impl<V: Probability> MarkovChain for SparseMarkovChain<V> {
    type Value = V;

    fn num_of_states(&self) -> usize {
        self.rows.len()
    }

    fn num_of_transitions(&self) -> usize {
        self.rows.iter().map(|row| row.len()).sum()
    }

    fn probability(&self, source: StateIndex, target: StateIndex) -> V {
        let row = &self.rows[source];
        match row.binary_search_by_key(&target, |(to, _)| *to) {
            Ok(position) => row[position].1.clone(),
            Err(_) => V::zero(),
        }
    }

    fn outgoing_transitions(&self, state_index: StateIndex) -> impl Iterator<Item = Transition<V>> + '_ {
        self.rows[state_index]
            .iter()
            .map(|(to, probability)| Transition::new(*to, probability.clone()))
    }

    fn iter_states(&self) -> impl Iterator<Item = StateIndex> + '_ {
        (0..self.num_of_states()).map(StateIndex::new)
    }
}

impl<V: fmt::Debug> fmt::Debug for SparseMarkovChain<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Transitions:")?;
        for (state, row) in self.rows.iter().enumerate() {
            for (to, probability) in row {
                writeln!(f, "    {} --[{:?}]-> {}", state, probability, to)?;
            }
        }
        Ok(())
    }
}
