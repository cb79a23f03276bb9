#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use log::trace;

use lumper_mc::MarkovChain;
use lumper_mc::Probability;
use lumper_mc::StateIndex;

use crate::BlockIndex;
use crate::IndexedPartition;
use crate::Partition;
use crate::is_weight_equal;
use crate::renumber_partition;

/// A sub-class a class splits into during one round, chained to the next
/// sub-class with a different weight.
#[derive(Clone, Default)]
struct SubClass {
    initialized: bool,
    value: f64,
    next: Option<usize>,
}

/// Computes the probabilistic bisimilarity partition with a straightforward
/// quadratic algorithm, used as the oracle to validate the other strategies.
///
/// # Details
///
/// Per splitter the weight of every state into the splitter is recomputed by
/// a full scan over the probability matrix. States are then re-distributed
/// over a chain of sub-classes per class, where a state joins the first
/// sub-class whose weight matches within the accuracy. Every block a split
/// produces re-enters the splitter set; no amortization rule is applied.
pub fn baseline_refinement<M: MarkovChain>(mc: &M, initial: &IndexedPartition) -> IndexedPartition {
    let num_of_states = mc.num_of_states();

    let mut class_of: Vec<usize> = (0..num_of_states)
        .map(|state| initial.block_number(StateIndex::new(state)).value())
        .collect();
    let mut classes: Vec<Vec<StateIndex>> = vec![Vec::new(); initial.num_of_blocks()];
    for (state, &class) in class_of.iter().enumerate() {
        classes[class].push(StateIndex::new(state));
    }
    let mut num_of_classes = classes.len();

    let mut splitters: BTreeSet<usize> = (0..num_of_classes).collect();
    let mut values = vec![0.0f64; num_of_states];

    while let Some(splitter) = splitters.pop_first() {
        // Recompute the weight into the splitter for every state.
        values.fill(0.0);
        for &target in &classes[splitter] {
            for source in mc.iter_states() {
                values[source] += mc.probability(source, target).to_double();
            }
        }

        let mut chains: Vec<SubClass> = vec![SubClass::default(); num_of_classes];
        for state in (0..num_of_states).map(StateIndex::new) {
            let mut class = class_of[state];
            if !chains[class].initialized {
                // The first state of a class this round re-roots it.
                classes[class] = vec![state];
                chains[class].initialized = true;
                chains[class].value = values[state];
            } else {
                if !is_weight_equal(chains[class].value, values[state]) && chains[class].next.is_none() {
                    // The class splits, so it becomes a splitter again.
                    splitters.insert(class);
                }
                while !is_weight_equal(chains[class].value, values[state]) && chains[class].next.is_some() {
                    class = chains[class].next.expect("The chain has a next sub-class");
                }
                if is_weight_equal(chains[class].value, values[state]) {
                    class_of[state] = class;
                    classes[class].push(state);
                } else {
                    // No sub-class matches, so the state founds a new one.
                    let fresh = num_of_classes;
                    splitters.insert(fresh);
                    class_of[state] = fresh;
                    chains[class].next = Some(fresh);
                    chains.push(SubClass {
                        initialized: true,
                        value: values[state],
                        next: None,
                    });
                    classes.push(vec![state]);
                    num_of_classes += 1;
                }
            }
        }

        trace!("Splitter {splitter} produced {num_of_classes} classes");
    }

    let partition = IndexedPartition::with_partition(class_of.into_iter().map(BlockIndex::new).collect(), num_of_classes);
    renumber_partition(&partition)
}
